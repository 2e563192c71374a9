//! Price, currency and availability parsing from free text.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::StockStatus;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,\u{a0}\u{202f} ]\d+)*").expect("valid regex"));

static ISO_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(USD|EUR|GBP|CAD|AUD|NZD|JPY|CHF|SEK|NOK|DKK|PLN|CZK|INR|MXN|BRL|SGD|HKD|ZAR)\b")
        .expect("valid regex")
});

/// Turn a decimal string like `29.99` or `29` into hundredths.
///
/// Extra fraction digits are rounded half up.
pub fn decimal_to_minor(s: &str) -> Option<i64> {
    let s = s.trim();
    let (whole, fraction) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let digits: Vec<i64> = fraction
        .chars()
        .filter_map(|c| c.to_digit(10).map(i64::from))
        .collect();
    let mut cents = digits.first().copied().unwrap_or(0) * 10 + digits.get(1).copied().unwrap_or(0);
    if digits.get(2).copied().unwrap_or(0) >= 5 {
        cents += 1;
    }
    whole.checked_mul(100)?.checked_add(cents)
}

/// Normalize a number token that may use US (`1,234.56`) or European
/// (`1.234,56`) separators into a plain decimal string.
pub fn normalize_number(token: &str) -> Option<String> {
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = if cleaned.contains(',') && cleaned.contains('.') {
        // Both present: the last one is the decimal separator
        if cleaned.rfind(',') > cleaned.rfind('.') {
            cleaned.replace('.', "").replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else if cleaned.contains(',') {
        let after_comma = cleaned.rsplit(',').next().unwrap_or("");
        if after_comma.len() <= 2 && cleaned.matches(',').count() == 1 {
            cleaned.replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else if cleaned.matches('.').count() > 1 {
        // 1.234.567 can only be thousands grouping
        cleaned.replace('.', "")
    } else if let Some((whole, fraction)) = cleaned.split_once('.') {
        if fraction.len() == 3 && !whole.is_empty() && whole != "0" {
            // 1.234 is a European thousands separator
            cleaned.replace('.', "")
        } else {
            cleaned
        }
    } else {
        cleaned
    };

    Some(normalized)
}

/// Parse an amount in either separator convention into hundredths.
pub fn parse_amount(token: &str) -> Option<i64> {
    normalize_number(token).and_then(|n| decimal_to_minor(&n))
}

/// Find the first price-like number in text, with any currency found in the
/// same text. Zero amounts are ignored.
pub fn parse_price_text(text: &str) -> Option<(i64, Option<&'static str>)> {
    NUMBER
        .find_iter(text)
        .filter_map(|m| parse_amount(m.as_str()))
        .find(|&amount| amount > 0)
        .map(|amount| (amount, detect_currency(text)))
}

/// Detect a currency from an ISO code or symbol in text.
pub fn detect_currency(text: &str) -> Option<&'static str> {
    if let Some(m) = ISO_CODE.find(text) {
        return iso_code(m.as_str());
    }
    for (prefix, code) in [
        ("US$", "USD"),
        ("CA$", "CAD"),
        ("C$", "CAD"),
        ("AU$", "AUD"),
        ("A$", "AUD"),
        ("NZ$", "NZD"),
        ("HK$", "HKD"),
        ("S$", "SGD"),
        ("R$", "BRL"),
    ] {
        if text.contains(prefix) {
            return Some(code);
        }
    }
    for ch in text.chars() {
        match ch {
            '$' => return Some("USD"),
            '\u{20AC}' => return Some("EUR"),
            '\u{00A3}' => return Some("GBP"),
            '\u{00A5}' => return Some("JPY"),
            '\u{20B9}' => return Some("INR"),
            _ => {}
        }
    }
    None
}

/// Map a currency code string onto a known static code.
pub fn iso_code(code: &str) -> Option<&'static str> {
    const CODES: &[&str] = &[
        "USD", "EUR", "GBP", "CAD", "AUD", "NZD", "JPY", "CHF", "SEK", "NOK", "DKK", "PLN", "CZK",
        "INR", "MXN", "BRL", "SGD", "HKD", "ZAR",
    ];
    let upper = code.trim().to_ascii_uppercase();
    CODES.iter().copied().find(|c| *c == upper)
}

/// Whether a string looks like a currency code (three ASCII letters).
pub fn is_currency_code(code: &str) -> bool {
    let code = code.trim();
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

/// Classify availability text such as a schema.org URL, a flag value or a
/// visible label.
///
/// Negative phrases are checked first because "unavailable" contains
/// "available".
pub fn classify_availability(text: &str) -> Option<StockStatus> {
    let lower = text.to_lowercase();
    const OUT: &[&str] = &[
        "outofstock",
        "out_of_stock",
        "out of stock",
        "out-of-stock",
        "sold out",
        "soldout",
        "sold_out",
        "unavailable",
        "not available",
        "discontinued",
        "backorder",
        "preorder",
        "pre-order",
        "presale",
        "notify me when",
    ];
    const IN: &[&str] = &[
        "instock",
        "in_stock",
        "in stock",
        "in-stock",
        "limitedavailability",
        "limited availability",
        "onlineonly",
        "instoreonly",
        "only a few left",
        "available",
    ];
    if OUT.iter().any(|p| lower.contains(p)) {
        Some(StockStatus::OutOfStock)
    } else if IN.iter().any(|p| lower.contains(p)) {
        Some(StockStatus::InStock)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_to_minor() {
        assert_eq!(decimal_to_minor("29.99"), Some(2999));
        assert_eq!(decimal_to_minor("29"), Some(2900));
        assert_eq!(decimal_to_minor("29.9"), Some(2990));
        assert_eq!(decimal_to_minor("0.125"), Some(13));
        assert_eq!(decimal_to_minor(".5"), Some(50));
        assert_eq!(decimal_to_minor("abc"), None);
        assert_eq!(decimal_to_minor(""), None);
    }

    #[test]
    fn test_separator_conventions() {
        assert_eq!(parse_amount("1,234.56"), Some(123456));
        assert_eq!(parse_amount("1.234,56"), Some(123456));
        assert_eq!(parse_amount("29,99"), Some(2999));
        assert_eq!(parse_amount("1,234"), Some(123400));
        assert_eq!(parse_amount("1.234"), Some(123400));
        assert_eq!(parse_amount("1.234.567"), Some(123456700));
        assert_eq!(parse_amount("1 234,50"), Some(123450));
    }

    #[test]
    fn test_parse_price_text() {
        assert_eq!(parse_price_text("$29.99"), Some((2999, Some("USD"))));
        assert_eq!(parse_price_text("Price: 24,99 €"), Some((2499, Some("EUR"))));
        assert_eq!(parse_price_text("£1,250.00 inc VAT"), Some((125000, Some("GBP"))));
        assert_eq!(parse_price_text("CA$ 45"), Some((4500, Some("CAD"))));
        assert_eq!(parse_price_text("0 items"), None);
        assert_eq!(parse_price_text("free"), None);
    }

    #[test]
    fn test_detect_currency_prefers_codes() {
        assert_eq!(detect_currency("$10 USD"), Some("USD"));
        assert_eq!(detect_currency("10 CHF"), Some("CHF"));
        assert_eq!(detect_currency("A$ 10"), Some("AUD"));
        assert_eq!(detect_currency("10"), None);
        assert_eq!(iso_code("eur"), Some("EUR"));
        assert!(is_currency_code("usd"));
        assert!(!is_currency_code("$"));
    }

    #[test]
    fn test_classify_availability() {
        assert_eq!(
            classify_availability("https://schema.org/InStock"),
            Some(StockStatus::InStock)
        );
        assert_eq!(
            classify_availability("http://schema.org/OutOfStock"),
            Some(StockStatus::OutOfStock)
        );
        assert_eq!(
            classify_availability("Currently unavailable"),
            Some(StockStatus::OutOfStock)
        );
        assert_eq!(classify_availability("Sold Out"), Some(StockStatus::OutOfStock));
        assert_eq!(classify_availability("Add to cart"), None);
    }
}
