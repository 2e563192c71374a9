//! Cheap markup and header sniffing done on the direct response.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::http_client::HttpResponse;
use crate::extractor::price::iso_code;

/// Hosted storefront platforms with a product JSON endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Shopify,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Shopify => "shopify",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static PRODUCT_SIGNALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)"@type"\s*:\s*\[?\s*"(?:https?://schema\.org/)?product(?:group)?"|(?:product|og):price:amount|itemprop\s*=\s*["']?price\b|class\s*=\s*["'][^"']*\bprice\b|add[-_ ]?to[-_ ]?(?:cart|bag|basket)|/cart/add"#,
    )
    .expect("valid regex")
});

static SHOPIFY_CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Shopify\.currency\s*=\s*\{[^}]*"active"\s*:\s*"([A-Za-z]{3})""#).expect("valid regex")
});

static META_CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+(?:property|name|itemprop)\s*=\s*["'](?:og:price:currency|product:price:currency|pricecurrency)["'][^>]*content\s*=\s*["']([A-Za-z]{3})["']"#,
    )
    .expect("valid regex")
});

/// Detect a storefront platform from response headers or markup.
pub fn detect_platform(response: &HttpResponse) -> Option<Platform> {
    let header_hit = response.header("x-shopify-stage").is_some()
        || response.header("x-shopid").is_some()
        || response
            .header("powered-by")
            .is_some_and(|v| v.to_ascii_lowercase().contains("shopify"));
    if header_hit || response.body.contains("cdn.shopify.com") || response.body.contains("Shopify.shop") {
        return Some(Platform::Shopify);
    }
    None
}

/// Whether markup looks like a product page at all.
pub fn has_product_signals(html: &str) -> bool {
    PRODUCT_SIGNALS.is_match(html)
}

/// Store currency advertised by the page, if any.
pub fn currency_hint(html: &str) -> Option<String> {
    SHOPIFY_CURRENCY
        .captures(html)
        .or_else(|| META_CURRENCY.captures(html))
        .and_then(|caps| iso_code(&caps[1]))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn response(headers: &[(&str, &str)], body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            final_url: "https://shop.test/products/a".to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            body: body.to_string(),
            truncated: false,
            duration_ms: 1,
        }
    }

    #[test]
    fn test_detect_platform() {
        assert_eq!(
            detect_platform(&response(&[("x-shopid", "123")], "")),
            Some(Platform::Shopify)
        );
        assert_eq!(
            detect_platform(&response(&[("powered-by", "Shopify")], "")),
            Some(Platform::Shopify)
        );
        assert_eq!(
            detect_platform(&response(&[], r#"<link href="//cdn.shopify.com/s/files/x.css">"#)),
            Some(Platform::Shopify)
        );
        assert_eq!(detect_platform(&response(&[], "<html></html>")), None);
    }

    #[test]
    fn test_product_signals() {
        assert!(has_product_signals(r#"{"@type": "Product", "name": "x"}"#));
        assert!(has_product_signals(r#"<meta property="og:price:amount" content="1">"#));
        assert!(has_product_signals(r#"<span itemprop="price">1</span>"#));
        assert!(has_product_signals(r#"<div class="product price">$1</div>"#));
        assert!(has_product_signals(r#"<button id="add-to-cart">Buy</button>"#));
        assert!(!has_product_signals("<html><body><p>About us</p></body></html>"));
    }

    #[test]
    fn test_currency_hint() {
        assert_eq!(
            currency_hint(r#"Shopify.currency = {"active":"CAD","rate":"1.0"};"#).as_deref(),
            Some("CAD")
        );
        assert_eq!(
            currency_hint(r#"<meta property="og:price:currency" content="eur">"#).as_deref(),
            Some("EUR")
        );
        assert_eq!(currency_hint("<p>nothing</p>"), None);
    }
}
