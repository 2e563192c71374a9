//! Markup heuristics for pages without complete structured data.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::jsonld;
use super::price::{classify_availability, iso_code, parse_amount, parse_price_text};
use super::storefront::StorefrontPayload;
use super::{PartialVariant, ProductFacts};
use crate::models::{Attributes, StockStatus};

/// Upper bound on variant combinations built from option selects.
const MAX_COMBINATIONS: usize = 250;

static SYMBOL_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[$\u{20AC}\u{00A3}\u{00A5}\u{20B9}]\s?\d[\d.,]*|\d[\d.,]*\s?[\u{20AC}\u{00A3}])")
        .expect("valid regex")
});

const SALE_PRICE_SELECTORS: &[&str] = &[
    ".sale-price",
    ".price--sale",
    ".special-price .price",
    ".price ins",
    ".product-price--sale",
];

const PRICE_SELECTORS: &[&str] = &[
    ".product-price",
    ".product__price",
    ".price",
    "[class*=\"price\"]:not([class*=\"compare\"]):not([class*=\"was\"])",
];

const ADD_TO_CART_SELECTORS: &[&str] = &[
    "form[action*=\"/cart\"] button[type=\"submit\"]",
    "form[action*=\"cart\"] [name=\"add\"]",
    "#add-to-cart",
    "#AddToCart",
    ".add-to-cart",
    "[data-add-to-cart]",
    "button[class*=\"add-to-cart\"]",
    "button.single_add_to_cart_button",
];

fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    scope.select(&selector).next()
}

fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn meta_content(root: ElementRef<'_>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let css = format!("meta[property=\"{key}\"], meta[name=\"{key}\"]");
        select_first(root, &css).and_then(|m| non_empty(m.value().attr("content")))
    })
}

/// `content`, `href` or `src` before visible text, the microdata order.
fn itemprop_value(root: ElementRef<'_>, prop: &str) -> Option<String> {
    let element = select_first(root, &format!("[itemprop=\"{prop}\"]"))?;
    let value = element.value();
    non_empty(value.attr("content"))
        .or_else(|| non_empty(value.attr("href")))
        .or_else(|| non_empty(value.attr("src")))
        .or_else(|| non_empty(Some(element_text(element).as_str())))
}

/// Text outside `<script>` elements.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_script = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name() == "script"))
            .unwrap_or(false);
        if !in_script {
            let text = text.trim();
            if !text.is_empty() {
                parts.push(text.to_string());
            }
        }
    }
    parts.join(" ")
}

/// Everything learned from one HTML page, by source.
#[derive(Debug, Clone, Default)]
pub(crate) struct PageFacts {
    pub canonical_url: Option<String>,
    structured: ProductFacts,
    embedded: ProductFacts,
    heuristic: ProductFacts,
}

impl PageFacts {
    pub(crate) fn parse(html: &str) -> Self {
        let structured = jsonld::facts_from_nodes(&jsonld::product_nodes(html));

        let document = Html::parse_document(html);
        let root = document.root_element();

        Self {
            canonical_url: canonical_url(root),
            structured,
            embedded: embedded_storefront(root).unwrap_or_default(),
            heuristic: heuristic_facts(root),
        }
    }

    /// Merge sources field by field: JSON-LD, embedded storefront JSON,
    /// then markup heuristics.
    pub(crate) fn into_facts(self) -> ProductFacts {
        self.structured.or(self.embedded).or(self.heuristic)
    }
}

fn canonical_url(root: ElementRef<'_>) -> Option<String> {
    select_first(root, "link[rel=\"canonical\"]")
        .and_then(|l| non_empty(l.value().attr("href")))
        .or_else(|| meta_content(root, &["og:url"]))
        .filter(|href| {
            url::Url::parse(href)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false)
        })
}

fn embedded_storefront(root: ElementRef<'_>) -> Option<ProductFacts> {
    select_all(root, "script[type=\"application/json\"]")
        .into_iter()
        .filter(|script| {
            let value = script.value();
            value.attr("data-product-json").is_some()
                || value
                    .attr("id")
                    .is_some_and(|id| id.to_ascii_lowercase().contains("productjson"))
        })
        .find_map(|script| {
            let body: String = script.text().collect();
            match StorefrontPayload::parse(&body) {
                Ok(payload) => Some(payload.into_facts()),
                Err(e) => {
                    tracing::debug!("Ignoring embedded product JSON: {}", e);
                    None
                }
            }
        })
}

fn heuristic_facts(root: ElementRef<'_>) -> ProductFacts {
    let text = visible_text(root);
    let (amount, text_currency) = heuristic_price(root, &text);
    let currency = meta_content(root, &["product:price:currency", "og:price:currency"])
        .or_else(|| itemprop_value(root, "priceCurrency"))
        .and_then(|c| iso_code(&c).map(str::to_string))
        .or(text_currency);

    ProductFacts {
        name: heuristic_name(root),
        image: meta_content(root, &["og:image", "og:image:url", "twitter:image"])
            .or_else(|| itemprop_value(root, "image")),
        sku: itemprop_value(root, "sku"),
        amount,
        currency,
        stock: heuristic_stock(root, &text),
        variants: option_variants(root),
    }
}

fn heuristic_name(root: ElementRef<'_>) -> Option<String> {
    meta_content(root, &["og:title", "twitter:title"])
        .or_else(|| itemprop_value(root, "name"))
        .or_else(|| select_first(root, "h1").and_then(|h| non_empty(Some(element_text(h).as_str()))))
        .or_else(|| {
            select_first(root, "title").and_then(|t| {
                let title = element_text(t);
                let main = title.split(" | ").next().unwrap_or(&title);
                non_empty(Some(main))
            })
        })
}

fn heuristic_price(root: ElementRef<'_>, text: &str) -> (Option<i64>, Option<String>) {
    if let Some(amount) = meta_content(root, &["product:price:amount", "og:price:amount"])
        .and_then(|c| parse_amount(&c))
    {
        return (Some(amount), None);
    }
    if let Some(amount) = itemprop_value(root, "price").and_then(|p| parse_price_text(&p)) {
        return (Some(amount.0), amount.1.map(str::to_string));
    }
    // Bare integers in data-price are often minor units; only trust values
    // with a decimal separator.
    if let Some(amount) = select_all(root, "[data-price]").into_iter().find_map(|e| {
        e.value()
            .attr("data-price")
            .filter(|v| v.contains('.') || v.contains(','))
            .and_then(parse_amount)
    }) {
        return (Some(amount), None);
    }
    for css in SALE_PRICE_SELECTORS.iter().chain(PRICE_SELECTORS) {
        for element in select_all(root, css) {
            if let Some((amount, currency)) = parse_price_text(&element_text(element)) {
                return (Some(amount), currency.map(str::to_string));
            }
        }
    }
    match SYMBOL_PRICE.find(text).and_then(|m| parse_price_text(m.as_str())) {
        Some((amount, currency)) => (Some(amount), currency.map(str::to_string)),
        None => (None, None),
    }
}

fn heuristic_stock(root: ElementRef<'_>, text: &str) -> Option<StockStatus> {
    let declared = meta_content(root, &["product:availability", "og:availability"])
        .or_else(|| itemprop_value(root, "availability"))
        .and_then(|a| classify_availability(&a));
    if declared.is_some() {
        return declared;
    }

    if let Some(button) = ADD_TO_CART_SELECTORS
        .iter()
        .find_map(|css| select_first(root, css))
    {
        let value = button.value();
        let disabled = value.attr("disabled").is_some()
            || value
                .attr("aria-disabled")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let label = non_empty(value.attr("value")).unwrap_or_else(|| element_text(button));
        if disabled || classify_availability(&label) == Some(StockStatus::OutOfStock) {
            return Some(StockStatus::OutOfStock);
        }
        return Some(StockStatus::InStock);
    }

    let labelled = select_all(root, "[class*=\"stock\"], [class*=\"availability\"]")
        .into_iter()
        .find_map(|e| classify_availability(&element_text(e)));
    if labelled.is_some() {
        return labelled;
    }

    let lower = text.to_lowercase();
    if lower.contains("out of stock") || lower.contains("sold out") {
        Some(StockStatus::OutOfStock)
    } else if lower.contains("in stock") {
        Some(StockStatus::InStock)
    } else {
        None
    }
}

/// Attribute name for an option select: its label, then its name, then its id.
fn option_key(root: ElementRef<'_>, select: ElementRef<'_>) -> Option<String> {
    let value = select.value();
    if let Some(id) = value.attr("id") {
        let label = select_all(root, "label")
            .into_iter()
            .find(|l| l.value().attr("for") == Some(id))
            .map(element_text)
            .map(|t| t.trim_end_matches(':').trim().to_string())
            .filter(|t| !t.is_empty());
        if label.is_some() {
            return label;
        }
    }
    value
        .attr("name")
        .map(strip_option_name)
        .filter(|n| !n.is_empty())
        .or_else(|| non_empty(value.attr("id")))
}

fn strip_option_name(name: &str) -> String {
    let name = name.trim();
    if let Some(inner) = name.strip_prefix("options[").and_then(|n| n.strip_suffix(']')) {
        return inner.to_string();
    }
    let name = name.strip_prefix("attribute_").unwrap_or(name);
    let name = name.strip_prefix("pa_").unwrap_or(name);
    name.to_string()
}

fn is_option_select(select: ElementRef<'_>) -> bool {
    let value = select.value();
    let name = value.attr("name").unwrap_or("").to_ascii_lowercase();
    if matches!(name.as_str(), "id" | "quantity" | "qty") {
        return false;
    }
    if name.starts_with("options[") || name.starts_with("attribute_") {
        return true;
    }
    let hints = format!("{} {} {}", name, value.attr("id").unwrap_or(""), value.attr("class").unwrap_or(""))
        .to_ascii_lowercase();
    if ["option", "variant", "size", "color", "colour"].iter().any(|h| hints.contains(h)) {
        return true;
    }
    select.ancestors().any(|a| {
        a.value()
            .as_element()
            .is_some_and(|e| e.name() == "form" && e.attr("action").is_some_and(|act| act.contains("cart")))
    })
}

/// One option value and whether the page marks it unavailable.
struct OptionValue {
    value: String,
    unavailable: bool,
}

fn option_values(select: ElementRef<'_>) -> Vec<OptionValue> {
    let mut values = Vec::new();
    for option in select_all(select, "option") {
        let element = option.value();
        let text = element_text(option);
        let value = match element.attr("value") {
            Some(v) => v.trim().to_string(),
            None => text.clone(),
        };
        let lower = text.to_lowercase();
        if value.is_empty()
            || lower.starts_with("choose")
            || lower.starts_with("select")
            || lower.starts_with("pick")
            || lower.starts_with("--")
        {
            continue;
        }
        let unavailable = element.attr("disabled").is_some()
            || classify_availability(&text) == Some(StockStatus::OutOfStock);
        values.push(OptionValue { value, unavailable });
    }
    values
}

/// Variants from option selects, one per combination of values.
fn option_variants(root: ElementRef<'_>) -> Vec<PartialVariant> {
    let mut dimensions: Vec<(String, Vec<OptionValue>)> = Vec::new();
    for select in select_all(root, "select") {
        if !is_option_select(select) {
            continue;
        }
        let Some(key) = option_key(root, select) else {
            continue;
        };
        let values = option_values(select);
        if values.is_empty() || dimensions.iter().any(|(k, _)| *k == key) {
            continue;
        }
        dimensions.push((key, values));
    }
    if dimensions.is_empty() {
        return Vec::new();
    }

    let mut combinations: Vec<(Attributes, bool)> = vec![(Attributes::new(), false)];
    for (key, values) in &dimensions {
        let mut next = Vec::with_capacity(combinations.len() * values.len());
        'outer: for (attributes, unavailable) in &combinations {
            for option in values {
                if next.len() >= MAX_COMBINATIONS {
                    tracing::debug!("Option combinations capped at {}", MAX_COMBINATIONS);
                    break 'outer;
                }
                let mut attributes = attributes.clone();
                attributes.insert(key.clone(), option.value.clone());
                next.push((attributes, *unavailable || option.unavailable));
            }
        }
        combinations = next;
    }

    combinations
        .into_iter()
        .map(|(attributes, unavailable)| PartialVariant {
            attributes,
            stock: unavailable.then_some(StockStatus::OutOfStock),
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(html: &str) -> ProductFacts {
        PageFacts::parse(html).into_facts()
    }

    #[test]
    fn test_microdata_product() {
        let html = r#"<html><body><div itemscope itemtype="https://schema.org/Product">
            <h1 itemprop="name">Desk Lamp</h1>
            <img itemprop="image" src="https://cdn.test/lamp.png">
            <span itemprop="price" content="49.95">$49.95</span>
            <meta itemprop="priceCurrency" content="USD">
            <link itemprop="availability" href="https://schema.org/OutOfStock">
            </div></body></html>"#;
        let facts = facts(html);
        assert_eq!(facts.name.as_deref(), Some("Desk Lamp"));
        assert_eq!(facts.image.as_deref(), Some("https://cdn.test/lamp.png"));
        assert_eq!(facts.amount, Some(4995));
        assert_eq!(facts.currency.as_deref(), Some("USD"));
        assert_eq!(facts.stock, Some(StockStatus::OutOfStock));
    }

    #[test]
    fn test_price_classes_and_disabled_button() {
        let html = r#"<html><head><title>Scarf | Wool Co</title></head><body>
            <span class="price price--compare">€80,00</span>
            <span class="sale-price">€64,50</span>
            <form action="/cart/add"><button type="submit" disabled>Sold out</button></form>
            </body></html>"#;
        let facts = facts(html);
        assert_eq!(facts.name.as_deref(), Some("Scarf"));
        assert_eq!(facts.amount, Some(6450));
        assert_eq!(facts.currency.as_deref(), Some("EUR"));
        assert_eq!(facts.stock, Some(StockStatus::OutOfStock));
    }

    #[test]
    fn test_data_price_without_separator_is_ignored() {
        let html = r#"<html><body><h1>Pen</h1><div data-price="1299"></div></body></html>"#;
        assert_eq!(facts(html).amount, None);
        let html = r#"<html><body><h1>Pen</h1><div data-price="12.99"></div></body></html>"#;
        assert_eq!(facts(html).amount, Some(1299));
    }

    #[test]
    fn test_embedded_storefront_json() {
        let html = r#"<html><body><h1>Ignored</h1>
            <script type="application/json" id="ProductJson-main">
            {"title":"Tote","handle":"tote","options":["Color"],
             "variants":[{"price":3000,"available":true,"option1":"Sand"},
                         {"price":3000,"available":false,"option1":"Ink"}]}
            </script></body></html>"#;
        let facts = facts(html);
        assert_eq!(facts.name.as_deref(), Some("Tote"));
        assert_eq!(facts.variants.len(), 2);
        assert_eq!(facts.variants[1].stock, Some(StockStatus::OutOfStock));
    }

    #[test]
    fn test_option_names_are_cleaned() {
        assert_eq!(strip_option_name("options[Size]"), "Size");
        assert_eq!(strip_option_name("attribute_pa_color"), "color");
        assert_eq!(strip_option_name("attribute_material"), "material");
    }

    #[test]
    fn test_ignores_quantity_and_unrelated_selects() {
        let html = r#"<html><body><h1>Mug</h1>
            <select name="quantity"><option>1</option><option>2</option></select>
            <select name="country"><option>US</option><option>CA</option></select>
            </body></html>"#;
        assert!(facts(html).variants.is_empty());
    }

    #[test]
    fn test_relative_canonical_is_dropped() {
        let page = PageFacts::parse(r#"<link rel="canonical" href="/products/x"><h1>X</h1>"#);
        assert_eq!(page.canonical_url, None);
    }
}
