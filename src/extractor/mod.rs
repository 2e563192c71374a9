//! Structured extraction of product data from fetched content.
//!
//! Every field is resolved by a cascade of sources, most trustworthy first:
//! schema.org JSON-LD, storefront product JSON, then DOM heuristics. Missing
//! fields stay empty; extraction only fails when nothing identifying a
//! product was found.

mod dom;
mod json;
pub mod jsonld;
pub mod price;
pub mod sanitize;
pub mod storefront;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetcher::{ContentKind, FetchResult, DEFAULT_MAX_CONTENT_BYTES};
use crate::models::{Attributes, Price, StockStatus};

pub use storefront::StorefrontPayload;

/// Extraction failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    /// Neither a product name nor any variant could be found.
    #[error("no product data found in {kind} content ({bytes} bytes)")]
    NothingExtracted { kind: &'static str, bytes: usize },

    /// Structured payload did not match any known shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// One purchasable combination found on the page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariantCandidate {
    pub attributes: Attributes,
    pub sku: Option<String>,
    pub price: Option<Price>,
    pub stock: StockStatus,
}

/// Normalized result of extracting a product page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductShell {
    pub canonical_url: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub variants: Vec<VariantCandidate>,
}

/// Facts gathered from one source before the cascade merges them.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ProductFacts {
    pub name: Option<String>,
    pub image: Option<String>,
    pub sku: Option<String>,
    /// Product-level amount in hundredths.
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub stock: Option<StockStatus>,
    pub variants: Vec<PartialVariant>,
}

/// A variant whose unset fields inherit product-level values.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PartialVariant {
    pub attributes: Attributes,
    pub sku: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub stock: Option<StockStatus>,
}

impl ProductFacts {
    /// Fill fields this source lacks from a lower-priority source.
    pub(crate) fn or(mut self, other: ProductFacts) -> ProductFacts {
        self.name = self.name.or(other.name);
        self.image = self.image.or(other.image);
        self.sku = self.sku.or(other.sku);
        self.amount = self.amount.or(other.amount);
        self.currency = self.currency.or(other.currency);
        self.stock = self.stock.or(other.stock);
        if self.variants.is_empty() {
            self.variants = other.variants;
        }
        self
    }

    fn into_shell(self, canonical_url: String) -> ProductShell {
        let currency = self.currency.clone();
        let product_price = |amount: Option<i64>, own_currency: Option<String>| {
            amount.map(|a| Price::new(a, own_currency.or_else(|| currency.clone()).as_deref()))
        };

        let mut variants: Vec<VariantCandidate> = self
            .variants
            .into_iter()
            .map(|v| VariantCandidate {
                price: product_price(v.amount.or(self.amount), v.currency),
                stock: v.stock.or(self.stock).unwrap_or_default(),
                sku: v.sku,
                attributes: v.attributes,
            })
            .collect();

        if variants.is_empty()
            && (self.name.is_some() || self.amount.is_some() || self.stock.is_some())
        {
            variants.push(VariantCandidate {
                attributes: Attributes::new(),
                sku: self.sku,
                price: product_price(self.amount, None),
                stock: self.stock.unwrap_or_default(),
            });
        }

        ProductShell {
            canonical_url,
            name: self.name,
            image_url: self.image,
            variants,
        }
    }
}

/// Turns fetched content into a [`ProductShell`].
#[derive(Debug, Clone)]
pub struct Extractor {
    max_bytes: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTENT_BYTES)
    }
}

impl Extractor {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Extract product data from a successful fetch.
    pub fn extract(&self, fetch: &FetchResult) -> Result<ProductShell, ExtractionError> {
        self.extract_content(
            &fetch.content,
            fetch.content_kind,
            &fetch.final_url,
            fetch.metadata.currency_hint.as_deref(),
        )
    }

    /// Extract product data from raw content of a known kind.
    pub fn extract_content(
        &self,
        content: &str,
        kind: ContentKind,
        url: &str,
        currency_hint: Option<&str>,
    ) -> Result<ProductShell, ExtractionError> {
        let (facts, canonical_url) = match kind {
            ContentKind::StorefrontJson => {
                let payload = StorefrontPayload::parse(content)?;
                (payload.into_facts(), url.to_string())
            }
            ContentKind::StructuredData => {
                let nodes: Vec<serde_json::Value> = serde_json::from_str(content)
                    .map_err(|e| ExtractionError::InvalidPayload(e.to_string()))?;
                (jsonld::facts_from_nodes(&nodes), url.to_string())
            }
            ContentKind::Html => {
                let html = sanitize::sanitize_html(content, self.max_bytes);
                let page = dom::PageFacts::parse(&html);
                let canonical = page.canonical_url.clone().unwrap_or_else(|| url.to_string());
                (page.into_facts(), canonical)
            }
        };

        let mut facts = facts;
        if facts.currency.is_none() {
            facts.currency = currency_hint.and_then(price::iso_code).map(str::to_string);
        }

        let shell = facts.into_shell(canonical_url);
        if shell.name.is_none() && shell.variants.is_empty() {
            return Err(ExtractionError::NothingExtracted {
                kind: kind.as_str(),
                bytes: content.len(),
            });
        }
        Ok(shell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_html(html: &str) -> Result<ProductShell, ExtractionError> {
        Extractor::default().extract_content(html, ContentKind::Html, "https://shop.test/p", None)
    }

    #[test]
    fn test_jsonld_product_page() {
        let html = r#"<html><head>
            <link rel="canonical" href="https://shop.test/products/mug">
            <script type="application/ld+json">
            {"@context":"https://schema.org","@type":"Product","name":"Enamel Mug",
             "image":["https://cdn.shop.test/mug.jpg"],"sku":"MUG-1",
             "offers":{"@type":"Offer","price":"12.50","priceCurrency":"EUR",
                       "availability":"https://schema.org/InStock"}}
            </script></head><body><h1>Something else</h1></body></html>"#;

        let shell = extract_html(html).unwrap();
        assert_eq!(shell.canonical_url, "https://shop.test/products/mug");
        assert_eq!(shell.name.as_deref(), Some("Enamel Mug"));
        assert_eq!(shell.image_url.as_deref(), Some("https://cdn.shop.test/mug.jpg"));
        assert_eq!(shell.variants.len(), 1);
        let variant = &shell.variants[0];
        assert!(variant.attributes.is_empty());
        assert_eq!(variant.sku.as_deref(), Some("MUG-1"));
        assert_eq!(variant.price, Some(Price::new(1250, Some("EUR"))));
        assert_eq!(variant.stock, StockStatus::InStock);
    }

    #[test]
    fn test_dom_only_page_with_option_selects() {
        let html = r#"<html><head><title>Tee | Shop</title>
            <meta property="og:title" content="Classic Tee">
            <meta property="product:price:amount" content="19.00">
            <meta property="product:price:currency" content="USD">
            </head><body>
            <form action="/cart/add">
              <label for="opt-size">Size</label>
              <select id="opt-size" name="options[Size]">
                <option value="">Choose an option</option>
                <option value="S">S</option>
                <option value="M" disabled>M - Sold out</option>
              </select>
              <label for="opt-color">Color</label>
              <select id="opt-color" name="options[Color]">
                <option>Blue</option><option>Red</option>
              </select>
              <button type="submit" name="add">Add to cart</button>
            </form></body></html>"#;

        let shell = extract_html(html).unwrap();
        assert_eq!(shell.name.as_deref(), Some("Classic Tee"));
        assert_eq!(shell.variants.len(), 4);
        for v in &shell.variants {
            assert_eq!(v.price, Some(Price::new(1900, Some("USD"))));
            let expected = if v.attributes.get("Size").map(String::as_str) == Some("M") {
                StockStatus::OutOfStock
            } else {
                StockStatus::InStock
            };
            assert_eq!(v.stock, expected, "{:?}", v.attributes);
        }
    }

    #[test]
    fn test_partial_data_is_not_an_error() {
        let shell = extract_html("<html><body><h1>Mystery Box</h1></body></html>").unwrap();
        assert_eq!(shell.name.as_deref(), Some("Mystery Box"));
        assert_eq!(shell.variants.len(), 1);
        assert_eq!(shell.variants[0].price, None);
        assert_eq!(shell.variants[0].stock, StockStatus::Unknown);
    }

    #[test]
    fn test_empty_page_is_an_error() {
        let err = extract_html("<html><body><p>hello</p></body></html>").unwrap_err();
        assert!(matches!(err, ExtractionError::NothingExtracted { kind: "html", .. }));
    }

    #[test]
    fn test_currency_hint_fills_missing_currency() {
        let body = r#"{"product":{"title":"Cap","variants":[{"price":"15.00","option1":"Default Title"}],"options":[{"name":"Title"}]}}"#;
        let shell = Extractor::default()
            .extract_content(body, ContentKind::StorefrontJson, "https://shop.test/products/cap", Some("cad"))
            .unwrap();
        assert_eq!(shell.variants[0].price, Some(Price::new(1500, Some("CAD"))));
        assert!(shell.variants[0].attributes.is_empty());
    }

    #[test]
    fn test_invalid_storefront_payload() {
        let err = Extractor::default()
            .extract_content("{\"hello\": 1}", ContentKind::StorefrontJson, "u", None)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidPayload(_)));
    }
}
