//! Storefront product JSON endpoints.
//!
//! Hosted storefronts expose the product model as JSON next to the product
//! page. Two shapes are common: an admin-style envelope (`{"product": {...}}`)
//! whose prices are decimal strings, and the theme/ajax shape whose integer
//! prices are already in minor units. Anything else that carries a name and
//! a price is read through a small set of well-known paths.

use serde::Deserialize;
use serde_json::Value;

use super::json::{as_bool, as_image, as_major_amount, as_text, first_path};
use super::price::{classify_availability, iso_code};
use super::{ExtractionError, PartialVariant, ProductFacts};
use crate::models::{Attributes, StockStatus};

/// Option values meaning "this product has no real options".
const PLACEHOLDER_OPTIONS: &[&str] = &["title", "default title", "default"];

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PriceValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl PriceValue {
    /// Hundredths. `integer_is_minor` selects the ajax convention.
    fn to_minor(&self, integer_is_minor: bool) -> Option<i64> {
        match self {
            PriceValue::Int(n) if integer_is_minor => Some(*n),
            PriceValue::Int(n) => n.checked_mul(100),
            PriceValue::Float(f) => as_major_amount(&Value::from(*f)),
            PriceValue::Text(s) => as_major_amount(&Value::String(s.clone())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OptionName {
    Named { name: String },
    Plain(String),
}

impl OptionName {
    fn name(&self) -> &str {
        match self {
            OptionName::Named { name } => name,
            OptionName::Plain(name) => name,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ShopifyVariant {
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    price: Option<PriceValue>,
    #[serde(default)]
    available: Option<bool>,
    #[serde(default)]
    inventory_quantity: Option<i64>,
    #[serde(default)]
    inventory_policy: Option<String>,
    #[serde(default)]
    inventory_management: Option<String>,
    #[serde(default)]
    option1: Option<String>,
    #[serde(default)]
    option2: Option<String>,
    #[serde(default)]
    option3: Option<String>,
}

impl ShopifyVariant {
    fn stock(&self) -> Option<StockStatus> {
        if let Some(available) = self.available {
            return Some(if available {
                StockStatus::InStock
            } else {
                StockStatus::OutOfStock
            });
        }
        let quantity = self.inventory_quantity?;
        let tracked = self
            .inventory_management
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty());
        let oversell = self
            .inventory_policy
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case("continue"));
        if !tracked || quantity > 0 || oversell {
            Some(StockStatus::InStock)
        } else {
            Some(StockStatus::OutOfStock)
        }
    }

    fn option_values(&self) -> [Option<&str>; 3] {
        [
            self.option1.as_deref(),
            self.option2.as_deref(),
            self.option3.as_deref(),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShopifyProduct {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    image: Option<Value>,
    #[serde(default)]
    featured_image: Option<Value>,
    #[serde(default)]
    images: Vec<Value>,
    #[serde(default)]
    options: Vec<OptionName>,
    #[serde(default)]
    variants: Vec<ShopifyVariant>,
    #[serde(default)]
    currency: Option<String>,
}

impl ShopifyProduct {
    fn into_facts(self, integer_is_minor: bool) -> ProductFacts {
        let option_names: Vec<String> = self
            .options
            .iter()
            .map(|o| o.name().trim().to_string())
            .collect();
        let single_placeholder = option_names.len() <= 1
            && option_names
                .first()
                .map_or(true, |n| PLACEHOLDER_OPTIONS.contains(&n.to_lowercase().as_str()));

        let variants: Vec<PartialVariant> = self
            .variants
            .iter()
            .map(|v| {
                let mut attributes = Attributes::new();
                for (idx, value) in v.option_values().into_iter().enumerate() {
                    let Some(value) = value.map(str::trim).filter(|s| !s.is_empty()) else {
                        continue;
                    };
                    if single_placeholder
                        && PLACEHOLDER_OPTIONS.contains(&value.to_lowercase().as_str())
                    {
                        continue;
                    }
                    let key = option_names
                        .get(idx)
                        .cloned()
                        .unwrap_or_else(|| format!("option{}", idx + 1));
                    attributes.insert(key, value.to_string());
                }
                PartialVariant {
                    attributes,
                    sku: v.sku.clone().filter(|s| !s.trim().is_empty()),
                    amount: v.price.as_ref().and_then(|p| p.to_minor(integer_is_minor)),
                    currency: None,
                    stock: v.stock(),
                }
            })
            .collect();

        let image = self
            .featured_image
            .as_ref()
            .and_then(as_image)
            .or_else(|| self.image.as_ref().and_then(as_image))
            .or_else(|| self.images.iter().find_map(as_image))
            .map(|src| if src.starts_with("//") { format!("https:{}", src) } else { src });

        ProductFacts {
            name: self.title.filter(|t| !t.trim().is_empty()),
            image,
            sku: None,
            amount: variants.iter().filter_map(|v| v.amount).min(),
            currency: self.currency.as_deref().and_then(iso_code).map(str::to_string),
            stock: None,
            variants,
        }
    }
}

/// A product record read from a generic JSON endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericProduct {
    name: Option<String>,
    image: Option<String>,
    sku: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
    stock: Option<StockStatus>,
}

impl GenericProduct {
    fn from_value(value: &Value) -> Option<Self> {
        let root = first_path(value, &["product", "data.product", "data", "item"])
            .filter(|v| v.is_object())
            .unwrap_or(value);
        let name = first_path(root, &["name", "title", "productName"]).and_then(as_text);
        let amount = first_path(
            root,
            &["price.amount", "price.value", "price", "salePrice", "offers.price", "currentPrice"],
        )
        .and_then(as_major_amount);
        if name.is_none() && amount.is_none() {
            return None;
        }
        let stock = first_path(root, &["available", "inStock", "in_stock"])
            .and_then(as_bool)
            .map(|b| if b { StockStatus::InStock } else { StockStatus::OutOfStock })
            .or_else(|| {
                first_path(root, &["availability", "stockStatus", "stock_status", "offers.availability"])
                    .and_then(as_text)
                    .and_then(|s| classify_availability(&s))
            });
        Some(Self {
            name,
            image: first_path(root, &["image", "images", "imageUrl", "image_url"]).and_then(as_image),
            sku: root.get("sku").and_then(as_text),
            amount,
            currency: first_path(root, &["price.currency", "currency", "priceCurrency", "offers.priceCurrency"])
                .and_then(as_text)
                .and_then(|c| iso_code(&c))
                .map(str::to_string),
            stock,
        })
    }
}

/// A recognized storefront product payload.
#[derive(Debug, Clone)]
pub enum StorefrontPayload {
    /// `{"product": {...}}` with decimal-string prices.
    ShopifyEnvelope(ShopifyProduct),
    /// Bare product object whose integer prices are minor units.
    ShopifyAjax(ShopifyProduct),
    Generic(GenericProduct),
}

impl StorefrontPayload {
    /// Recognize a payload, failing when it is not a product at all.
    pub fn parse(body: &str) -> Result<Self, ExtractionError> {
        let value: Value = serde_json::from_str(body.trim_start_matches('\u{feff}'))
            .map_err(|e| ExtractionError::InvalidPayload(e.to_string()))?;

        if let Some(product) = value.get("product").filter(|p| p.get("variants").is_some_and(Value::is_array)) {
            let product: ShopifyProduct = serde_json::from_value(product.clone())
                .map_err(|e| ExtractionError::InvalidPayload(e.to_string()))?;
            return Ok(Self::ShopifyEnvelope(product));
        }

        if value.get("variants").is_some_and(Value::is_array)
            && (value.get("title").is_some() || value.get("handle").is_some())
        {
            let product: ShopifyProduct = serde_json::from_value(value)
                .map_err(|e| ExtractionError::InvalidPayload(e.to_string()))?;
            return Ok(Self::ShopifyAjax(product));
        }

        GenericProduct::from_value(&value)
            .map(Self::Generic)
            .ok_or_else(|| ExtractionError::InvalidPayload("no product fields in JSON payload".to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ShopifyEnvelope(_) => "shopify_envelope",
            Self::ShopifyAjax(_) => "shopify_ajax",
            Self::Generic(_) => "generic",
        }
    }

    pub(crate) fn into_facts(self) -> ProductFacts {
        match self {
            Self::ShopifyEnvelope(p) => p.into_facts(false),
            Self::ShopifyAjax(p) => p.into_facts(true),
            Self::Generic(g) => ProductFacts {
                name: g.name,
                image: g.image,
                sku: g.sku,
                amount: g.amount,
                currency: g.currency,
                stock: g.stock,
                variants: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_options_and_inventory() {
        let body = r#"{"product":{"title":"Runner","image":{"src":"https://cdn.test/r.jpg"},
            "options":[{"name":"Size","values":["8","9"]},{"name":"Color","values":["Black"]}],
            "variants":[
              {"sku":"R-8","price":"120.00","option1":"8","option2":"Black",
               "inventory_quantity":3,"inventory_management":"shopify","inventory_policy":"deny"},
              {"sku":"R-9","price":"110.00","option1":"9","option2":"Black",
               "inventory_quantity":0,"inventory_management":"shopify","inventory_policy":"deny"}
            ]}}"#;
        let payload = StorefrontPayload::parse(body).unwrap();
        assert_eq!(payload.kind(), "shopify_envelope");
        let facts = payload.into_facts();
        assert_eq!(facts.name.as_deref(), Some("Runner"));
        assert_eq!(facts.image.as_deref(), Some("https://cdn.test/r.jpg"));
        assert_eq!(facts.amount, Some(11000));
        assert_eq!(facts.variants.len(), 2);
        let first = &facts.variants[0];
        assert_eq!(first.attributes.get("Size").map(String::as_str), Some("8"));
        assert_eq!(first.attributes.get("Color").map(String::as_str), Some("Black"));
        assert_eq!(first.amount, Some(12000));
        assert_eq!(first.stock, Some(StockStatus::InStock));
        assert_eq!(facts.variants[1].stock, Some(StockStatus::OutOfStock));
    }

    #[test]
    fn test_ajax_shape_uses_minor_units() {
        let body = r#"{"title":"Beanie","handle":"beanie","featured_image":"//cdn.test/b.jpg",
            "options":["Color"],
            "variants":[{"price":2500,"available":true,"option1":"Grey","sku":"B-G"},
                        {"price":2500,"available":false,"option1":"Navy","sku":"B-N"}]}"#;
        let payload = StorefrontPayload::parse(body).unwrap();
        assert_eq!(payload.kind(), "shopify_ajax");
        let facts = payload.into_facts();
        assert_eq!(facts.image.as_deref(), Some("https://cdn.test/b.jpg"));
        assert_eq!(facts.variants[0].amount, Some(2500));
        assert_eq!(facts.variants[1].attributes.get("Color").map(String::as_str), Some("Navy"));
        assert_eq!(facts.variants[1].stock, Some(StockStatus::OutOfStock));
    }

    #[test]
    fn test_untracked_inventory_is_in_stock() {
        let variant = ShopifyVariant {
            inventory_quantity: Some(0),
            inventory_management: None,
            ..Default::default()
        };
        assert_eq!(variant.stock(), Some(StockStatus::InStock));
        let variant = ShopifyVariant {
            inventory_quantity: Some(-2),
            inventory_management: Some("shopify".into()),
            inventory_policy: Some("continue".into()),
            ..Default::default()
        };
        assert_eq!(variant.stock(), Some(StockStatus::InStock));
    }

    #[test]
    fn test_generic_payload() {
        let body = r#"{"data":{"product":{"name":"Kettle","price":{"amount":"39.90","currency":"eur"},
            "availability":"OutOfStock","sku":"K-1"}}}"#;
        let facts = StorefrontPayload::parse(body).unwrap().into_facts();
        assert_eq!(facts.name.as_deref(), Some("Kettle"));
        assert_eq!(facts.amount, Some(3990));
        assert_eq!(facts.currency.as_deref(), Some("EUR"));
        assert_eq!(facts.stock, Some(StockStatus::OutOfStock));
    }

    #[test]
    fn test_rejects_non_product_json() {
        assert!(StorefrontPayload::parse("[1,2,3]").is_err());
        assert!(StorefrontPayload::parse("<html>").is_err());
        assert!(StorefrontPayload::parse(r#"{"status":"ok"}"#).is_err());
    }
}
