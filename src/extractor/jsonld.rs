//! schema.org Product data embedded as JSON-LD.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::json::{as_image, as_major_amount, as_text, first_path};
use super::price::{classify_availability, iso_code};
use super::{PartialVariant, ProductFacts};
use crate::models::Attributes;

static LD_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*type\s*=\s*["']?application/ld\+json["']?[^>]*>(.*?)</script\s*>"#)
        .expect("valid regex")
});

/// Properties read as variant attributes when present on a variant node.
const VARIANT_PROPERTIES: &[&str] = &["color", "size", "material", "pattern", "width", "style"];

fn has_type(node: &Value, wanted: &[&str]) -> bool {
    let matches = |t: &str| {
        let t = t.rsplit('/').next().unwrap_or(t);
        wanted.iter().any(|w| w.eq_ignore_ascii_case(t))
    };
    match node.get("@type") {
        Some(Value::String(t)) => matches(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

fn collect_products(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_products(v, out)),
        Value::Object(map) => {
            if has_type(value, &["Product", "ProductGroup"]) {
                out.push(value.clone());
            } else if let Some(graph) = map.get("@graph") {
                collect_products(graph, out);
            } else if let Some(entity) = map.get("mainEntity") {
                collect_products(entity, out);
            }
        }
        _ => {}
    }
}

/// All Product/ProductGroup nodes found in the page's JSON-LD blocks.
///
/// Blocks that fail to parse are skipped; pages often carry broken ones
/// next to good ones.
pub fn product_nodes(html: &str) -> Vec<Value> {
    let mut products = Vec::new();
    for caps in LD_BLOCK.captures_iter(html) {
        let raw = caps[1].trim();
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => collect_products(&value, &mut products),
            Err(e) => tracing::debug!("Skipping unparseable JSON-LD block: {}", e),
        }
    }
    products
}

struct Offer {
    amount: Option<i64>,
    currency: Option<String>,
    stock: Option<crate::models::StockStatus>,
    sku: Option<String>,
    name: Option<String>,
}

fn read_offer(offer: &Value) -> Offer {
    let amount = first_path(offer, &["price", "lowPrice", "priceSpecification.price"])
        .and_then(as_major_amount)
        .or_else(|| {
            // priceSpecification may be a list
            offer
                .get("priceSpecification")
                .and_then(Value::as_array)
                .and_then(|specs| specs.iter().find_map(|s| s.get("price").and_then(as_major_amount)))
        });
    let currency = first_path(offer, &["priceCurrency", "priceSpecification.priceCurrency"])
        .and_then(as_text)
        .and_then(|c| iso_code(&c).map(str::to_string).or(Some(c)));
    let stock = offer
        .get("availability")
        .and_then(as_text)
        .and_then(|a| classify_availability(&a));
    Offer {
        amount,
        currency,
        stock,
        sku: offer.get("sku").and_then(as_text),
        name: offer.get("name").and_then(as_text),
    }
}

fn offers_of(node: &Value) -> Vec<Offer> {
    match node.get("offers") {
        Some(Value::Array(items)) => items.iter().map(read_offer).collect(),
        Some(offer @ Value::Object(_)) => {
            // AggregateOffer may list the individual offers
            match offer.get("offers") {
                Some(Value::Array(items)) if !items.is_empty() => items.iter().map(read_offer).collect(),
                _ => vec![read_offer(offer)],
            }
        }
        _ => Vec::new(),
    }
}

fn attribute_key(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).trim().to_lowercase()
}

fn variant_attributes(node: &Value, varies_by: &[String]) -> Attributes {
    let mut attributes = Attributes::new();
    let keys: Vec<String> = if varies_by.is_empty() {
        VARIANT_PROPERTIES.iter().map(|s| s.to_string()).collect()
    } else {
        varies_by.to_vec()
    };
    for key in keys {
        if let Some(value) = node.get(&key).and_then(as_text) {
            attributes.insert(key, value);
        }
    }
    if let Some(Value::Array(props)) = node.get("additionalProperty") {
        for prop in props {
            if let (Some(name), Some(value)) = (
                prop.get("name").and_then(as_text),
                prop.get("value").and_then(as_text),
            ) {
                attributes.insert(attribute_key(&name), value);
            }
        }
    }
    attributes
}

fn variant_from_node(node: &Value, varies_by: &[String]) -> PartialVariant {
    let offer = offers_of(node).into_iter().next();
    let (amount, currency, stock, offer_sku) = match offer {
        Some(o) => (o.amount, o.currency, o.stock, o.sku),
        None => (None, None, None, None),
    };
    PartialVariant {
        attributes: variant_attributes(node, varies_by),
        sku: node.get("sku").and_then(as_text).or(offer_sku),
        amount,
        currency,
        stock,
    }
}

/// Merge product nodes into facts. The first node is authoritative for
/// product-level fields; variants come from `hasVariant` or from a list of
/// offers that carry their own SKUs.
pub(crate) fn facts_from_nodes(nodes: &[Value]) -> ProductFacts {
    let Some(main) = nodes
        .iter()
        .find(|n| has_type(n, &["ProductGroup"]))
        .or_else(|| nodes.first())
    else {
        return ProductFacts::default();
    };

    let offers = offers_of(main);
    let first_offer = offers.first();
    let mut facts = ProductFacts {
        name: main.get("name").and_then(as_text),
        image: main.get("image").and_then(as_image),
        sku: main.get("sku").and_then(as_text),
        amount: first_offer.and_then(|o| o.amount),
        currency: first_offer.and_then(|o| o.currency.clone()),
        stock: first_offer.and_then(|o| o.stock),
        variants: Vec::new(),
    };

    let varies_by: Vec<String> = match main.get("variesBy") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(as_text)
            .map(|s| attribute_key(&s))
            .collect(),
        Some(v) => as_text(v).map(|s| vec![attribute_key(&s)]).unwrap_or_default(),
        None => Vec::new(),
    };

    if let Some(Value::Array(variants)) = main.get("hasVariant") {
        facts.variants = variants
            .iter()
            .map(|v| variant_from_node(v, &varies_by))
            .collect();
    } else if offers.len() > 1 && offers.iter().all(|o| o.sku.is_some() || o.name.is_some()) {
        facts.variants = offers
            .into_iter()
            .map(|o| {
                let mut attributes = Attributes::new();
                if let Some(name) = o.name.clone().filter(|n| Some(n) != facts.name.as_ref()) {
                    attributes.insert("option".to_string(), name);
                } else if let Some(sku) = &o.sku {
                    attributes.insert("sku".to_string(), sku.clone());
                }
                PartialVariant {
                    attributes,
                    sku: o.sku,
                    amount: o.amount,
                    currency: o.currency,
                    stock: o.stock,
                }
            })
            .collect();
    } else if nodes.len() > 1 && nodes.iter().all(|n| n.get("sku").is_some()) {
        // Some sites emit one Product node per variant.
        facts.variants = nodes.iter().map(|n| variant_from_node(n, &varies_by)).collect();
    }

    if facts.amount.is_none() {
        facts.amount = facts.variants.iter().filter_map(|v| v.amount).min();
    }
    if facts.currency.is_none() {
        facts.currency = facts.variants.iter().find_map(|v| v.currency.clone());
    }

    facts
}
