//! Helpers for reading loosely-typed JSON values.

use serde_json::Value;

use super::price::{decimal_to_minor, parse_amount};

/// Extract a value from JSON using a dot-notation path.
pub fn extract_path<'a>(data: &'a Value, path: &str) -> &'a Value {
    if path.is_empty() {
        return data;
    }

    let mut current = data;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key).unwrap_or(&Value::Null),
            Value::Array(arr) => {
                if let Ok(idx) = key.parse::<usize>() {
                    arr.get(idx).unwrap_or(&Value::Null)
                } else {
                    &Value::Null
                }
            }
            _ => &Value::Null,
        };
    }

    current
}

/// First path that yields a non-null value.
pub fn first_path<'a>(data: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .map(|p| extract_path(data, p))
        .find(|v| !v.is_null())
}

/// A string or number as trimmed text; empty strings are `None`.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// An amount in major units, from a number or a string, as hundredths.
///
/// Plain decimal strings are read as-is; anything else goes through the
/// separator-aware parser.
pub fn as_major_amount(value: &Value) -> Option<i64> {
    let text = as_text(value)?;
    decimal_to_minor(&text).or_else(|| parse_amount(&text))
}

/// A boolean from a bool, a number or a "true"/"false" string.
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// An image reference: a URL string, a list of them, or an object with
/// `url`/`src`/`contentUrl`.
pub fn as_image(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => as_text(value),
        Value::Array(items) => items.iter().find_map(as_image),
        Value::Object(_) => first_path(value, &["url", "src", "contentUrl"]).and_then(as_text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_path() {
        let data = json!({"offers": [{"price": "9.99"}], "name": "x"});
        assert_eq!(extract_path(&data, "offers.0.price"), &json!("9.99"));
        assert!(extract_path(&data, "offers.1.price").is_null());
        assert_eq!(extract_path(&data, ""), &data);
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(as_major_amount(&json!(29.99)), Some(2999));
        assert_eq!(as_major_amount(&json!("1.234,50")), Some(123450));
        assert_eq!(as_major_amount(&json!(15)), Some(1500));
        assert_eq!(as_bool(&json!("true")), Some(true));
        assert_eq!(as_bool(&json!(0)), Some(false));
        assert_eq!(
            as_image(&json!([{"url": "https://a/b.jpg"}])).as_deref(),
            Some("https://a/b.jpg")
        );
        assert_eq!(as_text(&json!("  ")), None);
    }
}
