//! Pre-parse cleanup of fetched markup.
//!
//! Pages routinely carry megabytes of inline scripts and styles that are
//! irrelevant to product data. They are removed before building a DOM,
//! except for JSON script blocks which hold structured product data.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b([^>]*)>.*?</script\s*>").expect("valid regex"));

static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>|<noscript\b[^>]*>.*?</noscript\s*>|<svg\b[^>]*>.*?</svg\s*>|<template\b[^>]*>.*?</template\s*>|<!--.*?-->")
        .expect("valid regex")
});

/// Cut a string to at most `max_bytes`, backing off to a char boundary.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Whether a `<script>` opening tag's attributes declare a JSON payload.
fn is_json_script(attributes: &str) -> bool {
    let lower = attributes.to_ascii_lowercase();
    lower.contains("application/ld+json") || lower.contains("application/json")
}

/// Truncate and strip non-content markup, keeping JSON script blocks.
pub fn sanitize_html(html: &str, max_bytes: usize) -> String {
    let html = truncate_utf8(html, max_bytes);
    let without_scripts = SCRIPT.replace_all(html, |caps: &Captures| {
        if is_json_script(&caps[1]) {
            caps[0].to_string()
        } else {
            String::new()
        }
    });
    NOISE.replace_all(&without_scripts, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_utf8_respects_boundaries() {
        assert_eq!(truncate_utf8("héllo", 2), "h");
        assert_eq!(truncate_utf8("héllo", 3), "hé");
        assert_eq!(truncate_utf8("abc", 10), "abc");
    }

    #[test]
    fn test_strips_scripts_but_keeps_json_blocks() {
        let html = r#"<html><head>
            <script>var tracking = "<div class='price'>$1</div>";</script>
            <script type="application/ld+json">{"@type":"Product","name":"Mug"}</script>
            <script type="application/json" data-product-json>{"title":"Mug"}</script>
            <style>.price { color: red }</style>
            <!-- <span class="price">$9</span> -->
            </head><body><h1>Mug</h1><noscript>enable js</noscript></body></html>"#;

        let cleaned = sanitize_html(html, usize::MAX);
        assert!(!cleaned.contains("tracking"));
        assert!(!cleaned.contains("color: red"));
        assert!(!cleaned.contains("$9"));
        assert!(!cleaned.contains("enable js"));
        assert!(cleaned.contains(r#""@type":"Product""#));
        assert!(cleaned.contains("data-product-json"));
        assert!(cleaned.contains("<h1>Mug</h1>"));
    }

    #[test]
    fn test_truncates_before_stripping() {
        let html = format!("<p>{}</p>", "x".repeat(100));
        assert_eq!(sanitize_html(&html, 10).len(), 10);
    }
}
