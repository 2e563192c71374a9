//! HTTP response wrapper.

use std::collections::HashMap;

/// A response whose body was read up to the size ceiling.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// URL after redirects.
    pub final_url: String,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: String,
    /// The body was cut at the size ceiling.
    pub truncated: bool,
    pub duration_ms: u64,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// JSON by declared type or by the first non-blank character.
    pub fn looks_like_json(&self) -> bool {
        if self
            .content_type()
            .is_some_and(|ct| ct.contains("json") || ct.contains("javascript"))
        {
            return true;
        }
        matches!(self.body.trim_start().chars().next(), Some('{') | Some('['))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content_type: Option<&str>, body: &str) -> HttpResponse {
        let mut headers = HashMap::new();
        if let Some(ct) = content_type {
            headers.insert("content-type".to_string(), ct.to_string());
        }
        HttpResponse {
            status: 200,
            final_url: "https://shop.test/".to_string(),
            headers,
            body: body.to_string(),
            truncated: false,
            duration_ms: 1,
        }
    }

    #[test]
    fn test_looks_like_json() {
        assert!(response(Some("application/json; charset=utf-8"), "").looks_like_json());
        assert!(response(Some("text/plain"), "  {\"a\":1}").looks_like_json());
        assert!(!response(Some("text/html"), "<html>").looks_like_json());
        assert_eq!(
            response(Some("text/html"), "").header("Content-Type"),
            Some("text/html")
        );
    }
}
