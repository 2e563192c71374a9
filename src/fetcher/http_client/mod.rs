//! HTTP client used by the direct and storefront-JSON strategies.

mod response;
mod user_agent;

pub use response::HttpResponse;
pub use user_agent::{random_user_agent, resolve_user_agent, DESKTOP_USER_AGENTS};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use tracing::debug;

use super::config::FetchConfig;
use super::FetchError;

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json,text/javascript;q=0.9,*/*;q=0.5";

/// What the caller expects back; decides oversize handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Oversized bodies are truncated.
    Html,
    /// Oversized bodies are rejected; a cut JSON document is useless.
    Json,
}

/// HTTP client that looks like a desktop browser and never reads more than
/// the configured ceiling.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    accept_language: String,
    max_bytes: usize,
    user_agent: String,
}

impl HttpClient {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let user_agent = resolve_user_agent(config.user_agent.as_deref());
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            accept_language: config.accept_language.clone(),
            max_bytes: config.max_content_bytes,
            user_agent,
        })
    }

    /// The user agent this client sends.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// GET a URL, reading the body in chunks up to the size ceiling.
    pub async fn get(&self, url: &str, kind: BodyKind) -> Result<HttpResponse, FetchError> {
        let accept = match kind {
            BodyKind::Html => ACCEPT_HTML,
            BodyKind::Json => ACCEPT_JSON,
        };

        let start = Instant::now();
        let mut response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .send()
            .await
            .map_err(|e| FetchError::Http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        if kind == BodyKind::Json {
            if let Some(declared) = response.content_length() {
                if declared as usize > self.max_bytes {
                    return Err(FetchError::Oversized {
                        limit: self.max_bytes,
                    });
                }
            }
        }

        let mut body: Vec<u8> = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Http(format!("reading {} failed: {}", url, e)))?
        {
            let room = self.max_bytes.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        if truncated && kind == BodyKind::Json {
            return Err(FetchError::Oversized {
                limit: self.max_bytes,
            });
        }
        if truncated {
            // Drop a multi-byte sequence cut in half by the ceiling
            if let Err(e) = std::str::from_utf8(&body) {
                if e.error_len().is_none() {
                    body.truncate(e.valid_up_to());
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            "GET {} -> {} ({} bytes{}, {}ms)",
            url,
            status,
            body.len(),
            if truncated { ", truncated" } else { "" },
            duration_ms
        );

        Ok(HttpResponse {
            status,
            final_url,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
            truncated,
            duration_ms,
        })
    }
}
