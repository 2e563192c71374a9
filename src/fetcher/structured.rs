//! Reuse of the direct response when it already carries product data.

use async_trait::async_trait;

use super::{
    has_product_signals, ContentKind, FetchContext, FetchMode, FetchedPage, Strategy,
    StrategyOutcome,
};
use crate::extractor::jsonld;

pub(super) struct StructuredStrategy;

#[async_trait]
impl Strategy for StructuredStrategy {
    fn mode(&self) -> FetchMode {
        FetchMode::StructuredData
    }

    async fn attempt(&self, ctx: &mut FetchContext) -> StrategyOutcome {
        let Some(direct) = ctx.direct.as_ref() else {
            return StrategyOutcome::Miss("no direct response".to_string());
        };
        if !direct.is_success() {
            return StrategyOutcome::Miss(format!("direct response was HTTP {}", direct.status));
        }

        let nodes = jsonld::product_nodes(&direct.body);
        if !nodes.is_empty() {
            return match serde_json::to_string(&nodes) {
                Ok(content) => {
                    let mut page = FetchedPage::from_response(direct, ContentKind::StructuredData);
                    page.content = content;
                    page.content_type = Some("application/ld+json".to_string());
                    StrategyOutcome::Hit(page)
                }
                Err(e) => StrategyOutcome::Miss(format!("could not serialize JSON-LD: {}", e)),
            };
        }

        if has_product_signals(&direct.body) {
            return StrategyOutcome::Hit(FetchedPage::from_response(direct, ContentKind::Html));
        }
        StrategyOutcome::Miss("no structured product data".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::HttpResponse;
    use std::collections::HashMap;
    use url::Url;

    fn context(body: &str, status: u16) -> FetchContext {
        let mut ctx = FetchContext::new(Url::parse("https://shop.test/products/a").unwrap());
        ctx.direct = Some(HttpResponse {
            status,
            final_url: "https://shop.test/products/a".to_string(),
            headers: HashMap::new(),
            body: body.to_string(),
            truncated: false,
            duration_ms: 3,
        });
        ctx
    }

    #[tokio::test]
    async fn test_json_ld_blocks_become_structured_content() {
        let mut ctx = context(
            r#"<script type="application/ld+json">{"@type":"Product","name":"Mug"}</script>"#,
            200,
        );
        match StructuredStrategy.attempt(&mut ctx).await {
            StrategyOutcome::Hit(page) => {
                assert_eq!(page.content_kind, ContentKind::StructuredData);
                let nodes: Vec<serde_json::Value> = serde_json::from_str(&page.content).unwrap();
                assert_eq!(nodes[0]["name"], "Mug");
            }
            StrategyOutcome::Miss(reason) => panic!("unexpected miss: {}", reason),
        }
    }

    #[tokio::test]
    async fn test_signals_without_schema_fall_back_to_html() {
        let mut ctx = context(r#"<span itemprop="price">9.99</span>"#, 200);
        assert!(matches!(
            StructuredStrategy.attempt(&mut ctx).await,
            StrategyOutcome::Hit(FetchedPage { content_kind: ContentKind::Html, .. })
        ));
    }

    #[tokio::test]
    async fn test_error_status_misses() {
        let mut ctx = context(r#"{"@type":"Product"}"#, 503);
        assert!(matches!(
            StructuredStrategy.attempt(&mut ctx).await,
            StrategyOutcome::Miss(_)
        ));
    }
}
