//! The fetch deadline holds against a server that never answers.

use std::time::{Duration, Instant};

use tokio::net::TcpListener;

use pricewatch::{Fetch, FetchConfig, FetchError, PageFetcher};

#[tokio::test]
async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            match listener.accept().await {
                Ok((socket, _)) => held.push(socket),
                Err(_) => break,
            }
        }
    });

    let mut config = FetchConfig {
        timeout_secs: 1,
        ..FetchConfig::default()
    };
    config.browser.enabled = false;
    let fetcher = PageFetcher::new(&config).unwrap();

    let start = Instant::now();
    let result = fetcher.fetch(&format!("http://{}/products/lamp", addr)).await;
    let elapsed = start.elapsed();

    assert!(!result.success);
    assert_eq!(result.error, Some(FetchError::Timeout(1)));
    assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
    assert!(result
        .metadata
        .attempts
        .last()
        .is_some_and(|a| a.outcome == "timed out"));

    server.abort();
}

#[tokio::test]
async fn test_unsupported_scheme_is_rejected() {
    let fetcher = PageFetcher::new(&FetchConfig::default()).unwrap();
    let result = fetcher.fetch("ftp://shop.test/lamp").await;
    assert!(matches!(result.error, Some(FetchError::InvalidUrl(_))));
    assert!(result.metadata.attempts.is_empty());
}
