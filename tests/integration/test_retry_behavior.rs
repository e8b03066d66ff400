//! Test: transient failures are retried with growing backoff
//!
//! Runs on tokio's paused clock so backoff sleeps complete instantly while
//! still being measurable.

use crate::support::{EventLog, MockEmbedder, MockStore, engine, fast_retry_config, row};
use ragsearch::search::embedding::ProviderError;
use ragsearch::search::logger::events;
use ragsearch::search::store::StoreError;
use ragsearch::{SearchConfig, SearchQuery};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Level;

#[tokio::test(start_paused = true)]
async fn test_store_recovers_on_third_attempt() {
    let embedder = Arc::new(MockEmbedder::new(vec![0.5, 0.5]));
    let store = Arc::new(MockStore::new(vec![row("a", 0.1)]).failing_first([
        StoreError::Connection("connection reset".into()),
        StoreError::Connection("connection reset".into()),
    ]));
    let engine = engine(&embedder, &store, fast_retry_config(3));

    let results = engine
        .search(&SearchQuery::new("retry me").unwrap())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(store.calls(), 3);
    // Embedding succeeded first time and is not repeated by store retries.
    assert_eq!(embedder.calls(), 1);

    let times = store.call_times();
    let first_gap = times[1] - times[0];
    let second_gap = times[2] - times[1];
    assert!(first_gap >= Duration::from_millis(100), "{first_gap:?}");
    assert!(second_gap >= Duration::from_millis(200), "{second_gap:?}");
    assert!(second_gap > first_gap);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_original_failure() {
    let (log, _guard) = EventLog::install();
    let embedder = Arc::new(MockEmbedder::new(vec![0.5, 0.5]));
    let store = Arc::new(
        MockStore::empty().always_failing(StoreError::Other("connection refused by pooler".into())),
    );
    let engine = engine(&embedder, &store, fast_retry_config(2));

    let err = engine
        .search(&SearchQuery::new("never works").unwrap())
        .await
        .unwrap_err();

    assert_eq!(store.calls(), 3);
    assert_eq!(err.error_code(), "DB_CONNECTION_ERROR");
    assert_eq!(err.message(), "connection error");
    assert_eq!(
        err.context().get("original_error"),
        Some("connection refused by pooler")
    );
    assert_eq!(err.context().get("table_name"), Some("document_chunks"));

    assert_eq!(log.count(events::RETRY_ATTEMPT), 2);
    assert_eq!(log.count(events::RETRY_EXHAUSTED), 1);
    // Logged once where it leaves the engine, not once per attempt.
    assert_eq!(log.count(events::SEARCH_ERROR), 1);
    assert_eq!(log.count_level(Level::ERROR), 1);
    assert!(!log.has_field(events::RETRY_EXHAUSTED, "error"));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_embedding_is_retried() {
    let embedder = Arc::new(
        MockEmbedder::new(vec![0.5, 0.5])
            .failing_first([ProviderError::Other("Rate limit exceeded".into())]),
    );
    let store = Arc::new(MockStore::new(vec![row("a", 0.1)]));
    let engine = engine(&embedder, &store, fast_retry_config(3));

    let results = engine
        .search(&SearchQuery::new("retry me").unwrap())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(embedder.calls(), 2);
    assert_eq!(store.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_retry_fails_fast() {
    let embedder = Arc::new(MockEmbedder::new(vec![0.5, 0.5]));
    let store = Arc::new(
        MockStore::new(vec![row("a", 0.1)])
            .failing_first([StoreError::Timeout("statement timeout".into())]),
    );
    let config = SearchConfig {
        retry: None,
        ..SearchConfig::default()
    };
    let engine = engine(&embedder, &store, config);

    let err = engine
        .search(&SearchQuery::new("once only").unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "DB_CONNECTION_ERROR");
    assert!(err.is_retryable());
    assert_eq!(store.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_authentication_failure_is_classified() {
    let embedder = Arc::new(MockEmbedder::new(vec![0.5, 0.5]));
    let store = Arc::new(
        MockStore::empty().always_failing(StoreError::Authentication("invalid api key".into())),
    );
    let engine = engine(&embedder, &store, fast_retry_config(1));

    let err = engine
        .get_chunk_by_id("chunk-1")
        .await
        .unwrap_err();

    assert_eq!(err.message(), "authentication error");
    assert_eq!(store.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_only_delays_its_own_search() {
    let embedder = Arc::new(MockEmbedder::new(vec![0.5, 0.5]));
    let flaky = Arc::new(
        MockStore::new(vec![row("a", 0.1)])
            .failing_first([StoreError::Connection("reset".into())]),
    );
    let healthy = Arc::new(MockStore::new(vec![row("b", 0.1)]));

    let slow_engine = engine(&embedder, &flaky, fast_retry_config(3));
    let fast_engine = engine(&embedder, &healthy, fast_retry_config(3));
    let query = SearchQuery::new("concurrent").unwrap();

    let started = tokio::time::Instant::now();
    let (slow, fast) = tokio::join!(
        async {
            let r = slow_engine.search(&query).await;
            (r, started.elapsed())
        },
        async {
            let r = fast_engine.search(&query).await;
            (r, started.elapsed())
        },
    );

    assert!(slow.0.is_ok());
    assert!(fast.0.is_ok());
    assert!(slow.1 >= Duration::from_millis(100));
    assert!(fast.1 < Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_backoff_stops_retries() {
    let (log, _guard) = EventLog::install();
    let embedder = Arc::new(MockEmbedder::new(vec![0.5, 0.5]));
    let store = Arc::new(
        MockStore::empty().always_failing(StoreError::Connection("connection reset".into())),
    );
    let engine = engine(&embedder, &store, fast_retry_config(3));

    // Attempts land at 0ms and 100ms; the third would start at 300ms.
    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            token.cancel();
        })
    };

    let err = engine
        .search_with_cancellation(&SearchQuery::new("give up").unwrap(), &token)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert_eq!(err.error_code(), "SEARCH_CANCELLED");
    assert_eq!(store.calls(), 2);

    // Nothing resumes after the drop.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.calls(), 2);
    assert_eq!(log.count(events::SEARCH_ERROR), 1);
    assert_eq!(log.count(events::RETRY_EXHAUSTED), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_drops_in_flight_store_call() {
    let embedder = Arc::new(MockEmbedder::new(vec![0.5, 0.5]));
    let store = Arc::new(MockStore::new(vec![row("a", 0.1)]).with_delay(Duration::from_secs(10)));
    let engine = engine(&embedder, &store, fast_retry_config(3));

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        })
    };

    let started = tokio::time::Instant::now();
    let err = engine
        .search_with_cancellation(&SearchQuery::new("slow store").unwrap(), &token)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert_eq!(err.error_code(), "SEARCH_CANCELLED");
    assert_eq!(store.calls(), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
}
