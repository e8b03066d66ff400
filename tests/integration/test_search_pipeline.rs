//! Test: end-to-end behaviour of the search pipeline against mocks
//!
//! Covers validation short-circuiting, score conversion, determinism,
//! request shaping and the absent-chunk outcome.

use crate::support::{EventLog, MockEmbedder, MockStore, engine, row};
use ragsearch::search::embedding::ProviderError;
use ragsearch::search::filter::{FilterCondition, FilterOp, Filters};
use ragsearch::search::logger::events;
use ragsearch::search::result::RawRow;
use ragsearch::{SearchConfig, SearchQuery, Severity};
use serde_json::json;
use std::sync::Arc;

fn mocks(rows: Vec<RawRow>) -> (Arc<MockEmbedder>, Arc<MockStore>) {
    (
        Arc::new(MockEmbedder::new(vec![0.1, 0.2, 0.3])),
        Arc::new(MockStore::new(rows)),
    )
}

#[tokio::test]
async fn test_denylisted_text_never_reaches_collaborators() {
    let (embedder, store) = mocks(vec![row("a", 0.1)]);
    let engine = engine(&embedder, &store, SearchConfig::default());

    for text in ["'; DROP TABLE documents; --", "<script>alert(1)</script>"] {
        let err = SearchQuery::new(text).unwrap_err();
        assert_eq!(err.error_code(), "SECURITY_ERROR");
        assert_eq!(err.severity(), Severity::Critical);
    }

    // Passes construction, rejected by the engine's wider scan.
    let query = SearchQuery::new("load file:///etc/shadow").unwrap();
    let err = engine.search(&query).await.unwrap_err();
    assert_eq!(err.error_code(), "SECURITY_ERROR");
    assert_eq!(err.context().get("pattern_class"), Some("dangerous_protocol"));
    assert!(!err.context().to_string().contains("shadow"));

    assert_eq!(embedder.calls(), 0);
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_distance_converts_to_similarity() {
    let (embedder, store) = mocks(vec![row("a", 0.2), row("b", 0.35)]);
    let engine = engine(&embedder, &store, SearchConfig::default());

    let query = SearchQuery::builder("how are chunks ranked")
        .similarity_threshold(0.5)
        .build()
        .unwrap();
    let results = engine.search(&query).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!((results[0].similarity_score() - 0.8).abs() < 1e-9);
    assert!((results[1].similarity_score() - 0.65).abs() < 1e-9);
    assert_eq!(results[0].filename(), "handbook.pdf");
    assert_eq!(results[0].page_number(), 12);
    assert_eq!(results[0].metadata().unwrap().token_count, 64);
}

#[tokio::test]
async fn test_metadata_omitted_when_not_requested() {
    let (embedder, store) = mocks(vec![row("a", 0.1)]);
    let engine = engine(&embedder, &store, SearchConfig::default());

    let query = SearchQuery::builder("anything")
        .include_metadata(false)
        .build()
        .unwrap();
    let results = engine.search(&query).await.unwrap();
    assert!(results[0].metadata().is_none());
}

#[tokio::test]
async fn test_identical_queries_give_identical_results() {
    let (embedder, store) = mocks(vec![row("a", 0.05), row("b", 0.2), row("c", 0.29)]);
    let engine = engine(&embedder, &store, SearchConfig::default());
    let query = SearchQuery::new("vector indexes").unwrap();

    let first = engine.search(&query).await.unwrap();
    let second = engine.search(&query).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.calls(), 2);
}

#[tokio::test]
async fn test_similarity_request_shape() {
    let (embedder, store) = mocks(vec![]);
    let engine = engine(&embedder, &store, SearchConfig::default());

    let filters: Filters = serde_json::from_value(json!({
        "filename": "handbook.pdf",
        "page_number": {"$gte": 3, "$regex": "ignored"}
    }))
    .unwrap();
    let query = SearchQuery::builder("chunking strategies")
        .limit(7)
        .similarity_threshold(0.75)
        .filters(filters)
        .build()
        .unwrap();

    let results = engine.search(&query).await.unwrap();
    assert!(results.is_empty());

    let request = store.last_similarity().unwrap();
    assert_eq!(request.embedding, vec![0.1, 0.2, 0.3]);
    assert_eq!(request.limit, 7);
    assert!((request.max_distance - 0.25).abs() < 1e-12);
    assert_eq!(
        request.filters,
        vec![
            FilterCondition::new("filename", FilterOp::Eq, json!("handbook.pdf")),
            FilterCondition::new("page_number", FilterOp::Gte, json!(3)),
        ]
    );
}

#[tokio::test]
async fn test_hybrid_search_sends_query_text() {
    let (embedder, store) = mocks(vec![row("a", 0.3)]);
    let engine = engine(&embedder, &store, SearchConfig::default());

    let query = SearchQuery::builder("tokenizer limits")
        .similarity_threshold(0.6)
        .build()
        .unwrap();
    let results = engine.hybrid_search(&query).await.unwrap();
    assert_eq!(results.len(), 1);

    let request = store.last_hybrid().unwrap();
    assert_eq!(request.query_text, "tokenizer limits");
    assert_eq!(request.similarity_threshold, 0.6);
    assert!(store.last_similarity().is_none());
}

#[tokio::test]
async fn test_missing_chunk_is_absent_not_error() {
    let (embedder, store) = mocks(vec![]);
    let engine = engine(&embedder, &store, SearchConfig::default());

    let result = engine.get_chunk_by_id("chunk-404").await.unwrap();
    assert!(result.is_none());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_lookup_scores_exact_match_as_one() {
    let (embedder, store) = mocks(vec![row("chunk-7", 0.9)]);
    let engine = engine(&embedder, &store, SearchConfig::default());

    let result = engine.get_chunk_by_id("chunk-7").await.unwrap().unwrap();
    assert_eq!(result.similarity_score(), 1.0);
    assert!(result.metadata().is_some());
}

#[tokio::test]
async fn test_filter_search_is_unranked() {
    let (embedder, store) = mocks(vec![row("a", 0.1), row("b", 0.2), row("c", 0.3)]);
    let engine = engine(&embedder, &store, SearchConfig::default());

    let filters: Filters = serde_json::from_value(json!({"chapter_number": 3})).unwrap();
    let results = engine.search_by_filters(&filters, 2).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_malformed_rows_are_skipped_with_warning() {
    let (log, _guard) = EventLog::install();
    let mut bad_page = row("bad-page", 0.1);
    bad_page.page_number = Some(0);
    let too_far = row("too-far", 1.4);
    let (embedder, store) = mocks(vec![row("good", 0.1), bad_page, too_far]);
    let engine = engine(&embedder, &store, SearchConfig::default());

    let results = engine
        .search(&SearchQuery::new("anything").unwrap())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_id(), "good");
    assert_eq!(log.count(events::RESULT_SKIPPED), 2);
}

#[tokio::test]
async fn test_empty_embedding_fails_without_retry() {
    let embedder = Arc::new(
        MockEmbedder::new(vec![0.1]).failing_first([ProviderError::EmptyVector]),
    );
    let store = Arc::new(MockStore::new(vec![row("a", 0.1)]));
    let engine = engine(&embedder, &store, crate::support::fast_retry_config(3));

    let err = engine
        .search(&SearchQuery::new("anything").unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "EMBEDDING_ERROR");
    assert_eq!(err.message(), "empty embedding vector returned");
    assert_eq!(embedder.calls(), 1);
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_success_logs_start_and_success_once() {
    let (log, _guard) = EventLog::install();
    let (embedder, store) = mocks(vec![row("a", 0.1)]);
    let engine = engine(&embedder, &store, SearchConfig::default());

    engine
        .search(&SearchQuery::new("anything").unwrap())
        .await
        .unwrap();

    assert_eq!(log.count(events::SEARCH_START), 1);
    assert_eq!(log.count(events::SEARCH_SUCCESS), 1);
    assert_eq!(log.count(events::SEARCH_ERROR), 0);
}
