//! Test: searching a JSON chunk file through the in-memory store

use crate::support::MockEmbedder;
use ragsearch::search::filter::parse_filter_expressions;
use ragsearch::search::{MemoryVectorStore, VectorDimension};
use ragsearch::{SearchConfig, SearchEngine, SearchQuery, Settings};
use std::sync::Arc;
use tempfile::TempDir;

const CHUNKS: &str = r#"[
    {
        "id": "intro-1",
        "content": "Embeddings map text into vectors so similar passages sit close together.",
        "filename": "primer.pdf",
        "page_number": 1,
        "section_name": "Introduction",
        "chapter_number": 1,
        "token_count": 14,
        "embedding": [1.0, 0.0, 0.0]
    },
    {
        "id": "index-4",
        "content": "An approximate index trades recall for query speed.",
        "filename": "primer.pdf",
        "page_number": 4,
        "chapter_number": 2,
        "token_count": 10,
        "embedding": [0.9, 0.1, 0.0]
    },
    {
        "id": "appendix-9",
        "content": "Glossary of terms.",
        "filename": "appendix.pdf",
        "page_number": 9,
        "embedding": [0.0, 0.0, 1.0]
    }
]"#;

fn engine_over_file() -> (SearchEngine, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("chunks.json");
    std::fs::write(&path, CHUNKS).unwrap();

    let store = MemoryVectorStore::load_json(&path).unwrap();
    assert_eq!(store.len(), 3);

    let config = SearchConfig {
        embedding_dimension: VectorDimension::new(3),
        ..SearchConfig::default()
    };
    let engine = SearchEngine::new(
        Arc::new(MockEmbedder::new(vec![1.0, 0.0, 0.0])),
        Arc::new(store),
        config,
    )
    .unwrap();
    (engine, temp_dir)
}

#[tokio::test]
async fn test_search_ranks_by_cosine_similarity() {
    let (engine, _dir) = engine_over_file();

    let results = engine
        .search(&SearchQuery::new("what are embeddings").unwrap())
        .await
        .unwrap();

    let ids: Vec<_> = results.iter().map(|r| r.chunk_id()).collect();
    assert_eq!(ids, vec!["intro-1", "index-4"]);
    assert!(results[0].similarity_score() > results[1].similarity_score());
    assert_eq!(
        results[0].metadata().unwrap().section_name.as_deref(),
        Some("Introduction")
    );
}

#[tokio::test]
async fn test_filters_restrict_similarity_search() {
    let (engine, _dir) = engine_over_file();

    let filters = parse_filter_expressions(&["page_number>=2"]).unwrap();
    let query = SearchQuery::builder("what are embeddings")
        .filters(filters)
        .build()
        .unwrap();
    let results = engine.search(&query).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_id(), "index-4");
}

#[tokio::test]
async fn test_filter_only_search_and_lookup() {
    let (engine, _dir) = engine_over_file();

    let filters = parse_filter_expressions(&["filename=primer.pdf"]).unwrap();
    let results = engine.search_by_filters(&filters, 10).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.similarity_score() == 0.0));

    let appendix = engine.get_chunk_by_id("appendix-9").await.unwrap().unwrap();
    assert_eq!(appendix.filename(), "appendix.pdf");
    assert_eq!(appendix.similarity_score(), 1.0);
}

#[test]
fn test_config_from_settings_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.toml");
    std::fs::write(
        &path,
        r#"
[search]
table_name = "kb_chunks"
performance_threshold_ms = 250
call_timeout_ms = 2000

[retry]
max_retries = 5
base_delay_ms = 200
max_delay_ms = 1000
"#,
    )
    .unwrap();

    let settings = Settings::load_from(&path).unwrap();
    let config = SearchConfig::from_settings(&settings).unwrap();

    assert_eq!(config.table_name, "kb_chunks");
    assert_eq!(config.performance_threshold.as_millis(), 250);
    assert_eq!(config.call_timeout.as_millis(), 2000);
    let retry = config.retry.unwrap();
    assert_eq!(retry.max_retries, 5);
    assert_eq!(retry.delay_for(4).as_millis(), 1000);
}

#[test]
fn test_invalid_retry_settings_fail_initialization() {
    let mut settings = Settings::default();
    settings.retry.base_delay_ms = 5_000;
    settings.retry.max_delay_ms = 100;

    let err = SearchConfig::from_settings(&settings).unwrap_err();
    assert_eq!(err.error_code(), "INITIALIZATION_ERROR");
}
