//! Vector/document store seam.
//!
//! A [`VectorStore`] serves four request shapes: similarity search,
//! hybrid search, attribute-filter queries and id lookup. Stores must use
//! parameterized queries; the denylist in front of them is only a
//! heuristic.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::error::{ErrorContext, SearchError};
use crate::search::embedding::VectorDimension;
use crate::search::filter::FilterCondition;
use crate::search::result::RawRow;

/// Failure reported by a store client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

/// Nearest-neighbour request in cosine-distance terms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityRequest {
    pub embedding: Vec<f32>,
    /// Rows farther than this are excluded.
    pub max_distance: f64,
    pub limit: usize,
    pub filters: Vec<FilterCondition>,
}

/// Combined vector and full-text request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridRequest {
    pub query_text: String,
    pub embedding: Vec<f32>,
    pub limit: usize,
    pub similarity_threshold: f64,
    pub filters: Vec<FilterCondition>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Dimension of stored embeddings, if the store knows it.
    fn dimension(&self) -> Option<VectorDimension> {
        None
    }

    /// Rows ordered by ascending distance.
    async fn similarity_search(&self, request: &SimilarityRequest) -> Result<Vec<RawRow>, StoreError>;

    /// Rows ranked by the store's hybrid function.
    async fn hybrid_search(&self, request: &HybridRequest) -> Result<Vec<RawRow>, StoreError>;

    /// Unranked rows matching every condition.
    async fn query_table(
        &self,
        conditions: &[FilterCondition],
        limit: usize,
    ) -> Result<Vec<RawRow>, StoreError>;

    /// Zero or one row with the given id.
    async fn query_by_id(&self, chunk_id: &str) -> Result<Vec<RawRow>, StoreError>;
}

/// Map a store failure into the error taxonomy.
pub fn classify_store_error(error: StoreError, table_name: &str) -> SearchError {
    let context = ErrorContext::new()
        .with("table_name", table_name)
        .with("original_error", &error);

    match &error {
        StoreError::Authentication(_) => SearchError::database("authentication error", context),
        StoreError::Connection(_) | StoreError::Timeout(_) => {
            SearchError::database("connection error", context)
        }
        StoreError::Other(message) => {
            let lower = message.to_lowercase();
            if lower.contains("connection") || lower.contains("timeout") {
                SearchError::database("connection error", context)
            } else if lower.contains("permission") || lower.contains("auth") {
                SearchError::database("authentication error", context)
            } else {
                SearchError::database(format!("database search error: {message}"), context)
            }
        }
    }
}
