//! Embedding provider seam.
//!
//! The engine talks to any [`EmbeddingProvider`]. Provider failures come
//! back as [`ProviderError`] and are classified into [`SearchError`]s here,
//! which decides whether a retry can help.
//!
//! [`FastEmbedProvider`] is the bundled local implementation.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use crate::config::EmbeddingConfig;
use crate::error::{ErrorContext, SearchError, SearchOutcome, Severity, codes};

/// Dimension of AllMiniLML6V2 embeddings.
pub const VECTOR_DIMENSION_384: usize = 384;

/// Validated, non-zero embedding dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Returns `None` for zero.
    #[must_use]
    pub fn new(dim: usize) -> Option<Self> {
        (dim > 0).then_some(Self(dim))
    }

    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// A mismatch is a configuration defect, so it is not retryable.
    pub fn validate_vector(&self, vector: &[f32]) -> SearchOutcome<()> {
        if vector.len() != self.0 {
            return Err(SearchError::embedding_fatal(
                "embedding dimension mismatch",
                ErrorContext::new()
                    .with("expected_dimension", self.0)
                    .with("actual_dimension", vector.len()),
            ));
        }
        Ok(())
    }
}

/// Failure reported by an embedding provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("provider returned an empty embedding")]
    EmptyVector,

    #[error("expected {expected}-dimension embeddings, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{0}")]
    Other(String),
}

/// Produces query embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Dimension this provider produces, if known up front.
    fn dimension(&self) -> Option<VectorDimension> {
        None
    }
}

/// Map a provider failure into the error taxonomy.
///
/// Typed variants map directly. `Other` falls back to message sniffing so
/// opaque client errors still land in the right bucket.
pub fn classify_provider_error(error: ProviderError, text_length: usize) -> SearchError {
    let original = error.to_string();
    let context = || {
        ErrorContext::new()
            .with("original_error", &original)
            .with("text_length", text_length)
    };

    match error {
        ProviderError::RateLimited(_) => SearchError::embedding("API usage limit reached", context()),
        ProviderError::Connection(_) | ProviderError::Timeout(_) => {
            SearchError::embedding("API connection error", context())
        }
        ProviderError::EmptyVector => {
            SearchError::embedding_fatal("empty embedding vector returned", context())
        }
        ProviderError::DimensionMismatch { expected, actual } => SearchError::embedding_fatal(
            "embedding dimension mismatch",
            context()
                .with("expected_dimension", expected)
                .with("actual_dimension", actual),
        ),
        ProviderError::Other(message) => {
            let lower = message.to_lowercase();
            if lower.contains("rate limit") || lower.contains("quota") {
                SearchError::embedding("API usage limit reached", context())
            } else if lower.contains("connection") || lower.contains("timeout") {
                SearchError::embedding("API connection error", context())
            } else {
                SearchError::embedding(format!("embedding generation error: {message}"), context())
            }
        }
    }
}

/// Parse a model name from settings.
pub fn parse_embedding_model(name: &str) -> Option<EmbeddingModel> {
    match name {
        "AllMiniLML6V2" | "all-MiniLM-L6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" | "all-MiniLM-L12-v2" => Some(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" | "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" | "bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" | "multilingual-e5-small" => {
            Some(EmbeddingModel::MultilingualE5Small)
        }
        _ => None,
    }
}

/// Local embedding provider backed by fastembed.
///
/// Inference runs on tokio's blocking pool so it never stalls the
/// executor.
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: VectorDimension,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("model", &"<TextEmbedding>")
            .finish()
    }
}

impl FastEmbedProvider {
    /// Load the configured model, downloading it on first use.
    pub fn new(config: &EmbeddingConfig) -> SearchOutcome<Self> {
        let init_error = |message: String| {
            SearchError::generic(
                codes::INITIALIZATION_ERROR,
                message,
                Severity::Critical,
                ErrorContext::new().with("model", &config.model),
            )
        };

        let model = parse_embedding_model(&config.model)
            .ok_or_else(|| init_error(format!("unknown embedding model '{}'", config.model)))?;

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(config.cache_dir.clone())
                .with_show_download_progress(config.show_download_progress),
        )
        .map_err(|e| {
            init_error(format!(
                "failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download"
            ))
        })?;

        // Probe once to learn the output dimension.
        let probe = text_model
            .embed(vec!["dimension probe"], None)
            .map_err(|e| init_error(format!("failed to probe embedding model: {e}")))?;
        let dimension = probe
            .first()
            .and_then(|v| VectorDimension::new(v.len()))
            .ok_or_else(|| init_error("embedding model produced an empty vector".to_string()))?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_model)),
            model_name: config.model.clone(),
            dimension,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Embed a batch of documents synchronously.
    pub fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.model
            .lock()
            .embed(texts, None)
            .map_err(|e| ProviderError::Other(format!("failed to generate embeddings: {e}")))
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        let embeddings = tokio::task::spawn_blocking(move || model.lock().embed(vec![text], None))
            .await
            .map_err(|e| ProviderError::Other(format!("embedding task failed: {e}")))?
            .map_err(|e| ProviderError::Other(format!("failed to generate embedding: {e}")))?;

        embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(ProviderError::EmptyVector)
    }

    fn dimension(&self) -> Option<VectorDimension> {
        Some(self.dimension)
    }
}
