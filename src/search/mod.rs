//! Vector similarity search read-path.
//!
//! A [`SearchQuery`] is validated on construction, embedded through an
//! [`EmbeddingProvider`], executed against a [`VectorStore`] and converted
//! into [`SearchResult`]s by the [`SearchEngine`].

pub mod embedding;
pub mod engine;
pub mod filter;
pub mod logger;
pub mod memory;
pub mod query;
pub mod result;
pub mod retry;
pub mod security;
pub mod store;

pub use embedding::{EmbeddingProvider, FastEmbedProvider, ProviderError, VectorDimension};
pub use engine::{SearchConfig, SearchEngine};
pub use filter::{FilterCondition, FilterOp, FilterValue, Filters};
pub use logger::StructuredLogger;
pub use memory::{MemoryVectorStore, StoredChunk};
pub use query::{SearchQuery, SearchQueryBuilder};
pub use result::{ChunkMetadata, RawRow, SearchResult, similarity_from_distance, to_results};
pub use retry::{RetryPolicy, Retryable, retry_with_backoff};
pub use store::{HybridRequest, SimilarityRequest, StoreError, VectorStore};
