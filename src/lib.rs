//! Vector similarity search read-path for retrieval-augmented generation.

pub mod config;
pub mod error;
pub mod io;
pub mod search;

// Explicit exports for better API clarity
pub use config::Settings;
pub use error::{ErrorContext, SearchError, SearchOutcome, Severity};
pub use search::{
    EmbeddingProvider, FastEmbedProvider, MemoryVectorStore, SearchConfig, SearchEngine,
    SearchQuery, SearchResult, VectorStore,
};
