//! Search orchestration.
//!
//! [`SearchEngine`] runs one request through validate, embed, execute and
//! convert, timing the whole pipeline against the performance threshold.
//! Embedding and store calls are each bounded by the call timeout and,
//! when a retry policy is configured, retried individually.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::{ErrorContext, SearchError, SearchOutcome, Severity, codes};
use crate::search::embedding::{
    EmbeddingProvider, ProviderError, VectorDimension, classify_provider_error,
};
use crate::search::filter::{Filters, compile_filters};
use crate::search::logger::StructuredLogger;
use crate::search::query::{
    HARD_MAX_QUERY_CHARS, SearchQuery, validate_fields, validate_filter_depth, validate_limit,
};
use crate::search::result::{RawRow, SearchResult, to_results};
use crate::search::retry::{RetryPolicy, retry_with_backoff};
use crate::search::security::EXTENDED_DENYLIST;
use crate::search::store::{
    HybridRequest, SimilarityRequest, StoreError, VectorStore, classify_store_error,
};

/// Default latency budget for one search.
pub const DEFAULT_PERFORMANCE_THRESHOLD: Duration = Duration::from_millis(500);

/// Default bound for a single collaborator call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime configuration for one engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub table_name: String,
    pub performance_threshold: Duration,
    pub call_timeout: Duration,
    /// `None` disables retries.
    pub retry: Option<RetryPolicy>,
    /// Overrides whatever dimension the store reports.
    pub embedding_dimension: Option<VectorDimension>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            table_name: "document_chunks".to_string(),
            performance_threshold: DEFAULT_PERFORMANCE_THRESHOLD,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            retry: Some(RetryPolicy::default()),
            embedding_dimension: None,
        }
    }
}

fn init_error(message: impl Into<String>, context: ErrorContext) -> SearchError {
    SearchError::generic(codes::INITIALIZATION_ERROR, message, Severity::Critical, context)
}

impl SearchConfig {
    /// Derive engine configuration from loaded settings.
    pub fn from_settings(settings: &Settings) -> SearchOutcome<Self> {
        let search = &settings.search;
        let embedding_dimension = match search.embedding_dimension {
            None => None,
            Some(dim) => Some(VectorDimension::new(dim).ok_or_else(|| {
                init_error(
                    "embedding_dimension must be greater than zero",
                    ErrorContext::new().with("field", "search.embedding_dimension"),
                )
            })?),
        };

        let retry = settings.retry.enabled.then(|| {
            RetryPolicy::new(
                settings.retry.max_retries,
                Duration::from_millis(settings.retry.base_delay_ms),
                Duration::from_millis(settings.retry.max_delay_ms),
            )
        });

        let config = Self {
            table_name: search.table_name.clone(),
            performance_threshold: Duration::from_millis(search.performance_threshold_ms),
            call_timeout: Duration::from_millis(search.call_timeout_ms),
            retry,
            embedding_dimension,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values no pipeline can run with.
    pub fn validate(&self) -> SearchOutcome<()> {
        if self.table_name.trim().is_empty() {
            return Err(init_error(
                "table_name must not be empty",
                ErrorContext::new().with("field", "table_name"),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(init_error(
                "call_timeout must be greater than zero",
                ErrorContext::new().with("field", "call_timeout"),
            ));
        }
        if self.performance_threshold.is_zero() {
            return Err(init_error(
                "performance_threshold must be greater than zero",
                ErrorContext::new().with("field", "performance_threshold"),
            ));
        }
        if let Some(policy) = &self.retry {
            if policy.max_delay < policy.base_delay {
                return Err(init_error(
                    "retry max_delay must not be shorter than base_delay",
                    ErrorContext::new()
                        .with("base_delay_ms", policy.base_delay.as_millis())
                        .with("max_delay_ms", policy.max_delay.as_millis()),
                ));
            }
        }
        Ok(())
    }
}

/// How rows are fetched for an embedded query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Similarity,
    Hybrid,
}

impl Strategy {
    fn operation(self) -> &'static str {
        match self {
            Self::Similarity => "search",
            Self::Hybrid => "hybrid_search",
        }
    }
}

/// Orchestrates the search read-path over an embedding provider and a store.
pub struct SearchEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: SearchConfig,
    logger: StructuredLogger,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("config", &self.config)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

impl SearchEngine {
    /// Build an engine, failing with `INITIALIZATION_ERROR` on bad config
    /// or on collaborators that disagree about the embedding dimension.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: SearchConfig,
    ) -> SearchOutcome<Self> {
        config.validate()?;

        let expected = config.embedding_dimension.or_else(|| store.dimension());
        if let (Some(expected), Some(produced)) = (expected, embedder.dimension()) {
            if expected != produced {
                return Err(init_error(
                    "embedding provider and vector store disagree on dimension",
                    ErrorContext::new()
                        .with("expected_dimension", expected.get())
                        .with("provider_dimension", produced.get()),
                ));
            }
        }

        Ok(Self {
            embedder,
            store,
            config,
            logger: StructuredLogger::new("search_engine"),
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Vector similarity search.
    pub async fn search(&self, query: &SearchQuery) -> SearchOutcome<Vec<SearchResult>> {
        let operation = Strategy::Similarity.operation();
        self.run(query, Strategy::Similarity)
            .await
            .inspect_err(|e| self.logger.log_error(e, operation))
    }

    /// [`search`](Self::search) that stops early when `token` is cancelled.
    ///
    /// In-flight collaborator calls and backoff sleeps are dropped.
    pub async fn search_with_cancellation(
        &self,
        query: &SearchQuery,
        token: &CancellationToken,
    ) -> SearchOutcome<Vec<SearchResult>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let error = SearchError::generic(
                    codes::SEARCH_CANCELLED,
                    "search cancelled by caller",
                    Severity::Medium,
                    ErrorContext::new().with("query_length", query.text_length()),
                );
                self.logger.log_error(&error, Strategy::Similarity.operation());
                Err(error)
            }
            result = self.search(query) => result,
        }
    }

    /// Combined vector and lexical ranking.
    pub async fn hybrid_search(&self, query: &SearchQuery) -> SearchOutcome<Vec<SearchResult>> {
        let operation = Strategy::Hybrid.operation();
        self.run(query, Strategy::Hybrid)
            .await
            .inspect_err(|e| self.logger.log_error(e, operation))
    }

    /// Unranked rows matching `filters`. No embedding is generated.
    ///
    /// Rows carry no distance, so every result scores 0.0.
    pub async fn search_by_filters(
        &self,
        filters: &Filters,
        limit: usize,
    ) -> SearchOutcome<Vec<SearchResult>> {
        let operation = "search_by_filters";
        self.run_filters(filters, limit, operation)
            .await
            .inspect_err(|e| self.logger.log_error(e, operation))
    }

    /// Exact lookup. A missing chunk is `Ok(None)`.
    pub async fn get_chunk_by_id(&self, chunk_id: &str) -> SearchOutcome<Option<SearchResult>> {
        let operation = "get_chunk_by_id";
        self.run_lookup(chunk_id, operation)
            .await
            .inspect_err(|e| self.logger.log_error(e, operation))
    }

    /// Embed `text`, with timeout, retry and dimension checks.
    pub async fn generate_embedding(&self, text: &str) -> SearchOutcome<Vec<f32>> {
        let text_length = text.chars().count();
        self.with_retry("generate_embedding", || self.embed_once(text, text_length))
            .await
    }

    /// Fetch ranked rows for an already embedded query.
    pub async fn execute(&self, query: &SearchQuery, embedding: &[f32]) -> SearchOutcome<Vec<RawRow>> {
        let request = SimilarityRequest {
            embedding: embedding.to_vec(),
            max_distance: query.max_distance(),
            limit: query.limit(),
            filters: query.filters().map(compile_filters).unwrap_or_default(),
        };
        self.with_retry("execute", || {
            self.store_call(self.store.similarity_search(&request))
        })
        .await
    }

    /// Fetch hybrid-ranked rows for an already embedded query.
    pub async fn execute_hybrid(
        &self,
        query: &SearchQuery,
        embedding: &[f32],
    ) -> SearchOutcome<Vec<RawRow>> {
        let request = HybridRequest {
            query_text: query.text().to_string(),
            embedding: embedding.to_vec(),
            limit: query.limit(),
            similarity_threshold: query.similarity_threshold(),
            filters: query.filters().map(compile_filters).unwrap_or_default(),
        };
        self.with_retry("execute_hybrid", || {
            self.store_call(self.store.hybrid_search(&request))
        })
        .await
    }

    async fn run(&self, query: &SearchQuery, strategy: Strategy) -> SearchOutcome<Vec<SearchResult>> {
        let started = Instant::now();
        let operation = strategy.operation();
        let query_length = query.text_length();
        self.logger.log_search_start(
            operation,
            query_length,
            query.limit(),
            query.similarity_threshold(),
        );

        validate_fields(
            query.text(),
            query.limit(),
            query.similarity_threshold(),
            query.filters(),
            HARD_MAX_QUERY_CHARS,
            &EXTENDED_DENYLIST,
        )?;

        let embedding = self.generate_embedding(query.text()).await?;
        let rows = match strategy {
            Strategy::Similarity => self.execute(query, &embedding).await?,
            Strategy::Hybrid => self.execute_hybrid(query, &embedding).await?,
        };
        let results = to_results(rows, query.include_metadata(), &self.logger);

        self.finish(operation, started, results.len(), query_length);
        Ok(results)
    }

    async fn run_filters(
        &self,
        filters: &Filters,
        limit: usize,
        operation: &str,
    ) -> SearchOutcome<Vec<SearchResult>> {
        let started = Instant::now();
        self.logger.log_search_start(operation, 0, limit, 0.0);

        validate_limit(limit)?;
        validate_filter_depth(filters)?;

        let conditions = compile_filters(filters);
        let rows = self
            .with_retry(operation, || {
                self.store_call(self.store.query_table(&conditions, limit))
            })
            .await?;
        let results = to_results(rows, true, &self.logger);

        self.finish(operation, started, results.len(), 0);
        Ok(results)
    }

    async fn run_lookup(&self, chunk_id: &str, operation: &str) -> SearchOutcome<Option<SearchResult>> {
        let started = Instant::now();
        self.logger.log_search_start(operation, chunk_id.chars().count(), 1, 1.0);

        if chunk_id.trim().is_empty() {
            return Err(SearchError::validation(
                "chunk id must not be empty",
                ErrorContext::new().with("field", "chunk_id"),
            ));
        }

        let rows = self
            .with_retry(operation, || {
                self.store_call(self.store.query_by_id(chunk_id))
            })
            .await?;
        let result = rows
            .into_iter()
            .next()
            .map(RawRow::into_exact_match)
            .transpose()?;

        self.finish(operation, started, usize::from(result.is_some()), 0);
        Ok(result)
    }

    fn finish(&self, operation: &str, started: Instant, results_count: usize, query_length: usize) {
        let elapsed = started.elapsed();
        self.logger
            .log_performance_warning(operation, elapsed, self.config.performance_threshold);
        self.logger
            .log_search_success(operation, results_count, elapsed, query_length);
    }

    fn expected_dimension(&self) -> Option<VectorDimension> {
        self.config
            .embedding_dimension
            .or_else(|| self.store.dimension())
    }

    async fn embed_once(&self, text: &str, text_length: usize) -> SearchOutcome<Vec<f32>> {
        let call_timeout = self.config.call_timeout;
        let embedding = timeout(call_timeout, self.embedder.embed_query(text))
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Timeout(format!(
                    "no response within {}ms",
                    call_timeout.as_millis()
                )))
            })
            .map_err(|e| classify_provider_error(e, text_length))?;

        if embedding.is_empty() {
            return Err(classify_provider_error(ProviderError::EmptyVector, text_length));
        }
        if let Some(dimension) = self.expected_dimension() {
            dimension.validate_vector(&embedding)?;
        }
        Ok(embedding)
    }

    async fn store_call<F>(&self, call: F) -> SearchOutcome<Vec<RawRow>>
    where
        F: Future<Output = Result<Vec<RawRow>, StoreError>>,
    {
        let call_timeout = self.config.call_timeout;
        timeout(call_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(StoreError::Timeout(format!(
                    "no response within {}ms",
                    call_timeout.as_millis()
                )))
            })
            .map_err(|e| classify_store_error(e, &self.config.table_name))
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut step: F) -> SearchOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SearchOutcome<T>>,
    {
        match &self.config.retry {
            Some(policy) => retry_with_backoff(policy, operation, &self.logger, step).await,
            None => step().await,
        }
    }
}
