//! Shared mock collaborators and log capture for pipeline tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use ragsearch::search::embedding::{EmbeddingProvider, ProviderError};
use ragsearch::search::result::RawRow;
use ragsearch::search::store::{HybridRequest, SimilarityRequest, StoreError, VectorStore};
use ragsearch::search::{FilterCondition, RetryPolicy, SearchConfig, SearchEngine};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::Level;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Embedder that replays queued failures, then returns a fixed vector.
pub struct MockEmbedder {
    vector: Vec<f32>,
    failures: Mutex<VecDeque<ProviderError>>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(self, failures: impl IntoIterator<Item = ProviderError>) -> Self {
        self.failures.lock().extend(failures);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failures.lock().pop_front() {
            return Err(failure);
        }
        Ok(self.vector.clone())
    }
}

/// Store returning canned rows, with optional failures and latency.
pub struct MockStore {
    rows: Vec<RawRow>,
    failures: Mutex<VecDeque<StoreError>>,
    always_fail: Option<StoreError>,
    delay: Duration,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
    last_similarity: Mutex<Option<SimilarityRequest>>,
    last_hybrid: Mutex<Option<HybridRequest>>,
}

impl MockStore {
    pub fn new(rows: Vec<RawRow>) -> Self {
        Self {
            rows,
            failures: Mutex::new(VecDeque::new()),
            always_fail: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            last_similarity: Mutex::new(None),
            last_hybrid: Mutex::new(None),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn failing_first(self, failures: impl IntoIterator<Item = StoreError>) -> Self {
        self.failures.lock().extend(failures);
        self
    }

    pub fn always_failing(mut self, error: StoreError) -> Self {
        self.always_fail = Some(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().clone()
    }

    pub fn last_similarity(&self) -> Option<SimilarityRequest> {
        self.last_similarity.lock().clone()
    }

    pub fn last_hybrid(&self) -> Option<HybridRequest> {
        self.last_hybrid.lock().clone()
    }

    async fn respond(&self) -> Result<Vec<RawRow>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().push(Instant::now());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.always_fail {
            return Err(error.clone());
        }
        if let Some(failure) = self.failures.lock().pop_front() {
            return Err(failure);
        }
        Ok(self.rows.clone())
    }
}

#[async_trait]
impl VectorStore for MockStore {
    async fn similarity_search(&self, request: &SimilarityRequest) -> Result<Vec<RawRow>, StoreError> {
        *self.last_similarity.lock() = Some(request.clone());
        self.respond().await
    }

    async fn hybrid_search(&self, request: &HybridRequest) -> Result<Vec<RawRow>, StoreError> {
        *self.last_hybrid.lock() = Some(request.clone());
        self.respond().await
    }

    async fn query_table(
        &self,
        _conditions: &[FilterCondition],
        limit: usize,
    ) -> Result<Vec<RawRow>, StoreError> {
        let mut rows = self.respond().await?;
        rows.truncate(limit);
        Ok(rows)
    }

    async fn query_by_id(&self, chunk_id: &str) -> Result<Vec<RawRow>, StoreError> {
        let rows = self.respond().await?;
        Ok(rows
            .into_iter()
            .filter(|row| row.id.as_deref() == Some(chunk_id))
            .collect())
    }
}

/// A well-formed row at the given distance.
pub fn row(id: &str, distance: f64) -> RawRow {
    RawRow {
        id: Some(id.to_string()),
        content: Some(format!("content of {id}")),
        filename: Some("handbook.pdf".to_string()),
        page_number: Some(12),
        distance: Some(distance),
        section_name: Some("Retrieval".to_string()),
        chapter_number: Some(3),
        start_pos: Some(100),
        end_pos: Some(420),
        token_count: Some(64),
    }
}

/// Config with fast, deterministic retries.
pub fn fast_retry_config(max_retries: u32) -> SearchConfig {
    SearchConfig {
        retry: Some(RetryPolicy::new(
            max_retries,
            Duration::from_millis(100),
            Duration::from_secs(2),
        )),
        ..SearchConfig::default()
    }
}

pub fn engine(
    embedder: &Arc<MockEmbedder>,
    store: &Arc<MockStore>,
    config: SearchConfig,
) -> SearchEngine {
    SearchEngine::new(embedder.clone(), store.clone(), config).unwrap()
}

/// Records the `event` field, level and field names of every log record.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Recorded>>>,
}

struct Recorded {
    name: String,
    level: Level,
    fields: Vec<&'static str>,
}

impl EventLog {
    /// Capture events on the current thread until the guard drops.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let log = Self::default();
        let subscriber = tracing_subscriber::registry().with(log.clone());
        (log, tracing::subscriber::set_default(subscriber))
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name == event).count()
    }

    /// Number of records at `level`, whatever their event.
    pub fn count_level(&self, level: Level) -> usize {
        self.events.lock().iter().filter(|e| e.level == level).count()
    }

    /// Whether any `event` record carried `field`.
    pub fn has_field(&self, event: &str, field: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| e.name == event && e.fields.contains(&field))
    }
}

#[derive(Default)]
struct EventFields {
    name: Option<String>,
    fields: Vec<&'static str>,
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.push(field.name());
        if field.name() == "event" {
            self.name = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields.push(field.name());
        if field.name() == "event" && self.name.is_none() {
            self.name = Some(format!("{value:?}").trim_matches('"').to_string());
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventFields::default();
        event.record(&mut visitor);
        if let Some(name) = visitor.name {
            self.events.lock().push(Recorded {
                name,
                level: *event.metadata().level(),
                fields: visitor.fields,
            });
        }
    }
}
