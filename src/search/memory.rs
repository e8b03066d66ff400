//! In-process vector store.
//!
//! Holds chunks and their embeddings behind a `RwLock` and answers every
//! [`VectorStore`] request with exact cosine distance. Suitable for demos,
//! small corpora and deterministic tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::search::embedding::{ProviderError, VectorDimension};
use crate::search::filter::FilterCondition;
use crate::search::result::RawRow;
use crate::search::store::{HybridRequest, SimilarityRequest, StoreError, VectorStore};

/// Weight of vector similarity in the hybrid rank; the rest is lexical.
pub const HYBRID_VECTOR_WEIGHT: f64 = 0.7;

/// A chunk as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default = "default_page")]
    pub page_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_pos: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_pos: Option<i64>,
    #[serde(default)]
    pub token_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

fn default_page() -> i64 {
    1
}

impl StoredChunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            filename: String::new(),
            page_number: 1,
            section_name: None,
            chapter_number: None,
            start_pos: None,
            end_pos: None,
            token_count: 0,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Column value used by filter conditions.
    pub fn attribute(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::from(self.id.as_str())),
            "content" => Some(Value::from(self.content.as_str())),
            "filename" => Some(Value::from(self.filename.as_str())),
            "page_number" => Some(Value::from(self.page_number)),
            "section_name" => self.section_name.as_deref().map(Value::from),
            "chapter_number" => self.chapter_number.map(Value::from),
            "start_pos" => self.start_pos.map(Value::from),
            "end_pos" => self.end_pos.map(Value::from),
            "token_count" => Some(Value::from(self.token_count)),
            _ => None,
        }
    }

    fn matches_all(&self, conditions: &[FilterCondition]) -> bool {
        conditions
            .iter()
            .all(|condition| condition.matches(self.attribute(&condition.column).as_ref()))
    }

    fn to_row(&self, distance: Option<f64>) -> RawRow {
        RawRow {
            id: Some(self.id.clone()),
            content: Some(self.content.clone()),
            filename: Some(self.filename.clone()),
            page_number: Some(self.page_number),
            distance,
            section_name: self.section_name.clone(),
            chapter_number: self.chapter_number,
            start_pos: self.start_pos,
            end_pos: self.end_pos,
            token_count: Some(self.token_count),
        }
    }
}

/// Cosine similarity of two equal-length vectors; 0.0 for a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Fraction of distinct query terms that occur in `content`.
fn lexical_overlap(query: &str, content: &str) -> f64 {
    let terms = |text: &str| -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    };

    let mut query_terms = terms(query);
    query_terms.sort();
    query_terms.dedup();
    if query_terms.is_empty() {
        return 0.0;
    }

    let content_terms = terms(content);
    let hits = query_terms
        .iter()
        .filter(|term| content_terms.contains(term))
        .count();
    hits as f64 / query_terms.len() as f64
}

#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    chunks: RwLock<Vec<StoredChunk>>,
    /// Fixed up front, or adopted from the first embedding added.
    dimension: RwLock<Option<VectorDimension>>,
}

/// Adopt `embedding`'s dimension if none is fixed yet, otherwise require a match.
fn admit_embedding(
    dimension: &mut Option<VectorDimension>,
    chunk_id: &str,
    embedding: &[f32],
) -> Result<(), (usize, usize)> {
    match *dimension {
        Some(dim) if dim.get() == embedding.len() => Ok(()),
        Some(dim) => Err((dim.get(), embedding.len())),
        None => {
            let dim = VectorDimension::new(embedding.len()).ok_or((0, 0))?;
            tracing::debug!(chunk_id, dimension = dim.get(), "store dimension fixed");
            *dimension = Some(dim);
            Ok(())
        }
    }
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects embeddings of any other dimension.
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            dimension: RwLock::new(Some(dimension)),
        }
    }

    /// Load chunks from a JSON array file.
    ///
    /// The store takes its dimension from the first precomputed embedding;
    /// a file mixing dimensions is rejected.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Other(format!("failed to read chunk file '{}': {e}", path.display()))
        })?;
        let chunks: Vec<StoredChunk> = serde_json::from_str(&data).map_err(|e| {
            StoreError::Other(format!("invalid chunk file '{}': {e}", path.display()))
        })?;

        let store = Self::new();
        store.extend(chunks).map_err(|e| {
            StoreError::Other(format!("invalid chunk file '{}': {e}", path.display()))
        })?;
        Ok(store)
    }

    /// Add chunks. Nothing is added if any embedding has the wrong dimension.
    pub fn extend(&self, chunks: impl IntoIterator<Item = StoredChunk>) -> Result<(), StoreError> {
        let chunks: Vec<StoredChunk> = chunks.into_iter().collect();
        let mut stored = self.chunks.write();
        let mut dimension = self.dimension.write();

        let mut candidate = *dimension;
        for chunk in &chunks {
            if let Some(embedding) = chunk.embedding.as_deref() {
                if embedding.is_empty() {
                    return Err(StoreError::Other(format!(
                        "chunk '{}' has an empty embedding",
                        chunk.id
                    )));
                }
                admit_embedding(&mut candidate, &chunk.id, embedding).map_err(
                    |(expected, actual)| {
                        StoreError::Other(format!(
                            "chunk '{}' has a {actual}-dimension embedding, store expects {expected}",
                            chunk.id
                        ))
                    },
                )?;
            }
        }

        *dimension = candidate;
        stored.extend(chunks);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Fill in embeddings for chunks that lack one.
    ///
    /// Returns the number of chunks embedded. Vectors that disagree with the
    /// store dimension fail the whole batch.
    pub fn embed_missing<F>(&self, embed: F) -> Result<usize, ProviderError>
    where
        F: FnOnce(Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError>,
    {
        let mut chunks = self.chunks.write();
        let pending: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let texts = pending.iter().map(|&i| chunks[i].content.clone()).collect();
        let embeddings = embed(texts)?;
        if embeddings.len() != pending.len() {
            return Err(ProviderError::Other(format!(
                "expected {} embeddings, got {}",
                pending.len(),
                embeddings.len()
            )));
        }

        let mut dimension = self.dimension.write();
        let mut candidate = *dimension;
        for (&index, embedding) in pending.iter().zip(&embeddings) {
            if embedding.is_empty() {
                return Err(ProviderError::EmptyVector);
            }
            admit_embedding(&mut candidate, &chunks[index].id, embedding).map_err(
                |(expected, actual)| ProviderError::DimensionMismatch { expected, actual },
            )?;
        }

        *dimension = candidate;
        for (index, embedding) in pending.iter().zip(embeddings) {
            chunks[*index].embedding = Some(embedding);
        }
        Ok(pending.len())
    }

    fn check_query_dimension(&self, embedding: &[f32]) -> Result<(), StoreError> {
        match *self.dimension.read() {
            Some(dim) if dim.get() != embedding.len() => Err(StoreError::Other(format!(
                "query embedding has {} dimensions, store expects {}",
                embedding.len(),
                dim.get()
            ))),
            _ => Ok(()),
        }
    }

    /// Candidates as (chunk index, cosine similarity).
    fn similarities(
        &self,
        chunks: &[StoredChunk],
        query: &[f32],
    ) -> Result<Vec<(usize, f64)>, StoreError> {
        let mut scored = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let Some(embedding) = chunk.embedding.as_deref() else {
                continue;
            };
            if embedding.len() != query.len() {
                return Err(StoreError::Other(format!(
                    "chunk '{}' has {} dimensions, query has {}",
                    chunk.id,
                    embedding.len(),
                    query.len()
                )));
            }
            let similarity = f64::from(cosine_similarity(query, embedding)).clamp(-1.0, 1.0);
            scored.push((i, similarity));
        }
        Ok(scored)
    }
}

fn rank(mut scored: Vec<(usize, f64)>, limit: usize, chunks: &[StoredChunk]) -> Vec<RawRow> {
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    scored
        .into_iter()
        .take(limit)
        .map(|(i, distance)| chunks[i].to_row(Some(distance)))
        .collect()
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn dimension(&self) -> Option<VectorDimension> {
        *self.dimension.read()
    }

    async fn similarity_search(&self, request: &SimilarityRequest) -> Result<Vec<RawRow>, StoreError> {
        self.check_query_dimension(&request.embedding)?;
        let chunks = self.chunks.read();

        let scored = self
            .similarities(&chunks, &request.embedding)?
            .into_iter()
            .map(|(i, similarity)| (i, 1.0 - similarity))
            .filter(|(i, distance)| {
                *distance <= request.max_distance && chunks[*i].matches_all(&request.filters)
            })
            .collect();

        Ok(rank(scored, request.limit, &chunks))
    }

    async fn hybrid_search(&self, request: &HybridRequest) -> Result<Vec<RawRow>, StoreError> {
        self.check_query_dimension(&request.embedding)?;
        let chunks = self.chunks.read();

        let scored = self
            .similarities(&chunks, &request.embedding)?
            .into_iter()
            .map(|(i, similarity)| {
                let lexical = lexical_overlap(&request.query_text, &chunks[i].content);
                let combined =
                    HYBRID_VECTOR_WEIGHT * similarity + (1.0 - HYBRID_VECTOR_WEIGHT) * lexical;
                (i, combined)
            })
            .filter(|(i, combined)| {
                *combined >= request.similarity_threshold
                    && chunks[*i].matches_all(&request.filters)
            })
            .map(|(i, combined)| (i, 1.0 - combined))
            .collect();

        Ok(rank(scored, request.limit, &chunks))
    }

    async fn query_table(
        &self,
        conditions: &[FilterCondition],
        limit: usize,
    ) -> Result<Vec<RawRow>, StoreError> {
        let chunks = self.chunks.read();
        Ok(chunks
            .iter()
            .filter(|chunk| chunk.matches_all(conditions))
            .take(limit)
            .map(|chunk| chunk.to_row(None))
            .collect())
    }

    async fn query_by_id(&self, chunk_id: &str) -> Result<Vec<RawRow>, StoreError> {
        let chunks = self.chunks.read();
        Ok(chunks
            .iter()
            .find(|chunk| chunk.id == chunk_id)
            .map(|chunk| chunk.to_row(None))
            .into_iter()
            .collect())
    }
}
