//! Search result model and row decoding.
//!
//! Stores return loosely shaped rows. [`RawRow`] decodes them once at the
//! boundary with every field optional, and the documented defaults are
//! applied in one place when a row becomes a [`SearchResult`].

use serde::{Deserialize, Serialize};

use crate::error::{ErrorContext, SearchError, SearchOutcome, Severity, codes};
use crate::search::logger::StructuredLogger;

/// Distance assumed for a row that does not report one. Maximal distance
/// keeps a malformed row from looking relevant.
pub const DEFAULT_DISTANCE: f64 = 1.0;

/// Convert a cosine distance into a similarity score.
pub fn similarity_from_distance(distance: f64) -> f64 {
    1.0 - distance
}

/// Auxiliary attributes of a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_pos: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_pos: Option<i64>,
    pub token_count: u32,
}

/// One ranked chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    chunk_id: String,
    content: String,
    filename: String,
    page_number: u32,
    similarity_score: f64,
    /// `None` when metadata was not requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<ChunkMetadata>,
}

impl SearchResult {
    /// Create a result, range-checking score and page number.
    pub fn new(
        chunk_id: impl Into<String>,
        content: impl Into<String>,
        filename: impl Into<String>,
        page_number: i64,
        similarity_score: f64,
        metadata: Option<ChunkMetadata>,
    ) -> SearchOutcome<Self> {
        if similarity_score.is_nan() || !(0.0..=1.0).contains(&similarity_score) {
            return Err(SearchError::generic(
                codes::VECTOR_SEARCH_ERROR,
                "similarity_score must be within [0.0, 1.0]",
                Severity::Medium,
                ErrorContext::new().with("similarity_score", similarity_score),
            ));
        }

        let page_number = u32::try_from(page_number)
            .ok()
            .filter(|page| *page > 0)
            .ok_or_else(|| {
                SearchError::generic(
                    codes::VECTOR_SEARCH_ERROR,
                    "page_number must be a positive integer",
                    Severity::Medium,
                    ErrorContext::new().with("page_number", page_number),
                )
            })?;

        Ok(Self {
            chunk_id: chunk_id.into(),
            content: content.into(),
            filename: filename.into(),
            page_number,
            similarity_score,
            metadata,
        })
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn similarity_score(&self) -> f64 {
        self.similarity_score
    }

    pub fn metadata(&self) -> Option<&ChunkMetadata> {
        self.metadata.as_ref()
    }
}

/// A store row as received, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub page_number: Option<i64>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub section_name: Option<String>,
    #[serde(default)]
    pub chapter_number: Option<i64>,
    #[serde(default)]
    pub start_pos: Option<i64>,
    #[serde(default)]
    pub end_pos: Option<i64>,
    #[serde(default)]
    pub token_count: Option<u32>,
}

impl RawRow {
    fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            section_name: self.section_name.clone(),
            chapter_number: self.chapter_number,
            start_pos: self.start_pos,
            end_pos: self.end_pos,
            token_count: self.token_count.unwrap_or(0),
        }
    }

    fn build(self, score: f64, include_metadata: bool) -> SearchOutcome<SearchResult> {
        let metadata = include_metadata.then(|| self.metadata());
        SearchResult::new(
            self.id.unwrap_or_default(),
            self.content.unwrap_or_default(),
            self.filename.unwrap_or_default(),
            self.page_number.unwrap_or(1),
            score,
            metadata,
        )
    }

    /// Convert a ranked row, scoring it as `1 - distance`.
    pub fn into_result(self, include_metadata: bool) -> SearchOutcome<SearchResult> {
        let score = similarity_from_distance(self.distance.unwrap_or(DEFAULT_DISTANCE));
        self.build(score, include_metadata)
    }

    /// Convert an id-lookup row. An exact match scores 1.0.
    pub fn into_exact_match(self) -> SearchOutcome<SearchResult> {
        self.build(1.0, true)
    }
}

/// Convert store rows into results, skipping rows that fail validation.
pub fn to_results(
    rows: Vec<RawRow>,
    include_metadata: bool,
    logger: &StructuredLogger,
) -> Vec<SearchResult> {
    rows.into_iter()
        .filter_map(|row| {
            let chunk_id = row.id.clone().unwrap_or_default();
            row.into_result(include_metadata)
                .inspect_err(|e| logger.log_result_skipped(&chunk_id, e))
                .ok()
        })
        .collect()
}
