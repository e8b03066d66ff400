//! Search request model.
//!
//! A [`SearchQuery`] can only exist in a validated state: construction
//! runs every check and fails before anything reaches a collaborator.

use serde::Serialize;

use crate::error::{ErrorContext, SearchError, SearchOutcome, Severity};
use crate::search::filter::{Filters, MAX_FILTER_DEPTH, filter_depth};
use crate::search::security::{BASE_DENYLIST, DenyList};

/// Maximum query length in characters.
pub const MAX_QUERY_CHARS: usize = 1_000;

/// Lower-layer cap re-checked by the engine.
pub const HARD_MAX_QUERY_CHARS: usize = 10_000;

pub const MIN_LIMIT: usize = 1;
pub const MAX_LIMIT: usize = 100;
pub const DEFAULT_LIMIT: usize = 5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// A validated, immutable search request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    text: String,
    limit: usize,
    similarity_threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<Filters>,
    include_metadata: bool,
}

impl SearchQuery {
    /// Query with default limit, threshold and metadata.
    pub fn new(text: impl Into<String>) -> SearchOutcome<Self> {
        Self::builder(text).build()
    }

    pub fn builder(text: impl Into<String>) -> SearchQueryBuilder {
        SearchQueryBuilder {
            text: text.into(),
            limit: DEFAULT_LIMIT,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            filters: None,
            include_metadata: true,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    pub fn filters(&self) -> Option<&Filters> {
        self.filters.as_ref()
    }

    pub fn include_metadata(&self) -> bool {
        self.include_metadata
    }

    /// Text length in characters, the unit every length check uses.
    pub fn text_length(&self) -> usize {
        self.text.chars().count()
    }

    /// Cosine distance equivalent of the similarity threshold.
    pub fn max_distance(&self) -> f64 {
        1.0 - self.similarity_threshold
    }

    /// Run every check against the base denylist.
    pub fn validate(&self) -> SearchOutcome<()> {
        validate_fields(
            &self.text,
            self.limit,
            self.similarity_threshold,
            self.filters.as_ref(),
            MAX_QUERY_CHARS,
            &BASE_DENYLIST,
        )
    }
}

/// Builder for [`SearchQuery`]; `build` validates.
#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    text: String,
    limit: usize,
    similarity_threshold: f64,
    filters: Option<Filters>,
    include_metadata: bool,
}

impl SearchQueryBuilder {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn include_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    pub fn build(self) -> SearchOutcome<SearchQuery> {
        let query = SearchQuery {
            text: self.text,
            limit: self.limit,
            similarity_threshold: self.similarity_threshold,
            filters: self.filters,
            include_metadata: self.include_metadata,
        };
        query.validate()?;
        Ok(query)
    }
}

/// Checks in fixed order: text, limit, threshold, filter depth, denylist.
pub(crate) fn validate_fields(
    text: &str,
    limit: usize,
    threshold: f64,
    filters: Option<&Filters>,
    max_chars: usize,
    denylist: &DenyList,
) -> SearchOutcome<()> {
    if text.trim().is_empty() {
        return Err(SearchError::validation(
            "query text must not be empty",
            ErrorContext::new().with("field", "text"),
        ));
    }

    let text_length = text.chars().count();
    if text_length > max_chars {
        return Err(SearchError::QueryValidation {
            message: format!("query text exceeds {max_chars} characters"),
            severity: Severity::Medium,
            context: ErrorContext::new()
                .with("field", "text")
                .with("text_length", text_length)
                .with("max_length", max_chars),
        });
    }

    validate_limit(limit)?;

    if !(0.0..=1.0).contains(&threshold) {
        return Err(SearchError::validation(
            "similarity_threshold must be within [0.0, 1.0]",
            ErrorContext::new()
                .with("field", "similarity_threshold")
                .with("value", threshold),
        ));
    }

    if let Some(filters) = filters {
        validate_filter_depth(filters)?;
    }

    if let Some(class) = denylist.scan(text) {
        return Err(SearchError::security(
            "dangerous content detected in query",
            ErrorContext::new()
                .with("pattern_class", class)
                .with("text_length", text_length),
        ));
    }

    Ok(())
}

pub(crate) fn validate_limit(limit: usize) -> SearchOutcome<()> {
    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(SearchError::validation(
            format!("limit must be between {MIN_LIMIT} and {MAX_LIMIT}"),
            ErrorContext::new().with("field", "limit").with("value", limit),
        ));
    }
    Ok(())
}

pub(crate) fn validate_filter_depth(filters: &Filters) -> SearchOutcome<()> {
    let depth = filter_depth(filters);
    if depth > MAX_FILTER_DEPTH {
        return Err(SearchError::validation(
            format!("filters nest deeper than {MAX_FILTER_DEPTH} levels"),
            ErrorContext::new()
                .with("field", "filters")
                .with("depth", depth)
                .with("max_depth", MAX_FILTER_DEPTH),
        ));
    }
    Ok(())
}
