//! Error types for the vector search pipeline
//!
//! Every failure the search read-path can produce is mapped into
//! [`SearchError`]. Each variant carries a stable machine code, a severity
//! and a diagnostic context map so callers and the structured logger can
//! handle failures without parsing messages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Ordered severity of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic key/value pairs attached to an error.
///
/// Keys are ordered so log output is stable. Values are plain strings;
/// callers must never put secrets or raw user input in here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorContext(BTreeMap<String, String>);

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// Machine codes for the generic [`SearchError::VectorSearch`] kind.
pub mod codes {
    pub const VECTOR_SEARCH_ERROR: &str = "VECTOR_SEARCH_ERROR";
    pub const INITIALIZATION_ERROR: &str = "INITIALIZATION_ERROR";
    pub const SEARCH_CANCELLED: &str = "SEARCH_CANCELLED";
}

/// Main error type for search operations
#[derive(Error, Debug, Clone)]
pub enum SearchError {
    /// Malformed request shape (length or range violation)
    #[error("Query validation failed: {message}")]
    QueryValidation {
        message: String,
        severity: Severity,
        context: ErrorContext,
    },

    /// Denylisted or dangerous input detected
    #[error("Security violation: {message}")]
    Security {
        message: String,
        context: ErrorContext,
    },

    /// Embedding provider failed or returned unusable data
    #[error("Embedding generation failed: {message}")]
    Embedding {
        message: String,
        retryable: bool,
        context: ErrorContext,
    },

    /// Vector store call failed (network, auth, query)
    #[error("Database connection error: {message}")]
    DatabaseConnection {
        message: String,
        context: ErrorContext,
    },

    /// Hard performance failure. Latency overruns currently only warn.
    #[error("Performance requirement violated: {message}")]
    Performance {
        message: String,
        context: ErrorContext,
    },

    /// Catch-all for unclassified pipeline failures
    #[error("Vector search failed: {message}")]
    VectorSearch {
        code: &'static str,
        message: String,
        severity: Severity,
        context: ErrorContext,
    },
}

impl SearchError {
    pub fn validation(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::QueryValidation {
            message: message.into(),
            severity: Severity::Low,
            context,
        }
    }

    pub fn security(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Security {
            message: message.into(),
            context,
        }
    }

    /// Retryable embedding failure (rate limit, connectivity).
    pub fn embedding(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Embedding {
            message: message.into(),
            retryable: true,
            context,
        }
    }

    /// Embedding failure that retrying cannot fix.
    pub fn embedding_fatal(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Embedding {
            message: message.into(),
            retryable: false,
            context,
        }
    }

    pub fn database(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::DatabaseConnection {
            message: message.into(),
            context,
        }
    }

    pub fn generic(
        code: &'static str,
        message: impl Into<String>,
        severity: Severity,
        context: ErrorContext,
    ) -> Self {
        Self::VectorSearch {
            code,
            message: message.into(),
            severity,
            context,
        }
    }

    /// Get a stable machine code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::QueryValidation { .. } => "QUERY_VALIDATION_ERROR",
            Self::Security { .. } => "SECURITY_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::DatabaseConnection { .. } => "DB_CONNECTION_ERROR",
            Self::Performance { .. } => "PERFORMANCE_ERROR",
            Self::VectorSearch { code, .. } => *code,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::QueryValidation { severity, .. } | Self::VectorSearch { severity, .. } => {
                *severity
            }
            Self::Security { .. } => Severity::Critical,
            Self::Embedding { .. } | Self::Performance { .. } => Severity::Medium,
            Self::DatabaseConnection { .. } => Severity::High,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::QueryValidation { context, .. }
            | Self::Security { context, .. }
            | Self::Embedding { context, .. }
            | Self::DatabaseConnection { context, .. }
            | Self::Performance { context, .. }
            | Self::VectorSearch { context, .. } => context,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::QueryValidation { message, .. }
            | Self::Security { message, .. }
            | Self::Embedding { message, .. }
            | Self::DatabaseConnection { message, .. }
            | Self::Performance { message, .. }
            | Self::VectorSearch { message, .. } => message,
        }
    }

    /// Whether a retry policy may re-run the failed step.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Embedding { retryable, .. } => *retryable,
            Self::DatabaseConnection { .. } => true,
            Self::QueryValidation { .. }
            | Self::Security { .. }
            | Self::Performance { .. }
            | Self::VectorSearch { .. } => false,
        }
    }

    /// Returns a copy with an extra context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        match &mut self {
            Self::QueryValidation { context, .. }
            | Self::Security { context, .. }
            | Self::Embedding { context, .. }
            | Self::DatabaseConnection { context, .. }
            | Self::Performance { context, .. }
            | Self::VectorSearch { context, .. } => context.insert(key, value),
        }
        self
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::QueryValidation { .. } => vec![
                "Shorten the query text or adjust limit/threshold to the allowed range",
            ],
            Self::Security { .. } => vec!["Rephrase the query without code or markup fragments"],
            Self::Embedding {
                retryable: true, ..
            } => vec![
                "Wait a moment and try again, the embedding API may be rate limited",
                "Check network connectivity to the embedding provider",
            ],
            Self::Embedding { .. } => vec![
                "Verify the embedding model matches the dimension of the stored vectors",
            ],
            Self::DatabaseConnection { .. } => vec![
                "Check that the vector store is reachable and credentials are valid",
                "Try the operation again, it may succeed on retry",
            ],
            Self::VectorSearch {
                code: codes::INITIALIZATION_ERROR,
                ..
            } => vec!["Review the [search] and [retry] sections of settings.toml"],
            _ => vec![],
        }
    }
}

/// Result type alias for search operations
pub type SearchOutcome<T> = Result<T, SearchError>;
