//! Structured lifecycle events for the search pipeline.
//!
//! Every event is emitted through `tracing` under the [`LOG_TARGET`]
//! target with an `event` field naming the milestone, so a JSON
//! subscriber yields one machine-parsable record per event. Query text is
//! never logged, only its length.

use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{SearchError, Severity};

/// Target shared by all search events.
pub const LOG_TARGET: &str = "ragsearch::search";

/// Values of the `event` field.
pub mod events {
    pub const SEARCH_START: &str = "search_start";
    pub const SEARCH_SUCCESS: &str = "search_success";
    pub const SEARCH_ERROR: &str = "search_error";
    pub const PERFORMANCE_WARNING: &str = "performance_warning";
    pub const RETRY_ATTEMPT: &str = "retry_attempt";
    pub const RETRY_EXHAUSTED: &str = "retry_exhausted";
    pub const RESULT_SKIPPED: &str = "result_skipped";
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Emits search lifecycle events for one component.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn log_search_start(&self, operation: &str, query_length: usize, limit: usize, threshold: f64) {
        info!(
            target: LOG_TARGET,
            event = events::SEARCH_START,
            component = %self.component,
            operation,
            query_length,
            limit,
            threshold,
            "vector search started"
        );
    }

    pub fn log_search_success(
        &self,
        operation: &str,
        results_count: usize,
        elapsed: Duration,
        query_length: usize,
    ) {
        info!(
            target: LOG_TARGET,
            event = events::SEARCH_SUCCESS,
            component = %self.component,
            operation,
            results_count,
            response_time_ms = millis(elapsed),
            query_length,
            "vector search completed with {results_count} results"
        );
    }

    /// Log an error once, at the level implied by its severity.
    pub fn log_error(&self, error: &SearchError, operation: &str) {
        let error_code = error.error_code();
        let severity = error.severity().as_str();
        let context = error.context().to_string();

        match error.severity() {
            Severity::Low => info!(
                target: LOG_TARGET,
                event = events::SEARCH_ERROR,
                component = %self.component,
                operation,
                error_code,
                severity,
                error_context = %context,
                "{error}"
            ),
            Severity::Medium => warn!(
                target: LOG_TARGET,
                event = events::SEARCH_ERROR,
                component = %self.component,
                operation,
                error_code,
                severity,
                error_context = %context,
                "{error}"
            ),
            Severity::High | Severity::Critical => error!(
                target: LOG_TARGET,
                event = events::SEARCH_ERROR,
                component = %self.component,
                operation,
                error_code,
                severity,
                error_context = %context,
                "{error}"
            ),
        }
    }

    /// Warn when `elapsed` exceeds `threshold`. Returns whether it did.
    pub fn log_performance_warning(
        &self,
        operation: &str,
        elapsed: Duration,
        threshold: Duration,
    ) -> bool {
        if elapsed <= threshold {
            return false;
        }

        let response_time_ms = millis(elapsed);
        let threshold_ms = millis(threshold);
        warn!(
            target: LOG_TARGET,
            event = events::PERFORMANCE_WARNING,
            component = %self.component,
            operation,
            response_time_ms,
            threshold_ms,
            "{operation} took {response_time_ms:.2}ms (threshold {threshold_ms}ms)"
        );
        true
    }

    pub fn log_retry(
        &self,
        operation: &str,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: &dyn std::fmt::Display,
    ) {
        warn!(
            target: LOG_TARGET,
            event = events::RETRY_ATTEMPT,
            component = %self.component,
            operation,
            attempt,
            max_attempts,
            delay_ms = millis(delay),
            error = %error,
            "retrying {operation} (attempt {attempt}/{max_attempts})"
        );
    }

    /// The failure itself is reported once by [`log_error`](Self::log_error).
    pub fn log_retry_exhausted(&self, operation: &str, attempts: u32) {
        warn!(
            target: LOG_TARGET,
            event = events::RETRY_EXHAUSTED,
            component = %self.component,
            operation,
            attempts,
            "giving up on {operation} after {attempts} attempts"
        );
    }

    pub fn log_result_skipped(&self, chunk_id: &str, error: &SearchError) {
        warn!(
            target: LOG_TARGET,
            event = events::RESULT_SKIPPED,
            component = %self.component,
            chunk_id,
            error_code = error.error_code(),
            "skipping row that failed conversion: {error}"
        );
    }
}
