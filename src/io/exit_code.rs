//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - operation completed (an empty result list is still success)
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - high or critical severity, automation should halt
//! - `3`: Not found - id lookup returned nothing
//! - `6`: Configuration error
//! - `126-255`: Reserved by shell

use crate::error::{SearchError, Severity, codes};

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// High or critical failure that should halt automation (code 2)
    BlockingError = 2,

    /// Chunk not found but command executed successfully (code 3)
    NotFound = 3,

    /// Configuration error (code 6)
    ConfigError = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Convert a `SearchError` to the appropriate exit code.
    ///
    /// Initialization failures are configuration errors; otherwise severity
    /// decides whether the failure is blocking.
    pub fn from_error(error: &SearchError) -> Self {
        if error.error_code() == codes::INITIALIZATION_ERROR {
            return ExitCode::ConfigError;
        }

        match error.severity() {
            Severity::High | Severity::Critical => ExitCode::BlockingError,
            Severity::Low | Severity::Medium => ExitCode::GeneralError,
        }
    }
}
