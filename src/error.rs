//! Error types for patchbay.
//!
//! Uses thiserror for derive macros. Only graph errors and input loading
//! failures abort a run; the other variants are converted into task outcomes
//! at the worker boundary or defer a single merge.

use crate::exit_codes;
use std::time::Duration;
use thiserror::Error;

/// Main error type for patchbay operations.
#[derive(Error, Debug)]
pub enum PatchbayError {
    /// User provided invalid arguments or an input file is unreadable/invalid.
    #[error("{0}")]
    UserError(String),

    /// The task graph is structurally invalid.
    #[error("Task graph error: {0}")]
    GraphError(String),

    /// A unified diff did not apply cleanly.
    #[error("Patch failed: {0}")]
    PatchError(String),

    /// The merge lock was still held when the timeout elapsed.
    #[error("Timed out after {}s waiting for lock '{name}'", timeout.as_secs_f64())]
    LockTimeout { name: String, timeout: Duration },

    /// A lock file could not be created, read or removed.
    #[error("Lock operation failed: {0}")]
    LockError(String),

    /// The generator or test gate could not be executed.
    #[error("Execution failed: {0}")]
    ExecutionError(String),
}

impl PatchbayError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            PatchbayError::UserError(_) => exit_codes::USER_ERROR,
            PatchbayError::GraphError(_) => exit_codes::GRAPH_FAILURE,
            PatchbayError::PatchError(_) => exit_codes::PATCH_FAILURE,
            PatchbayError::LockTimeout { .. } => exit_codes::LOCK_FAILURE,
            PatchbayError::LockError(_) => exit_codes::LOCK_FAILURE,
            PatchbayError::ExecutionError(_) => exit_codes::EXECUTION_FAILURE,
        }
    }
}

/// Result type alias for patchbay operations.
pub type Result<T> = std::result::Result<T, PatchbayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_has_correct_exit_code() {
        let err = PatchbayError::GraphError("cycle".to_string());
        assert_eq!(err.exit_code(), exit_codes::GRAPH_FAILURE);
    }

    #[test]
    fn lock_errors_share_exit_code() {
        let timeout = PatchbayError::LockTimeout {
            name: "merge".to_string(),
            timeout: Duration::from_secs(3),
        };
        let failed = PatchbayError::LockError("permission denied".to_string());
        assert_eq!(timeout.exit_code(), exit_codes::LOCK_FAILURE);
        assert_eq!(failed.exit_code(), exit_codes::LOCK_FAILURE);
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = PatchbayError::LockTimeout {
            name: "merge".to_string(),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 1.5s waiting for lock 'merge'"
        );

        let err = PatchbayError::GraphError("task b depends on missing task z".to_string());
        assert_eq!(
            err.to_string(),
            "Task graph error: task b depends on missing task z"
        );
    }
}
