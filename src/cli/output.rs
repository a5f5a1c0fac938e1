//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    if e.is_retryable() {
        format!("{} (retryable)", e)
    } else {
        e.to_string()
    }
}

/// Process exit code per error category.
pub fn exit_code(e: &ApiError) -> i32 {
    match e {
        ApiError::NotFound(_)
        | ApiError::InvalidParent { .. }
        | ApiError::EmptyExperiment(_)
        | ApiError::InvalidRequest(_) => 2,
        ApiError::Conflict { .. } | ApiError::StoreUnavailable(_) => 3,
        ApiError::GenerationRejected(_) | ApiError::StorageFailure(_) => 4,
        ApiError::CorruptDocument(_) => 5,
        ApiError::ConfigError(_) => 78,
    }
}
