//! Error types for the arbor lineage store.

use crate::types::{ExperimentId, StepIndex};
use thiserror::Error;

/// Blob-store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob store unavailable: {0}")]
    Unavailable(String),

    #[error("Revision mismatch for blob {key}")]
    RevisionMismatch { key: String },

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors returned to callers of the repository, orchestrator and API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Lineage store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Lineage document is corrupt: {0}")]
    CorruptDocument(String),

    #[error("Experiment not found: {0}")]
    NotFound(ExperimentId),

    #[error(
        "Invalid parent index {parent_index} for experiment {experiment_id} ({step_count} steps)"
    )]
    InvalidParent {
        experiment_id: ExperimentId,
        parent_index: StepIndex,
        step_count: usize,
    },

    #[error("Experiment has no steps: {0}")]
    EmptyExperiment(ExperimentId),

    #[error("Concurrent write conflict persisted after {attempts} attempts; retry the operation")]
    Conflict { attempts: usize },

    #[error("Image generation rejected: {0}")]
    GenerationRejected(String),

    #[error("Image storage failed: {0}")]
    StorageFailure(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ApiError {
    /// True when retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Conflict { .. } | ApiError::StoreUnavailable(_))
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
