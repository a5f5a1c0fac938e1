//! Lineage Repository
//!
//! Sole owner of the persisted lineage document. Every mutation is a whole
//! document read-modify-write cycle, so two unsynchronized writers would lose
//! each other's updates. Two guards prevent that:
//!
//! - an in-process write lock serializes load → mutate → save among writers
//!   sharing this repository;
//! - every save is conditional on the blake3 revision of the bytes that were
//!   loaded, so a writer outside this process (or another repository over the
//!   same store) is detected; the cycle is re-run a bounded number of times and
//!   then surfaces [`ApiError::Conflict`].
//!
//! Reads never take the write lock.

use crate::blob::BlobStore;
use crate::error::{ApiError, StorageError};
use crate::experiment::{document, Experiment, ExperimentSummary, LineageLog, Step};
use crate::types::{ExperimentId, Revision, StepIndex};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Re-runs of a mutation after a revision conflict before giving up
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: usize,

    /// Timeout for each read or write of the lineage document (milliseconds)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

fn default_max_conflict_retries() -> usize {
    3
}

fn default_store_timeout_ms() -> u64 {
    10_000
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// A loaded log plus the revision it was loaded at.
struct Snapshot {
    log: LineageLog,
    revision: Option<Revision>,
}

pub struct LineageRepository {
    store: Arc<dyn BlobStore>,
    document_key: String,
    config: RepositoryConfig,
    write_lock: Mutex<()>,
}

impl LineageRepository {
    pub fn new(
        store: Arc<dyn BlobStore>,
        document_key: impl Into<String>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            store,
            document_key: document_key.into(),
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn document_key(&self) -> &str {
        &self.document_key
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Fetch the full log. A missing document is an empty log.
    pub async fn load(&self) -> Result<LineageLog, ApiError> {
        Ok(self.load_snapshot().await?.log)
    }

    /// Append a new experiment holding a single root step.
    pub async fn create_experiment(
        &self,
        name: &str,
        root_image_ref: &str,
    ) -> Result<Experiment, ApiError> {
        let created_at = Utc::now();
        let experiment = self
            .mutate("create_experiment", |log| {
                Ok(log.create_experiment(name, root_image_ref, created_at))
            })
            .await?;
        info!(
            experiment_id = %experiment.id,
            name = %experiment.name,
            "Experiment created"
        );
        Ok(experiment)
    }

    /// Append a step branching from `parent_index` of `experiment_id`.
    pub async fn append_step(
        &self,
        experiment_id: &ExperimentId,
        image_ref: &str,
        parent_index: StepIndex,
        prompt: Option<String>,
    ) -> Result<Step, ApiError> {
        let step = self
            .mutate("append_step", |log| {
                log.get_mut(experiment_id)?
                    .append_step(image_ref, parent_index, prompt.clone())
            })
            .await?;
        info!(
            experiment_id = %experiment_id,
            step_index = step.index,
            parent_index,
            "Step appended"
        );
        Ok(step)
    }

    pub async fn list_summaries(&self) -> Result<Vec<ExperimentSummary>, ApiError> {
        Ok(self.load().await?.summaries())
    }

    pub async fn get(&self, experiment_id: &ExperimentId) -> Result<Experiment, ApiError> {
        let log = self.load().await?;
        log.get(experiment_id).cloned()
    }

    /// Fetch the full log without enforcing lineage invariants, for
    /// integrity reporting. Shape and id uniqueness are still checked.
    pub async fn load_unchecked(&self) -> Result<LineageLog, ApiError> {
        match self.read_document().await? {
            None => Ok(LineageLog::new()),
            Some(bytes) => document::decode_unchecked(&bytes),
        }
    }

    async fn read_document(&self) -> Result<Option<Vec<u8>>, ApiError> {
        self.timed(self.store.get(&self.document_key))
            .await
            .map_err(|e| self.unavailable("read", e))
    }

    async fn load_snapshot(&self) -> Result<Snapshot, ApiError> {
        match self.read_document().await? {
            None => {
                debug!(key = %self.document_key, "No lineage document yet; starting empty");
                Ok(Snapshot {
                    log: LineageLog::new(),
                    revision: None,
                })
            }
            Some(bytes) => {
                let revision = Revision::of(&bytes);
                let log = document::decode(&bytes)?;
                Ok(Snapshot {
                    log,
                    revision: Some(revision),
                })
            }
        }
    }

    /// Run `apply` inside the single-writer section and persist the result.
    ///
    /// `apply` is re-run against a freshly loaded log after each revision
    /// conflict, so it must not have side effects outside the log.
    async fn mutate<T, F>(&self, operation: &'static str, mut apply: F) -> Result<T, ApiError>
    where
        F: FnMut(&mut LineageLog) -> Result<T, ApiError>,
    {
        let _guard = self.write_lock.lock().await;
        let attempts = self.config.max_conflict_retries + 1;

        for attempt in 1..=attempts {
            let Snapshot { mut log, revision } = self.load_snapshot().await?;
            let output = apply(&mut log)?;
            let bytes = document::encode(&log)?;

            match self
                .timed(
                    self.store
                        .put_if_revision(&self.document_key, &bytes, revision),
                )
                .await
            {
                Ok(new_revision) => {
                    debug!(
                        operation,
                        attempt,
                        revision = %new_revision.short(),
                        experiments = log.len(),
                        "Lineage document saved"
                    );
                    return Ok(output);
                }
                Err(StorageError::RevisionMismatch { .. }) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        "Lineage document changed concurrently; retrying"
                    );
                }
                Err(e) => {
                    if self.holds(&bytes).await {
                        warn!(
                            operation,
                            attempt,
                            error = %e,
                            "Write reported failure but the document holds it; treating as saved"
                        );
                        return Ok(output);
                    }
                    return Err(self.unavailable("write", e));
                }
            }
        }

        Err(ApiError::Conflict { attempts })
    }

    /// Whether the stored document is exactly `bytes`. Used after a failed
    /// write, which may still have committed before the error was reported.
    async fn holds(&self, bytes: &[u8]) -> bool {
        match self.timed(self.store.get(&self.document_key)).await {
            Ok(Some(current)) => Revision::of(&current) == Revision::of(bytes),
            _ => false,
        }
    }

    /// Bound a store call by `store_timeout_ms`.
    ///
    /// A timeout only abandons the wait. Work the backend already handed off
    /// (such as the filesystem rename running on the blocking pool) may still
    /// complete, so a timed-out write can have committed; `mutate` rereads
    /// the document before reporting it as failed.
    async fn timed<T, Fut>(&self, fut: Fut) -> Result<T, StorageError>
    where
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let limit = Duration::from_millis(self.config.store_timeout_ms);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Unavailable(format!(
                "timed out after {} ms",
                self.config.store_timeout_ms
            ))),
        }
    }

    fn unavailable(&self, action: &str, err: StorageError) -> ApiError {
        ApiError::StoreUnavailable(format!(
            "Failed to {} lineage document {} ({}): {}",
            action,
            self.document_key,
            self.store.backend_name(),
            err
        ))
    }
}
