//! Lineage API
//!
//! Transport-agnostic operation surface: list experiments, fetch the whole log
//! or its graph projection, draw a random branch point, start an experiment,
//! and generate a step. Stateless between calls apart from the persisted log.

use crate::blob::{self, BlobStore};
use crate::branch::{pick_random_branch_point, BranchPoint};
use crate::config::ArborConfig;
use crate::error::ApiError;
use crate::experiment::{validate, Experiment, ExperimentSummary, LineageLog, Step, Violation};
use crate::graph::{project_graph, LineageGraph};
use crate::orchestrator::{
    GenerateStepRequest, GenerationConfig, GenerationOrchestrator, StartExperimentRequest,
};
use crate::provider::{ImageGenerator, UnconfiguredGenerator};
use crate::repository::{LineageRepository, RepositoryConfig};
use crate::types::ExperimentId;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Integrity violations found in one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub experiment_id: ExperimentId,
    pub violations: Vec<Violation>,
}

/// Outcome of an integrity pass over the whole log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityAudit {
    pub checked: usize,
    pub reports: Vec<IntegrityReport>,
}

impl IntegrityAudit {
    pub fn is_clean(&self) -> bool {
        self.reports.is_empty()
    }
}

pub struct LineageApi {
    repository: Arc<LineageRepository>,
    orchestrator: GenerationOrchestrator,
}

impl LineageApi {
    pub fn new(repository: Arc<LineageRepository>, orchestrator: GenerationOrchestrator) -> Self {
        Self {
            repository,
            orchestrator,
        }
    }

    /// Wire a repository and orchestrator over one blob store.
    pub fn from_parts(
        store: Arc<dyn BlobStore>,
        generator: Arc<dyn ImageGenerator>,
        document_key: impl Into<String>,
        repository_config: RepositoryConfig,
        generation_config: GenerationConfig,
    ) -> Self {
        let repository = Arc::new(LineageRepository::new(
            store.clone(),
            document_key,
            repository_config,
        ));
        let orchestrator =
            GenerationOrchestrator::new(repository.clone(), generator, store, generation_config);
        Self::new(repository, orchestrator)
    }

    /// Build from configuration. A missing or invalid provider does not stop
    /// read-only use; generation is then rejected with the reason.
    pub fn from_config(config: &ArborConfig) -> Result<Self, ApiError> {
        let store = blob::open(&config.storage).map_err(|e| {
            ApiError::StoreUnavailable(format!("Failed to open blob store: {}", e))
        })?;
        let generator = match config.provider.to_client() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Image provider unavailable; generation disabled");
                Arc::new(UnconfiguredGenerator::new(e.to_string())) as Arc<dyn ImageGenerator>
            }
        };
        Ok(Self::from_parts(
            store,
            generator,
            config.storage.document_key.clone(),
            config.repository.clone(),
            config.generation.clone(),
        ))
    }

    pub fn repository(&self) -> &Arc<LineageRepository> {
        &self.repository
    }

    pub async fn list_experiments(&self) -> Result<Vec<ExperimentSummary>, ApiError> {
        self.repository.list_summaries().await
    }

    pub async fn all_experiments(&self) -> Result<LineageLog, ApiError> {
        self.repository.load().await
    }

    pub async fn get_experiment(&self, experiment_id: &ExperimentId) -> Result<Experiment, ApiError> {
        self.repository.get(experiment_id).await
    }

    pub async fn graph(&self) -> Result<LineageGraph, ApiError> {
        let log = self.repository.load().await?;
        Ok(project_graph(&log.experiments))
    }

    pub async fn random_branch_point(
        &self,
        experiment_id: &ExperimentId,
    ) -> Result<BranchPoint, ApiError> {
        let experiment = self.repository.get(experiment_id).await?;
        pick_random_branch_point(&experiment, &mut rand::rng())
    }

    /// Same as [`Self::random_branch_point`] with a caller-supplied RNG.
    pub async fn random_branch_point_with<R: Rng + Send + ?Sized>(
        &self,
        experiment_id: &ExperimentId,
        rng: &mut R,
    ) -> Result<BranchPoint, ApiError> {
        let experiment = self.repository.get(experiment_id).await?;
        pick_random_branch_point(&experiment, rng)
    }

    pub async fn create_experiment(
        &self,
        request: StartExperimentRequest,
    ) -> Result<Experiment, ApiError> {
        self.orchestrator.start_experiment(request).await
    }

    pub async fn generate_step(&self, request: GenerateStepRequest) -> Result<Step, ApiError> {
        self.orchestrator.generate_step(request).await
    }

    /// Run integrity checks over every experiment; only unsound ones are reported.
    ///
    /// Reads the document without the lineage checks applied on the hot path,
    /// so a broken experiment shows up here as a report instead of failing the
    /// whole read. Malformed JSON is still `CorruptDocument`.
    pub async fn validate_all(&self) -> Result<IntegrityAudit, ApiError> {
        let log = self.repository.load_unchecked().await?;
        let reports: Vec<IntegrityReport> = log
            .experiments
            .iter()
            .filter_map(|experiment| {
                let violations = validate(experiment);
                (!violations.is_empty()).then(|| IntegrityReport {
                    experiment_id: experiment.id.clone(),
                    violations,
                })
            })
            .collect();
        if !reports.is_empty() {
            warn!(
                checked = log.len(),
                unsound = reports.len(),
                "Lineage integrity violations found"
            );
        }
        Ok(IntegrityAudit {
            checked: log.len(),
            reports,
        })
    }
}
