//! Generation Orchestrator
//!
//! Runs "prompt + parent step → new step" as a saga: generate the image, store
//! it, then append the step. Only the final append touches the lineage
//! document, so the repository's write lock is never held across a slow
//! generation call.
//!
//! Failure isolation:
//! - generation fails → nothing stored, nothing appended;
//! - upload fails → generated image discarded, nothing appended;
//! - append fails → the uploaded blob stays orphaned (logged, harmless).
//!
//! The append is the last await point, so a caller that drops the future
//! before it completes never gets a step appended on its behalf.

use crate::blob::{BlobRef, BlobStore};
use crate::error::ApiError;
use crate::experiment::id::new_blob_key;
use crate::experiment::{Experiment, Step};
use crate::provider::{GeneratedImage, ImageGenerator};
use crate::repository::LineageRepository;
use crate::types::{ExperimentId, StepIndex};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const GENERATED_PREFIX: &str = "generated";
const UPLOAD_PREFIX: &str = "uploads";

/// Timeouts for the external calls of a generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,

    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,
}

fn default_generation_timeout_ms() -> u64 {
    120_000
}

fn default_upload_timeout_ms() -> u64 {
    30_000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            generation_timeout_ms: default_generation_timeout_ms(),
            upload_timeout_ms: default_upload_timeout_ms(),
        }
    }
}

/// Request to grow an experiment from one of its steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateStepRequest {
    pub experiment_id: ExperimentId,
    pub parent_index: StepIndex,
    pub prompt: String,
}

/// Request to start an experiment from an uploaded root image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartExperimentRequest {
    pub name: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub struct GenerationOrchestrator {
    repository: Arc<LineageRepository>,
    generator: Arc<dyn ImageGenerator>,
    blobs: Arc<dyn BlobStore>,
    config: GenerationConfig,
}

impl GenerationOrchestrator {
    pub fn new(
        repository: Arc<LineageRepository>,
        generator: Arc<dyn ImageGenerator>,
        blobs: Arc<dyn BlobStore>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            repository,
            generator,
            blobs,
            config,
        }
    }

    pub fn repository(&self) -> &Arc<LineageRepository> {
        &self.repository
    }

    /// Generate an image for `prompt` and append it as a child of `parent_index`.
    pub async fn generate_step(&self, request: GenerateStepRequest) -> Result<Step, ApiError> {
        let GenerateStepRequest {
            experiment_id,
            parent_index,
            prompt,
        } = request;

        if prompt.trim().is_empty() {
            return Err(ApiError::InvalidRequest("Prompt cannot be empty".to_string()));
        }

        // Fail fast before the billable call; append_step re-checks authoritatively.
        self.repository
            .get(&experiment_id)
            .await?
            .check_parent(parent_index)?;

        info!(
            experiment_id = %experiment_id,
            parent_index,
            provider = self.generator.provider_name(),
            model = self.generator.model_name(),
            "Generating image"
        );
        let image = self.generate_image(&experiment_id, &prompt).await?;

        let key = new_blob_key(GENERATED_PREFIX, extension_for(&image.content_type));
        let blob = self
            .upload(&key, &image.bytes, &image.content_type)
            .await?;

        match self
            .repository
            .append_step(&experiment_id, &blob.url, parent_index, Some(prompt))
            .await
        {
            Ok(step) => {
                info!(
                    experiment_id = %experiment_id,
                    step_index = step.index,
                    blob_key = %blob.key,
                    "Generated step recorded"
                );
                Ok(step)
            }
            Err(e) => {
                warn!(
                    experiment_id = %experiment_id,
                    blob_key = %blob.key,
                    error = %e,
                    "Append failed after upload; generated image left orphaned"
                );
                Err(e)
            }
        }
    }

    /// Upload a root image and create an experiment around it.
    pub async fn start_experiment(
        &self,
        request: StartExperimentRequest,
    ) -> Result<Experiment, ApiError> {
        if request.bytes.is_empty() {
            return Err(ApiError::InvalidRequest("Root image is empty".to_string()));
        }

        let name = match request.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => default_experiment_name(),
        };
        let key = format!(
            "{}/{}-{}",
            UPLOAD_PREFIX,
            Uuid::new_v4(),
            sanitize_file_name(&request.file_name)
        );
        let blob = self
            .upload(&key, &request.bytes, &request.content_type)
            .await?;

        self.repository
            .create_experiment(&name, &blob.url)
            .await
            .inspect_err(|e| {
                warn!(
                    blob_key = %blob.key,
                    error = %e,
                    "Experiment creation failed after upload; root image left orphaned"
                );
            })
    }

    async fn generate_image(
        &self,
        experiment_id: &ExperimentId,
        prompt: &str,
    ) -> Result<GeneratedImage, ApiError> {
        let limit = Duration::from_millis(self.config.generation_timeout_ms);
        let result = match tokio::time::timeout(limit, self.generator.generate(prompt)).await {
            Ok(Ok(image)) => return Ok(image),
            Ok(Err(ApiError::GenerationRejected(msg))) => ApiError::GenerationRejected(msg),
            Ok(Err(other)) => ApiError::GenerationRejected(other.to_string()),
            Err(_) => ApiError::GenerationRejected(format!(
                "Image generation timed out after {} ms",
                self.config.generation_timeout_ms
            )),
        };
        warn!(experiment_id = %experiment_id, error = %result, "Image generation rejected");
        Err(result)
    }

    async fn upload(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<BlobRef, ApiError> {
        let limit = Duration::from_millis(self.config.upload_timeout_ms);
        match tokio::time::timeout(limit, self.blobs.put(key, bytes, content_type)).await {
            Ok(Ok(blob)) => Ok(blob),
            Ok(Err(e)) => Err(ApiError::StorageFailure(format!(
                "Failed to store image {}: {}",
                key, e
            ))),
            Err(_) => Err(ApiError::StorageFailure(format!(
                "Storing image {} timed out after {} ms",
                key, self.config.upload_timeout_ms
            ))),
        }
    }
}

fn default_experiment_name() -> String {
    format!("Experiment {}", Utc::now().format("%H:%M:%S"))
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/webp" => ".webp",
        "image/gif" => ".gif",
        _ => ".png",
    }
}

/// Keep the final path component and replace anything outside `[A-Za-z0-9._-]`.
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}
