//! CLI route: single route table and run context. Dispatches to the lineage API and presentation.

use crate::api::LineageApi;
use crate::config::{ArborConfig, ConfigLoader};
use crate::error::ApiError;
use crate::experiment::document;
use crate::orchestrator::{GenerateStepRequest, StartExperimentRequest};
use crate::types::ExperimentId;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::cli::parse::{Commands, OutputFormat};
use crate::cli::presentation::{
    format_branch_point_text, format_experiment_text, format_summaries_table,
    format_validation_report,
};

/// Runtime context for CLI execution: workspace, effective config, the lineage
/// API and the async runtime it is driven on.
pub struct RunContext {
    api: LineageApi,
    config: ArborConfig,
    workspace_root: PathBuf,
    runtime: Runtime,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Self::from_config(workspace_root, config)
    }

    pub fn from_config(workspace_root: PathBuf, config: ArborConfig) -> Result<Self, ApiError> {
        config.ensure_valid()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to start runtime: {}", e)))?;
        let api = LineageApi::from_config(&config)?;
        debug!(
            workspace = %workspace_root.display(),
            backend = ?config.storage.backend,
            "Run context ready"
        );
        Ok(Self {
            api,
            config,
            workspace_root,
            runtime,
        })
    }

    pub fn api(&self) -> &LineageApi {
        &self.api
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        self.runtime.block_on(self.execute_inner(command))
    }

    async fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::List { format } => {
                let summaries = self.api.list_experiments().await?;
                match format {
                    OutputFormat::Json => to_json(&summaries),
                    OutputFormat::Text => Ok(format_summaries_table(&summaries)),
                }
            }
            Commands::Show {
                experiment_id,
                format,
            } => {
                let experiment = self
                    .api
                    .get_experiment(&ExperimentId::from(experiment_id.as_str()))
                    .await?;
                match format {
                    OutputFormat::Json => to_json(&experiment),
                    OutputFormat::Text => Ok(format_experiment_text(&experiment)),
                }
            }
            Commands::All => {
                let log = self.api.all_experiments().await?;
                let bytes = document::encode(&log)?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Commands::Graph => to_json(&self.api.graph().await?),
            Commands::Branch {
                experiment_id,
                seed,
                format,
            } => {
                let experiment_id = ExperimentId::from(experiment_id.as_str());
                let point = match seed {
                    Some(seed) => {
                        let mut rng = StdRng::seed_from_u64(*seed);
                        self.api
                            .random_branch_point_with(&experiment_id, &mut rng)
                            .await?
                    }
                    None => self.api.random_branch_point(&experiment_id).await?,
                };
                match format {
                    OutputFormat::Json => to_json(&point),
                    OutputFormat::Text => Ok(format_branch_point_text(&point)),
                }
            }
            Commands::Start { image, name } => {
                let request = self.read_root_image(image, name.clone()).await?;
                let experiment = self.api.create_experiment(request).await?;
                info!(experiment_id = %experiment.id, "Started experiment from CLI");
                Ok(format_experiment_text(&experiment))
            }
            Commands::Generate {
                experiment_id,
                parent,
                prompt,
            } => {
                let step = self
                    .api
                    .generate_step(GenerateStepRequest {
                        experiment_id: ExperimentId::from(experiment_id.as_str()),
                        parent_index: *parent,
                        prompt: prompt.clone(),
                    })
                    .await?;
                Ok(format!(
                    "Recorded step {} (parent {})\n  Image: {}",
                    step.index, parent, step.image_ref
                ))
            }
            Commands::Validate => Ok(format_validation_report(&self.api.validate_all().await?)),
            Commands::Config => self.config.to_toml(),
        }
    }

    async fn read_root_image(
        &self,
        image: &Path,
        name: Option<String>,
    ) -> Result<StartExperimentRequest, ApiError> {
        let path = if image.is_relative() {
            self.workspace_root.join(image)
        } else {
            image.to_path_buf()
        };
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            ApiError::InvalidRequest(format!("Cannot read image {}: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Ok(StartExperimentRequest {
            name,
            content_type: content_type_for(&path).to_string(),
            file_name,
            bytes,
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::InvalidRequest(format!("Failed to render JSON: {}", e)))
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}
