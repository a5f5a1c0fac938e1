//! Configuration System
//!
//! Layered configuration for storage, the image provider, the repository and
//! generation timeouts, and logging. Layers, lowest to highest precedence:
//!
//! 1. built-in defaults
//! 2. global file: `$XDG_CONFIG_HOME/arbor/config.toml` or `~/.config/arbor/config.toml`
//! 3. workspace files: `config/config.toml`, then `config/{ARBOR_ENV}.toml`
//! 4. environment: `ARBOR__SECTION__KEY`
//!
//! `OPENAI_API_KEY` fills `provider.api_key` when no layer sets it.

use crate::blob::StorageConfig;
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::orchestrator::GenerationConfig;
use crate::provider::ImageProviderConfig;
use crate::repository::RepositoryConfig;
use config::builder::DefaultState;
use config::{ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod merge;
mod sources;

pub use sources::global_config_path;

const REDACTED: &str = "<redacted>";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArborConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub provider: ImageProviderConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Storage(String),
    Provider(String),
    Repository(String),
    Generation(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Repository(msg) => write!(f, "Repository: {}", msg),
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ArborConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.storage.document_key.trim().is_empty() {
            errors.push(ValidationError::Storage(
                "Document key cannot be empty".to_string(),
            ));
        } else if let Err(e) = crate::blob::validate_key(&self.storage.document_key) {
            errors.push(ValidationError::Storage(e.to_string()));
        }
        if self.storage.root.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Storage root cannot be empty".to_string(),
            ));
        }

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }

        if self.repository.store_timeout_ms == 0 {
            errors.push(ValidationError::Repository(
                "Store timeout must be positive".to_string(),
            ));
        }

        if self.generation.generation_timeout_ms == 0 {
            errors.push(ValidationError::Generation(
                "Generation timeout must be positive".to_string(),
            ));
        }
        if self.generation.upload_timeout_ms == 0 {
            errors.push(ValidationError::Generation(
                "Upload timeout must be positive".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding all errors into one [`ApiError::ConfigError`].
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })
    }

    /// Copy with secrets replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.provider.api_key.is_some() {
            config.provider.api_key = Some(REDACTED.to_string());
        }
        config
    }

    /// Render as TOML with secrets redacted.
    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(&self.redacted())
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}

/// Loads [`ArborConfig`] from the layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load every layer for `workspace_root`. A relative storage root is
    /// resolved against the workspace.
    pub fn load(workspace_root: &Path) -> Result<ArborConfig, ApiError> {
        let builder = merge::builder_with_defaults()?;
        let builder = sources::add_global_file(builder)?;
        let builder = sources::add_workspace_files(builder, workspace_root)?;
        let mut config = Self::finish(merge::add_environment(builder))?;

        if config.storage.root.is_relative() {
            config.storage.root = workspace_root.join(&config.storage.root);
        }
        if let Some(file) = config.logging.file.as_mut() {
            if file.is_relative() {
                *file = workspace_root.join(&*file);
            }
        }
        Ok(config)
    }

    /// Load a single explicit file plus environment overrides.
    pub fn load_from_file(path: &Path) -> Result<ArborConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = merge::builder_with_defaults()?.add_source(File::from(path).required(true));
        Self::finish(merge::add_environment(builder))
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<ArborConfig, ApiError> {
        let mut config: ArborConfig = builder.build()?.try_deserialize()?;
        if config.provider.api_key.is_none() {
            config.provider.api_key = std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.is_empty());
        }
        Ok(config)
    }
}
