//! Merge rules: defaults first, environment last.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};

/// Create a builder with the defaults every layer overrides.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("storage.backend", "fs")?
        .set_default("storage.document_key", "experiments.json")
}

/// `ARBOR__STORAGE__BACKEND=sled` overrides `storage.backend`.
pub fn add_environment(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("ARBOR")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
