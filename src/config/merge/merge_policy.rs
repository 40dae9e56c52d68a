//! Base builder seeded with the serialized defaults, so every key exists
//! before any source overlays it.

use crate::config::AdapterConfig;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};

pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = toml::to_string(&AdapterConfig::default())
        .map_err(|e| ConfigError::Message(format!("Failed to serialize defaults: {}", e)))?;
    Ok(config::Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml)))
}
