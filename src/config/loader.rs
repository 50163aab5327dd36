//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{ActionTableConfig, DispatchConfig};
use crate::config::validation::{validate_action_table, validate_config, ValidationError};
use crate::descriptor::registry::HandlerRegistry;
use crate::descriptor::types::{ActionDescriptor, DescriptorError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", format_validation(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<DispatchConfig, ConfigError> {
    let content = read(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<DispatchConfig, ConfigError> {
    let config: DispatchConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate an action table file.
pub fn load_action_table(path: &Path) -> Result<ActionTableConfig, ConfigError> {
    let content = read(path)?;
    parse_action_table(&content)
}

pub fn parse_action_table(content: &str) -> Result<ActionTableConfig, ConfigError> {
    let table: ActionTableConfig = toml::from_str(content)?;
    validate_action_table(&table).map_err(ConfigError::Validation)?;
    Ok(table)
}

/// Load a table and resolve it into descriptors.
pub fn load_descriptors(path: &Path, registry: &HandlerRegistry) -> Result<Vec<ActionDescriptor>, ConfigError> {
    let table = load_action_table(path)?;
    Ok(registry.build(&table)?)
}
