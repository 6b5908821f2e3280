//! Configuration loading from text and disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::defaults::ConfigBootstrap;
use crate::config::schema::ConfigTree;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration text.
pub fn parse_config(text: &str) -> Result<ConfigTree, ConfigError> {
    let config: ConfigTree = toml::from_str(text)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ConfigTree, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Where a run takes its configuration from.
#[derive(Debug, Clone, Default)]
pub enum ConfigSource {
    /// The built-in tree.
    #[default]
    Builtin,
    /// Host-supplied configuration text.
    Text(Arc<str>),
    /// A configuration file, read at the start of every run.
    File(PathBuf),
}

impl ConfigSource {
    /// Produce the tree for a run.
    pub fn load(&self) -> Result<ConfigTree, ConfigError> {
        match self {
            ConfigSource::Builtin => Ok(ConfigBootstrap::default_config()),
            ConfigSource::Text(text) => parse_config(text),
            ConfigSource::File(path) => load_config(path),
        }
    }
}
