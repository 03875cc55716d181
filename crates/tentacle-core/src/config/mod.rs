use std::path::Path;

use thiserror::Error;

mod schema;

pub use schema::{
    CommandsConfig, FilterMode, LogLevel, LogLevelFilter, TentacleConfig,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("config validation error: {message}")]
    Validation { message: String },
}

/// Load and validate a `TentacleConfig` from a TOML file path.
pub fn load_config(path: &Path) -> Result<TentacleConfig, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_config(&data)
}

/// Parse and validate a `TentacleConfig` from a TOML string.
pub fn parse_config(data: &str) -> Result<TentacleConfig, ConfigError> {
    let config: TentacleConfig = toml::from_str(data)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &TentacleConfig) -> Result<(), ConfigError> {
    if config.repo_full_name.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "repo_full_name must not be empty".to_string(),
        });
    }

    if !config.repo_full_name.contains('/') {
        return Err(ConfigError::Validation {
            message: format!(
                "repo_full_name must be 'owner/repo', got '{}'",
                config.repo_full_name
            ),
        });
    }

    if config.branches_dir.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "branches_dir must not be empty".to_string(),
        });
    }

    if config.commands.start.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "commands.start must not be empty".to_string(),
        });
    }

    Ok(())
}
