//! Configuration errors

use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid YAML
    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Configuration parsed but carries invalid values
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
