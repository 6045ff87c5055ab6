//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Fixture file present but not a JSON array of integers
    #[error("Fixture file {} is not a JSON array of ids: {source}", path.display())]
    FixtureFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {var}: {message}")]
    Env { var: String, message: String },

    #[error("Domain configuration error in {domain}: {message}")]
    DomainError { domain: String, message: String },
}
