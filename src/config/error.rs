//! Error types for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while reading the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`super::DaemonConfig`]
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value parsed but cannot be used
    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// No home directory to derive default paths from
    #[error("Could not determine the home directory")]
    NoHomeDir,
}
