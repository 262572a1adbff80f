//! Error types for configuration management

use duplex_types::Error as DuplexError;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing a configuration file failed
    #[error("I/O error on config file '{path}': {source}")]
    Io {
        /// Path to the configuration file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A conflict name template lacks the original name placeholder
    #[error("naming.{key} must contain {{OriginalName}}, got '{template}'")]
    Template {
        /// Template key under `naming`
        key: &'static str,
        /// Rejected template
        template: String,
    },

    /// A numeric setting outside its accepted range
    #[error("{key} must be {requirement}, got {value}")]
    OutOfRange {
        /// Dotted setting path
        key: &'static str,
        /// Accepted range, in words
        requirement: &'static str,
        /// Rejected value
        value: usize,
    },

    /// A textual setting with an unusable value
    #[error("{key}: '{value}' {reason}")]
    Invalid {
        /// Dotted setting path
        key: &'static str,
        /// Rejected value
        value: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Encoding the configuration for a file format failed
    #[error("Cannot write configuration as {format}: {message}")]
    Format {
        /// Target format
        format: &'static str,
        /// Encoder message
        message: String,
    },

    /// Merging the layered sources failed
    #[error("Configuration error: {0}")]
    Source(#[from] config::ConfigError),
}

impl ConfigError {
    pub(crate) fn format(format: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Format {
            format,
            message: error.to_string(),
        }
    }
}

impl From<ConfigError> for DuplexError {
    fn from(error: ConfigError) -> Self {
        DuplexError::config(error.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
