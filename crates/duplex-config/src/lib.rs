//! Configuration management for duplex
//!
//! Configuration is layered: built-in defaults, then an optional YAML, TOML or JSON
//! file, then `DUPLEX__*` environment variables. The result is validated before use.
//!
//! # Features
//!
//! - **Multiple formats**: YAML, TOML and JSON configuration files
//! - **Validation**: every section is checked when the configuration is built
//! - **Environment overrides**: `DUPLEX__SCHEDULER__QUEUE_CAPACITY=64` and the like
//! - **Defaults**: every option has a default, an empty file is a valid configuration
//!
//! # Examples
//!
//! ```rust
//! use duplex_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("duplex.yaml")
//!     .add_env_prefix("DUPLEX")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Queue capacity: {}", config.scheduler.queue_capacity);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use serde::{Deserialize, Serialize};

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for duplex
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Conflict naming
    #[serde(default)]
    pub naming: NamingConfig,
    /// Update detection
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Serial schedulers
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Names given to nodes renamed by conflict resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Template for the loser of a name clash
    pub name_clash_template: String,
    /// Template for nodes restored or moved away because of a deletion
    pub delete_conflict_template: String,
    /// Template for the preserved copy of an edit conflict loser
    pub edit_conflict_template: String,
    /// Longest generated name, in characters
    pub max_name_length: usize,
    /// Length of the `{RandomSuffix}` substitution
    pub suffix_length: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            name_clash_template: "{OriginalName} (# Name clash {CurrentDate} {RandomSuffix}C #){.Extension}"
                .to_string(),
            delete_conflict_template:
                "{OriginalName} (# Delete conflict {CurrentDate} {RandomSuffix}C #){.Extension}".to_string(),
            edit_conflict_template: "{OriginalName} (# Edit conflict {CurrentDate} {RandomSuffix}C #){.Extension}"
                .to_string(),
            max_name_length: 255,
            suffix_length: 5,
        }
    }
}

/// Items update detection never synchronizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// File extensions to ignore, with the leading dot, compared case-insensitively
    pub ignored_extensions: Vec<String>,
    /// Folder names ignored directly under a sync root
    #[serde(default)]
    pub special_folder_names: Vec<String>,
    /// Ignore Microsoft Office temporary files
    pub ignore_office_temp_files: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            ignored_extensions: [".crdownload", ".download", ".partial", ".part", ".temp", ".tmp", ".~tmp"]
                .into_iter()
                .map(String::from)
                .collect(),
            special_folder_names: Vec::new(),
            ignore_office_temp_files: true,
        }
    }
}

/// Serial scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Jobs each scheduler queues before callers wait
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable JSON formatting
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
