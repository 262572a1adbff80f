//! Configuration builder for layered configuration loading

use crate::{Config, ConfigError, ConfigResult};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

const TEMPLATE_PLACEHOLDER: &str = "{OriginalName}";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration builder for loading configuration from multiple sources
#[derive(Debug)]
pub struct ConfigBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<ConfigSource>,
    env_separator: String,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File { path: PathBuf, format: FileFormat },
    Defaults,
    Environment { prefix: String },
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
            env_separator: "__".to_string(),
        }
    }

    /// Add default configuration values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source; a missing file is skipped
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = separator.into();
        self
    }

    /// Build and validate the configuration
    pub fn build(mut self) -> ConfigResult<Config> {
        // Defaults are always the base layer
        let defaults = serde_yaml::to_value(Config::default())
            .map_err(|e| ConfigError::format("YAML", e))?;
        self.inner = self.inner.add_source(config::Config::try_from(&defaults)?);

        for source in &self.sources {
            match source {
                ConfigSource::File { path, format } => {
                    if path.exists() {
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                ConfigSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix)
                            .prefix_separator(&self.env_separator)
                            .separator(&self.env_separator)
                            .list_separator(",")
                            .with_list_parse_key("detection.ignored_extensions")
                            .with_list_parse_key("detection.special_folder_names")
                            .try_parsing(true),
                    );
                }
                ConfigSource::Defaults => {}
            }
        }

        let config: Config = self.inner.build()?.try_deserialize()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Try to build the configuration, returning defaults on error
    pub fn build_or_default(self) -> Config {
        self.build().unwrap_or_default()
    }

    /// Detect file format from extension
    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    /// Validate the configuration
    pub fn validate(config: &Config) -> ConfigResult<()> {
        let naming = &config.naming;
        for (key, template) in [
            ("name_clash_template", &naming.name_clash_template),
            ("delete_conflict_template", &naming.delete_conflict_template),
            ("edit_conflict_template", &naming.edit_conflict_template),
        ] {
            if !template.contains(TEMPLATE_PLACEHOLDER) {
                return Err(ConfigError::Template {
                    key,
                    template: template.clone(),
                });
            }
        }
        if naming.max_name_length == 0 {
            return Err(ConfigError::OutOfRange {
                key: "naming.max_name_length",
                requirement: "greater than 0",
                value: naming.max_name_length,
            });
        }
        if naming.suffix_length == 0 || naming.suffix_length > 16 {
            return Err(ConfigError::OutOfRange {
                key: "naming.suffix_length",
                requirement: "between 1 and 16",
                value: naming.suffix_length,
            });
        }

        if let Some(extension) = config
            .detection
            .ignored_extensions
            .iter()
            .find(|extension| !extension.starts_with('.') || extension.len() < 2)
        {
            return Err(ConfigError::Invalid {
                key: "detection.ignored_extensions",
                value: extension.clone(),
                reason: "must start with a dot",
            });
        }

        if config.scheduler.queue_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                key: "scheduler.queue_capacity",
                requirement: "greater than 0",
                value: config.scheduler.queue_capacity,
            });
        }

        if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::Invalid {
                key: "logging.level",
                value: config.logging.level.clone(),
                reason: "is not one of trace, debug, info, warn, error",
            });
        }

        Ok(())
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(extension: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(extension).tempfile().unwrap();
        writeln!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().add_defaults().build().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.naming.max_name_length, 255);
        assert!(config.detection.ignored_extensions.contains(&".tmp".to_string()));
    }

    #[test]
    fn test_builder_yaml_file() {
        let file = file_with(
            ".yaml",
            r#"
scheduler:
  queue_capacity: 8
detection:
  special_folder_names: ["Shared with me"]
logging:
  level: debug
"#,
        );

        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(file.path())
            .build()
            .unwrap();

        assert_eq!(config.scheduler.queue_capacity, 8);
        assert_eq!(config.detection.special_folder_names, vec!["Shared with me".to_string()]);
        assert!(config.detection.ignore_office_temp_files);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_builder_toml_file() {
        let file = file_with(
            ".toml",
            r#"
[naming]
suffix_length = 8
"#,
        );

        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(file.path())
            .build()
            .unwrap();

        assert_eq!(config.naming.suffix_length, 8);
        assert_eq!(config.naming.max_name_length, 255);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file("/nonexistent/duplex.yaml")
            .build()
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[rstest]
    #[case("scheduler:\n  queue_capacity: 0", "queue_capacity")]
    #[case("naming:\n  edit_conflict_template: \"backup\"", "edit_conflict_template")]
    #[case("naming:\n  suffix_length: 0", "suffix_length")]
    #[case("detection:\n  ignored_extensions: [\"tmp\"]", "must start with a dot")]
    #[case("logging:\n  level: verbose", "logging.level")]
    fn test_builder_validation(#[case] content: &str, #[case] expected: &str) {
        let file = file_with(".yaml", content);

        let result = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(file.path())
            .build();

        let message = result.unwrap_err().to_string();
        assert!(message.contains(expected), "{message}");
    }
}
