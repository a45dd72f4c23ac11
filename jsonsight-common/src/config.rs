//! JSON5 configuration files and the logging section shared by every binary.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How log lines are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One human-readable line per event.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// The `logging` section of a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `jsonsight_exporter=debug,warn`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    String::from("info")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Replace the level when `level` is set.
    pub fn with_level(mut self, level: Option<String>) -> Self {
        if let Some(level) = level {
            self.level = level;
        }
        self
    }
}

/// Read and deserialize a JSON5 file.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;

    json5::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config in {}: {}", path.display(), e)))
}

/// Deserialize a JSON5 document held in memory.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
}

/// Replace a configuration file with new content.
///
/// The content goes to `<path>.tmp` first and is renamed over the target, so
/// a concurrent reader sees either the old file or the new one.
pub fn write_config(path: impl AsRef<Path>, content: &str) -> Result<()> {
    let path = path.as_ref();
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Section {
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_logging_defaults_when_absent() {
        let section: Section = parse_config("{}").unwrap();
        assert_eq!(section.logging, LoggingConfig::default());
        assert_eq!(section.logging.level, "info");
    }

    #[test]
    fn test_logging_section() {
        let section: Section =
            parse_config("{ logging: { level: 'jsonsight_exporter=debug', format: 'json' } }")
                .unwrap();

        assert_eq!(section.logging.level, "jsonsight_exporter=debug");
        assert_eq!(section.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_with_level() {
        let logging = LoggingConfig::default().with_level(Some("trace".to_string()));
        assert_eq!(logging.level, "trace");

        let logging = LoggingConfig::default().with_level(None);
        assert_eq!(logging.level, "info");
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result: Result<Section> = parse_config("{ logging: { format: 'xml' } }");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_truncated_document_rejected() {
        let result: Result<Section> = parse_config("{ logging: ");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json5");

        write_config(&path, "{ logging: { level: 'warn' } }").unwrap();
        write_config(&path, "{ logging: { level: 'error' } }").unwrap();

        let section: Section = load_config(&path).unwrap();
        assert_eq!(section.logging.level, "error");
        assert!(!dir.path().join("config.json5.tmp").exists());
    }

    #[test]
    fn test_write_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("config.json5");

        assert!(matches!(write_config(&path, "{}"), Err(Error::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_load_missing_file() {
        let result: Result<Section> = load_config("/nonexistent/jsonsight.json5");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Cannot read /nonexistent/jsonsight.json5"));
    }
}
