//! Configuration for the JSON exporter.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jsonsight_common::LoggingConfig;
use jsonsight_extract::{Backend, Extractor};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mapping::{is_valid_label_name, is_valid_metric_name};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Load(#[from] jsonsight_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Reload failed: {0}")]
    Reload(String),
}

/// Exporter configuration as written in the JSON5 file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Query language used by every metric path.
    #[serde(default)]
    pub extractor: Backend,

    /// Fixed scrape interval. When set, the first probe of a target resolves
    /// `${__from}` to now minus this interval instead of the epoch.
    #[serde(default)]
    pub scrape_interval_secs: Option<u64>,

    /// Headers sent with every fetch.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// HTTP settings. `listen` is only read at startup.
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging configuration. Only read at startup.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metric definitions, in exposition order.
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

/// HTTP server and client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "0.0.0.0:7979").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Timeout for fetching a target (default: 10 seconds).
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_listen() -> String {
    "0.0.0.0:7979".to_string()
}

fn default_fetch_timeout() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

/// How a metric turns a payload into samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeType {
    /// One sample from the payload.
    Value,
    /// One sample per element selected by `object_path`.
    Object,
}

/// One metric as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Metric name.
    pub name: String,

    /// HELP text (defaults to the name).
    #[serde(default)]
    pub help: String,

    /// Scrape type. Inferred from `object_path` when omitted.
    #[serde(default, rename = "type")]
    pub scrape_type: Option<ScrapeType>,

    /// Value path, or a numeric literal. Relative to each element in object mode.
    pub path: String,

    /// Path selecting the array or object to iterate.
    #[serde(default)]
    pub object_path: Option<String>,

    /// Labels, in order.
    #[serde(default)]
    pub labels: Vec<LabelConfig>,
}

/// One label as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Label name.
    pub name: String,
    /// Path to the label value.
    pub path: String,
}

/// A validated metric definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDefinition {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub value_path: String,
    /// Present for object-mode metrics.
    pub object_path: Option<String>,
    pub label_paths: Vec<String>,
}

impl MetricDefinition {
    /// The scrape type implied by the object path.
    pub fn scrape_type(&self) -> ScrapeType {
        if self.object_path.is_some() {
            ScrapeType::Object
        } else {
            ScrapeType::Value
        }
    }
}

impl TryFrom<&MetricConfig> for MetricDefinition {
    type Error = ConfigError;

    fn try_from(metric: &MetricConfig) -> Result<Self, Self::Error> {
        if !is_valid_metric_name(&metric.name) {
            return Err(ConfigError::Validation(format!(
                "Invalid metric name: {:?}",
                metric.name
            )));
        }

        match (metric.scrape_type, &metric.object_path) {
            (Some(ScrapeType::Object), None) => {
                return Err(ConfigError::Validation(format!(
                    "Metric {} has type object but no object_path",
                    metric.name
                )));
            }
            (Some(ScrapeType::Value), Some(_)) => {
                return Err(ConfigError::Validation(format!(
                    "Metric {} has type value but sets object_path",
                    metric.name
                )));
            }
            _ => {}
        }

        if metric.path.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Metric {} has an empty path",
                metric.name
            )));
        }

        let mut seen = HashSet::new();
        for label in &metric.labels {
            if !is_valid_label_name(&label.name) {
                return Err(ConfigError::Validation(format!(
                    "Metric {} has an invalid label name: {:?}",
                    metric.name, label.name
                )));
            }
            if !seen.insert(label.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Metric {} has duplicate label name: {}",
                    metric.name, label.name
                )));
            }
        }

        let help = if metric.help.is_empty() {
            metric.name.clone()
        } else {
            metric.help.clone()
        };

        Ok(Self {
            name: metric.name.clone(),
            help,
            label_names: metric.labels.iter().map(|l| l.name.clone()).collect(),
            value_path: metric.path.clone(),
            object_path: metric.object_path.clone(),
            label_paths: metric.labels.iter().map(|l| l.path.clone()).collect(),
        })
    }
}

/// A loaded, validated configuration.
///
/// Immutable once built; replaced as a whole on reload.
#[derive(Debug, Clone)]
pub struct Config {
    /// Settings as read from the file.
    pub source: ExporterConfig,
    /// Metric definitions, in file order.
    pub metrics: Vec<MetricDefinition>,
    /// Extractor for the configured backend.
    pub extractor: Arc<dyn Extractor>,
}

impl Config {
    /// Load and validate configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let source: ExporterConfig = jsonsight_common::load_config(path)?;
        Self::try_from(source)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let source: ExporterConfig = jsonsight_common::parse_config(content)?;
        Self::try_from(source)
    }

    /// The configured backend.
    pub fn backend(&self) -> Backend {
        self.source.extractor
    }

    /// Scrape interval used for the first `${__from}` of a target.
    pub fn scrape_interval(&self) -> Option<Duration> {
        self.source
            .scrape_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Timeout applied to each fetch.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.source.http.fetch_timeout_secs)
    }
}

impl TryFrom<ExporterConfig> for Config {
    type Error = ConfigError;

    fn try_from(source: ExporterConfig) -> Result<Self, Self::Error> {
        source.validate()?;

        let metrics = source
            .metrics
            .iter()
            .map(MetricDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let extractor = source.extractor.extractor();

        Ok(Self {
            source,
            metrics,
            extractor,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let source = ExporterConfig::default();
        let extractor = source.extractor.extractor();
        Self {
            source,
            metrics: Vec::new(),
            extractor,
        }
    }
}

impl ExporterConfig {
    /// Validate settings that do not belong to a single metric.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate listen address format
        if self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.http.listen
            )));
        }

        if self.http.fetch_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fetch_timeout_secs must be > 0".to_string(),
            ));
        }

        for (name, value) in &self.headers {
            if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(ConfigError::Validation(format!(
                    "Invalid header name: {:?}",
                    name
                )));
            }
            if reqwest::header::HeaderValue::from_str(value).is_err() {
                return Err(ConfigError::Validation(format!(
                    "Invalid value for header {}",
                    name
                )));
            }
        }

        let mut names = HashSet::new();
        for metric in &self.metrics {
            if !names.insert(metric.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate metric name: {}",
                    metric.name
                )));
            }
        }

        Ok(())
    }
}
