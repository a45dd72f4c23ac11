//! The active configuration and its replacement.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::{error, info};

use crate::config::{Config, ConfigError};

/// Reload statistics.
#[derive(Debug, Clone, Default)]
pub struct ReloadStats {
    /// Reload attempts, successful or not.
    pub reloads_total: u64,
    /// Reloads rejected because the new configuration was invalid.
    pub reload_failures_total: u64,
    /// When a configuration was last applied.
    pub last_success: Option<SystemTime>,
}

/// Holds the one active [`Config`].
///
/// Readers get an `Arc` snapshot; the write lock is held only to swap the
/// pointer, so a snapshot taken before a reload stays valid and complete.
pub struct ConfigStore {
    current: RwLock<Arc<Config>>,
    path: PathBuf,
    stats: RwLock<ReloadStats>,
}

/// Create a shareable store handle.
pub type SharedConfigStore = Arc<ConfigStore>;

impl ConfigStore {
    /// Create a store whose configuration was loaded from `path`.
    pub fn new(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            path: path.into(),
            stats: RwLock::new(ReloadStats {
                last_success: Some(SystemTime::now()),
                ..Default::default()
            }),
        }
    }

    /// Load the initial configuration from `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = Config::load_from_file(&path)?;
        Ok(Self::new(path, config))
    }

    /// The configuration file this store reloads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the active configuration.
    pub fn get(&self) -> Arc<Config> {
        self.current.read().clone()
    }

    /// Replace the active configuration.
    pub fn set(&self, config: Config) {
        let config = Arc::new(config);
        *self.current.write() = config;
    }

    /// Re-read the store's configuration file.
    pub fn reload(&self) -> Result<(), ConfigError> {
        self.reload_from(&self.path)
    }

    /// Re-read configuration from `path`; keep the active one on failure.
    pub fn reload_from(&self, path: &Path) -> Result<(), ConfigError> {
        let result = Config::load_from_file(path);
        self.apply(result)
    }

    /// Replace the configuration file with `body` and apply it.
    ///
    /// The body is validated first; an invalid body leaves both the file and
    /// the active configuration untouched. An empty body is a plain reload.
    pub fn update(&self, body: &str) -> Result<(), ConfigError> {
        if body.trim().is_empty() {
            return self.reload();
        }

        let result = Config::parse(body).and_then(|config| {
            jsonsight_common::write_config(&self.path, body)?;
            info!(path = %self.path.display(), "Config file rewritten");
            Ok(config)
        });
        self.apply(result)
    }

    /// Reload statistics.
    pub fn stats(&self) -> ReloadStats {
        self.stats.read().clone()
    }

    fn apply(&self, result: Result<Config, ConfigError>) -> Result<(), ConfigError> {
        let mut stats = self.stats.write();
        stats.reloads_total += 1;

        match result {
            Ok(config) => {
                let metrics = config.metrics.len();
                let backend = config.backend();
                self.set(config);
                stats.last_success = Some(SystemTime::now());
                info!(metrics, backend = %backend, "Configuration reloaded");
                Ok(())
            }
            Err(e) => {
                stats.reload_failures_total += 1;
                error!(error = %e, "Failed to reload configuration, keeping previous one");
                Err(e)
            }
        }
    }
}
