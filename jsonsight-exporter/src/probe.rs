//! The probe entry point: fetch a target, collect, render.

use std::io::Write;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::collector::{Collection, MetricCollector};
use crate::config::Config;
use crate::fetch::Fetcher;
use crate::registry::SampleRegistry;
use crate::store::SharedConfigStore;
use crate::templater::TargetTemplater;

/// Request-level failures. Each one ends only the probe that hit it.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Target parameter is missing")]
    TargetMissing,
    #[error("Failed to fetch {target}: {message}")]
    FetchFailed { target: String, message: String },
    #[error("Invalid target {target}: {message}")]
    InvalidTarget { target: String, message: String },
    #[error("Failed to collect {target}: {message}")]
    CollectFailed { target: String, message: String },
}

/// Probe statistics.
#[derive(Debug, Clone, Default)]
pub struct ProbeStats {
    /// Probe requests received.
    pub probes_total: u64,
    /// Probes that ended with a [`ProbeError`].
    pub probe_failures_total: u64,
    /// Samples rendered across all probes.
    pub samples_total: u64,
    /// Definitions or elements skipped during collection.
    pub warnings_total: u64,
    /// Samples refused by the registry.
    pub rejected_samples_total: u64,
}

/// A fetched payload together with the configuration it was fetched under.
///
/// Collecting it borrows both, so a reload that lands mid-probe does not
/// affect this scrape.
pub struct Scrape {
    /// The resolved target.
    pub target: String,
    /// Configuration snapshot taken when the probe started.
    pub config: Arc<Config>,
    /// The fetched document.
    pub payload: Bytes,
}

impl Scrape {
    /// Collect every metric definition against the payload.
    pub fn collect(&self) -> Collection<'_> {
        MetricCollector::new(&self.config.metrics, self.config.extractor.as_ref())
            .collect(&self.payload)
    }

    /// Collect, register and render in Prometheus text format.
    ///
    /// This is CPU-bound; async callers run it on the blocking pool.
    pub fn render(&self) -> Rendered {
        let collection = self.collect();
        let warnings = collection.warnings.len();

        let mut registry = SampleRegistry::new();
        let mut rejected = 0;
        for collected in collection.samples {
            if let Err(e) = registry.register_collected(collected) {
                warn!(url = %self.target, error = %e, "Sample rejected");
                rejected += 1;
            }
        }

        Rendered {
            samples: registry.sample_count(),
            warnings,
            rejected,
            body: registry.render(),
        }
    }
}

/// The exposition produced for one scrape.
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Prometheus text exposition.
    pub body: String,
    pub samples: usize,
    pub warnings: usize,
    pub rejected: u64,
}

/// Runs probes against the active configuration.
pub struct Prober {
    store: SharedConfigStore,
    templater: TargetTemplater,
    fetcher: Fetcher,
    stats: RwLock<ProbeStats>,
}

/// Create a shareable prober handle.
pub type SharedProber = Arc<Prober>;

impl Prober {
    /// Create a prober reading configuration from `store`.
    pub fn new(store: SharedConfigStore) -> Self {
        Self {
            store,
            templater: TargetTemplater::new(),
            fetcher: Fetcher::new(),
            stats: RwLock::new(ProbeStats::default()),
        }
    }

    /// The configuration store.
    pub fn store(&self) -> &SharedConfigStore {
        &self.store
    }

    /// The per-target scrape history.
    pub fn templater(&self) -> &TargetTemplater {
        &self.templater
    }

    /// Resolve and fetch `target` without collecting.
    ///
    /// The scrape time is recorded before the fetch starts, so it stays
    /// recorded even if the fetch fails or is cancelled.
    pub async fn scrape(&self, target: Option<&str>) -> Result<Scrape, ProbeError> {
        let target = match target.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(ProbeError::TargetMissing),
        };

        let config = self.store.get();
        let resolved = self.templater.resolve(target, config.scrape_interval());
        let payload = self
            .fetcher
            .fetch(&resolved, &config.source.headers, config.fetch_timeout())
            .await?;

        Ok(Scrape {
            target: resolved,
            config,
            payload,
        })
    }

    /// Probe `target` and render its samples in Prometheus text format.
    pub async fn probe(&self, target: Option<&str>) -> Result<String, ProbeError> {
        self.stats.write().probes_total += 1;

        let scrape = match self.scrape(target).await {
            Ok(scrape) => scrape,
            Err(e) => {
                self.stats.write().probe_failures_total += 1;
                warn!(error = %e, "Probe failed");
                return Err(e);
            }
        };

        let target = scrape.target.clone();
        let rendered = match tokio::task::spawn_blocking(move || scrape.render()).await {
            Ok(rendered) => rendered,
            Err(e) => {
                self.stats.write().probe_failures_total += 1;
                let e = ProbeError::CollectFailed {
                    target,
                    message: e.to_string(),
                };
                warn!(error = %e, "Probe failed");
                return Err(e);
            }
        };

        {
            let mut stats = self.stats.write();
            stats.samples_total += rendered.samples as u64;
            stats.warnings_total += rendered.warnings as u64;
            stats.rejected_samples_total += rendered.rejected;
        }

        debug!(
            url = %target,
            samples = rendered.samples,
            warnings = rendered.warnings,
            rejected = rendered.rejected,
            "Probe complete"
        );
        Ok(rendered.body)
    }

    /// Probe statistics.
    pub fn stats(&self) -> ProbeStats {
        self.stats.read().clone()
    }

    /// Render the exporter's own metrics.
    pub fn render_stats(&self) -> String {
        let probe = self.stats();
        let reload = self.store.stats();
        let config = self.store.get();

        let mut output = Vec::with_capacity(1024);
        let mut metric = |name: &str, kind: &str, help: &str, value: String| {
            writeln!(output, "# HELP jsonsight_{} {}", name, help).ok();
            writeln!(output, "# TYPE jsonsight_{} {}", name, kind).ok();
            writeln!(output, "jsonsight_{} {}", name, value).ok();
        };

        metric(
            "probes_total",
            "counter",
            "Probe requests received.",
            probe.probes_total.to_string(),
        );
        metric(
            "probe_failures_total",
            "counter",
            "Probes that failed to fetch their target.",
            probe.probe_failures_total.to_string(),
        );
        metric(
            "samples_total",
            "counter",
            "Samples rendered across all probes.",
            probe.samples_total.to_string(),
        );
        metric(
            "collect_warnings_total",
            "counter",
            "Definitions or elements skipped during collection.",
            probe.warnings_total.to_string(),
        );
        metric(
            "rejected_samples_total",
            "counter",
            "Samples refused for a label mismatch or duplicate series.",
            probe.rejected_samples_total.to_string(),
        );
        metric(
            "config_reloads_total",
            "counter",
            "Configuration reload attempts.",
            reload.reloads_total.to_string(),
        );
        metric(
            "config_reload_failures_total",
            "counter",
            "Configuration reloads that were rejected.",
            reload.reload_failures_total.to_string(),
        );
        let last_success = reload
            .last_success
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0.0, |d| d.as_secs_f64());
        metric(
            "config_last_reload_success_timestamp_seconds",
            "gauge",
            "When the active configuration was applied.",
            last_success.to_string(),
        );
        metric(
            "config_metrics",
            "gauge",
            "Metric definitions in the active configuration.",
            config.metrics.len().to_string(),
        );
        metric(
            "targets",
            "gauge",
            "Distinct targets probed since startup.",
            self.templater.len().to_string(),
        );

        String::from_utf8(output).unwrap_or_default()
    }

    /// Log final statistics.
    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            probes_total = stats.probes_total,
            probe_failures_total = stats.probe_failures_total,
            samples_total = stats.samples_total,
            warnings_total = stats.warnings_total,
            targets = self.templater.len(),
            "Final statistics"
        );
    }
}
