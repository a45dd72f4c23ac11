//! Prometheus exporter that probes JSON endpoints.
//!
//! Each `/probe?target=<url>` request fetches a JSON document from the target
//! and turns it into metrics using the configured JSONPath or jq definitions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ /probe?target│────>│  Templater  │────>│   Fetcher   │────>│  Collector  │
//! │   (axum)     │     │ (${__from}) │     │  (reqwest)  │     │ + registry  │
//! └──────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                             ▲                                       ▲
//!                             └──────────── ConfigStore ──────────────┘
//!                                  (SIGHUP, /config/reload, /config/update)
//! ```
//!
//! # Usage
//!
//! ```bash
//! jsonsight-exporter --config jsonsight.json5
//! curl 'http://localhost:7979/probe?target=http://service/stats'
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod fetch;
pub mod http;
pub mod mapping;
pub mod probe;
pub mod registry;
pub mod reload;
pub mod store;
pub mod templater;

pub use collector::{Collection, MetricCollector};
pub use config::{Config, ConfigError, ExporterConfig};
pub use http::{AppState, HttpServer, create_router};
pub use probe::{ProbeError, Prober, SharedProber};
pub use reload::{ReloadHandle, spawn_reloader};
pub use store::{ConfigStore, SharedConfigStore};
pub use templater::TargetTemplater;
