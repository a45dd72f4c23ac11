//! Shared plumbing for the JSONSight crates: JSON5 config files, the logging
//! section, and the crate-wide error type.

pub mod config;
pub mod error;

pub use config::{LogFormat, LoggingConfig, load_config, parse_config, write_config};
pub use error::{Error, Result};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. HTTP client and server
/// internals are capped at `warn` unless `RUST_LOG` says otherwise.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let mut filter = EnvFilter::try_new(&config.level).map_err(|e| {
                Error::Config(format!("Invalid log level {:?}: {}", config.level, e))
            })?;
            for quiet in ["hyper=warn", "hyper_util=warn", "reqwest=warn"] {
                let directive = quiet
                    .parse()
                    .map_err(|e| Error::Config(format!("Invalid directive {}: {}", quiet, e)))?;
                filter = filter.add_directive(directive);
            }
            filter
        }
    };

    let output = match config.format {
        LogFormat::Text => fmt::layer().boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))
}
