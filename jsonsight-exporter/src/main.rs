//! Prometheus exporter for JSON endpoints.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use jsonsight_exporter::{AppState, Config, ConfigStore, HttpServer, Prober, reload, spawn_reloader};

/// Prometheus exporter for JSON endpoints.
#[derive(Parser, Debug)]
#[command(name = "jsonsight-exporter")]
#[command(about = "Export values from JSON endpoints as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, default_value = "jsonsight.json5")]
    config: PathBuf,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (overrides config).
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.check_config {
        return match Config::load_from_file(&args.config) {
            Ok(config) => {
                println!(
                    "{}: OK ({} metrics, {} backend)",
                    args.config.display(),
                    config.metrics.len(),
                    config.backend()
                );
                Ok(())
            }
            Err(e) => {
                eprintln!("{}: {}", args.config.display(), e);
                std::process::exit(1);
            }
        };
    }

    // Load configuration
    let config = Config::load_from_file(&args.config)?;

    // Initialize logging
    let logging = config.source.logging.clone().with_level(args.log_level);
    jsonsight_common::init_tracing(&logging)?;

    info!(
        config = %args.config.display(),
        metrics = config.metrics.len(),
        backend = %config.backend(),
        "Starting JSONSight exporter"
    );

    // Parse listen address
    let listen = args.listen.unwrap_or_else(|| config.source.http.listen.clone());
    let listen_addr: SocketAddr = listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create components
    let store = Arc::new(ConfigStore::new(&args.config, config));
    let (reload_handle, reload_task) = spawn_reloader(store.clone());
    let prober = Arc::new(Prober::new(store));
    let http_server = HttpServer::new(
        AppState {
            prober: prober.clone(),
            reload: reload_handle.clone(),
        },
        listen_addr,
    );

    // Start SIGHUP listener
    let sighup_shutdown = shutdown_rx.clone();
    let sighup_task = tokio::spawn(async move {
        if let Err(e) = reload::watch_sighup(reload_handle, sighup_shutdown).await {
            error!("SIGHUP listener error: {}", e);
        }
    });

    // Start HTTP server
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for tasks to complete; the reload worker exits once the last
    // handle is dropped with the HTTP server and SIGHUP listener.
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = sighup_task.await;
        let _ = http_task.await;
        let _ = reload_task.await;
    })
    .await;

    prober.log_stats();
    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
