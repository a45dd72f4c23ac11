//! Serialized configuration reloads.
//!
//! Every reload trigger (SIGHUP, `POST /config/reload`, `POST /config/update`)
//! is queued to a single worker, so at most one reload runs at a time and each
//! requester gets the outcome of its own attempt.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConfigError;
use crate::store::SharedConfigStore;

const QUEUE_DEPTH: usize = 16;

/// What caused a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadTrigger {
    /// SIGHUP.
    Signal,
    /// `POST /config/reload`.
    Request,
    /// `POST /config/update` with a new configuration body.
    Update(String),
}

impl ReloadTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            ReloadTrigger::Signal => "signal",
            ReloadTrigger::Request => "request",
            ReloadTrigger::Update(_) => "update",
        }
    }
}

struct ReloadRequest {
    trigger: ReloadTrigger,
    reply: Option<oneshot::Sender<Result<(), ConfigError>>>,
}

/// Sends reload requests to the worker.
#[derive(Clone)]
pub struct ReloadHandle {
    tx: mpsc::Sender<ReloadRequest>,
}

impl ReloadHandle {
    /// Re-read the configuration file and wait for the outcome.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        self.request(ReloadTrigger::Request).await
    }

    /// Replace the configuration file with `body` and wait for the outcome.
    pub async fn update(&self, body: String) -> Result<(), ConfigError> {
        self.request(ReloadTrigger::Update(body)).await
    }

    /// Queue a reload without waiting for it.
    pub async fn notify(&self, trigger: ReloadTrigger) -> Result<(), ConfigError> {
        self.tx
            .send(ReloadRequest {
                trigger,
                reply: None,
            })
            .await
            .map_err(|_| ConfigError::Reload("reload worker stopped".to_string()))
    }

    async fn request(&self, trigger: ReloadTrigger) -> Result<(), ConfigError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(ReloadRequest {
                trigger,
                reply: Some(reply),
            })
            .await
            .map_err(|_| ConfigError::Reload("reload worker stopped".to_string()))?;

        outcome
            .await
            .map_err(|_| ConfigError::Reload("reload worker dropped the request".to_string()))?
    }
}

/// Start the reload worker.
///
/// The worker runs until every [`ReloadHandle`] is dropped.
pub fn spawn_reloader(store: SharedConfigStore) -> (ReloadHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ReloadRequest>(QUEUE_DEPTH);

    let task = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let trigger = request.trigger.as_str();
            debug!(trigger, "Reload requested");

            let store = store.clone();
            let result = tokio::task::spawn_blocking(move || match request.trigger {
                ReloadTrigger::Update(body) => store.update(&body),
                ReloadTrigger::Signal | ReloadTrigger::Request => store.reload(),
            })
            .await
            .unwrap_or_else(|e| Err(ConfigError::Reload(format!("reload task failed: {}", e))));

            if let Err(e) = &result {
                warn!(trigger, error = %e, "Reload failed");
            }

            if let Some(reply) = request.reply {
                // The requester may have gone away.
                let _ = reply.send(result);
            }
        }
        debug!("Reload worker stopped");
    });

    (ReloadHandle { tx }, task)
}

/// Forward SIGHUP to the reload worker until shutdown.
#[cfg(unix)]
pub async fn watch_sighup(
    handle: ReloadHandle,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    info!("Listening for SIGHUP to reload configuration");

    loop {
        tokio::select! {
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                info!("Received SIGHUP, reloading configuration");
                if handle.notify(ReloadTrigger::Signal).await.is_err() {
                    break;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// SIGHUP is unavailable; wait for shutdown.
#[cfg(not(unix))]
pub async fn watch_sighup(
    _handle: ReloadHandle,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let _ = shutdown.wait_for(|stop| *stop).await;
    Ok(())
}
