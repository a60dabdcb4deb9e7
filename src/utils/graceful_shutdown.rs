use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use tokio::{signal, sync::broadcast};

/// Represents different shutdown reasons
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT (Ctrl+C) or SIGTERM
    Signal,
    /// Triggered programmatically, e.g. by a test harness
    Manual,
    /// The shutdown channel went away
    Force,
}

/// Fans one shutdown event out to every listener (server, background tasks).
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    /// Set once, before the broadcast, so late subscribers still see it
    initiated: Arc<OnceLock<ShutdownReason>>,
    /// How long in-flight requests may take to drain once shutdown starts
    drain_timeout: Duration,
}

impl GracefulShutdown {
    /// Create a new manager with the default 30-second drain timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(drain_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            initiated: Arc::new(OnceLock::new()),
            drain_timeout,
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.initiated.get().is_some()
    }

    /// Trigger shutdown; only the first call has an effect.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        if self.initiated.set(reason.clone()).is_ok() {
            tracing::info!("Shutdown initiated: {:?}", reason);
            if let Err(e) = self.shutdown_tx.send(reason) {
                tracing::debug!("No shutdown listeners: {}", e);
            }
        } else {
            tracing::warn!("Shutdown already initiated, ignoring {:?}", reason);
        }
    }

    /// Wait for SIGINT or SIGTERM and broadcast the shutdown.
    pub async fn run_signal_handler(&self) {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = wait_for_sigterm() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        self.trigger_shutdown(ShutdownReason::Signal);
    }

    /// Token handed to `axum::serve(..).with_graceful_shutdown`.
    pub fn shutdown_token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.subscribe(),
            initiated: self.initiated.clone(),
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::error!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}

/// A token that resolves once shutdown has been requested
pub struct ShutdownToken {
    receiver: broadcast::Receiver<ShutdownReason>,
    initiated: Arc<OnceLock<ShutdownReason>>,
}

impl Clone for ShutdownToken {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            initiated: self.initiated.clone(),
        }
    }
}

impl ShutdownToken {
    pub fn is_shutdown_initiated(&self) -> bool {
        self.initiated.get().is_some()
    }

    /// Wait for the shutdown signal; returns at once if it already fired.
    pub async fn wait_for_shutdown(mut self) -> ShutdownReason {
        if let Some(reason) = self.initiated.get() {
            return reason.clone();
        }
        match self.receiver.recv().await {
            Ok(reason) => reason,
            Err(_) => ShutdownReason::Force,
        }
    }
}
