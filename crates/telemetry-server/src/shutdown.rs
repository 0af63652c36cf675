//! Signal-driven graceful shutdown.

use healthcheck::HealthCheckSystem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use structured_logger::{LogContext, LogOptions, Logger};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shutdown coordinator for graceful server shutdown
pub struct ShutdownCoordinator {
    /// Notifies listeners (the HTTP server) that shutdown began
    shutdown_tx: broadcast::Sender<()>,
    is_shutting_down: AtomicBool,
    /// Set once component shutdown has run
    completed: AtomicBool,
    health: Arc<HealthCheckSystem>,
    logger: Arc<Logger>,
    /// Bound on stopping the health system
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(health: Arc<HealthCheckSystem>, logger: Arc<Logger>, timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx,
            is_shutting_down: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            health,
            logger,
            timeout,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// Announce shutdown. Returns false if it was already announced.
    pub fn trigger(&self) -> bool {
        if self.is_shutting_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Initiating graceful shutdown");
        let _ = self.shutdown_tx.send(());
        true
    }

    /// Resolves once shutdown has been announced.
    pub async fn triggered(&self) {
        let mut rx = self.subscribe();
        if self.is_shutting_down() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Stop the health system and flush the logger.
    ///
    /// Runs at most once; later calls return false without doing anything.
    pub async fn shutdown(&self) -> bool {
        self.trigger();
        if self.completed.swap(true, Ordering::SeqCst) {
            return false;
        }

        if tokio::time::timeout(self.timeout, self.health.shutdown())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.timeout.as_secs_f64(),
                "Health system did not stop within the shutdown timeout"
            );
        }

        self.logger.info(
            LogContext::System,
            "Telemetry server stopped",
            LogOptions::new(),
        );
        self.logger.shutdown();

        info!("Shutdown complete");
        true
    }
}

/// Wait for SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM signal");
        }
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received SIGINT signal (Ctrl+C)"),
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
            }
        }
    }
}

#[cfg(not(unix))]
pub async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
    }
}

/// Trigger `coordinator` on the first termination signal
pub async fn setup_signal_handler(coordinator: Arc<ShutdownCoordinator>) {
    wait_for_signal().await;
    coordinator.trigger();
}
