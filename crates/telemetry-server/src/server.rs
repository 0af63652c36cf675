//! Composition root: wires the logger, health system and performance monitor
//! behind the HTTP server and drives their lifecycle.

use crate::config::Config;
use crate::http_server::{AppState, TelemetryHttpServer};
use crate::metrics::MetricsRegistry;
use crate::shutdown::{ShutdownCoordinator, setup_signal_handler};
use healthcheck::HealthCheckSystem;
use perf_monitor::PerformanceMonitor;
use std::sync::Arc;
use structured_logger::{LogContext, LogOptions, Logger};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to build component: {0}")]
    Component(#[from] common::Error),

    #[error("HTTP server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Telemetry server
pub struct TelemetryServer {
    config: Config,
    logger: Arc<Logger>,
    health: Arc<HealthCheckSystem>,
    monitor: Arc<PerformanceMonitor>,
    metrics: Arc<MetricsRegistry>,
    coordinator: Arc<ShutdownCoordinator>,
}

impl TelemetryServer {
    /// Build every component from `config`; installs the logger as the
    /// process default when none is set yet.
    pub fn new(mut config: Config) -> Result<Self, ServerError> {
        config.resolve_api_base_url();
        let logger = Arc::new(Logger::new(config.logger_config()));
        if structured_logger::set_global(logger.clone()).is_err() {
            warn!("Process logger already installed, keeping the server's own instance");
        }

        let health = Arc::new(HealthCheckSystem::new(config.health.clone(), logger.clone())?);
        Ok(Self::from_parts(config, logger, health))
    }

    /// Assemble from prebuilt components
    pub fn from_parts(config: Config, logger: Arc<Logger>, health: Arc<HealthCheckSystem>) -> Self {
        let monitor = Arc::new(PerformanceMonitor::new(
            config.performance_config(),
            logger.clone(),
        ));
        let coordinator = Arc::new(ShutdownCoordinator::new(
            health.clone(),
            logger.clone(),
            config.server.shutdown_timeout,
        ));

        Self {
            config,
            logger,
            health,
            monitor,
            metrics: Arc::new(MetricsRegistry::new()),
            coordinator,
        }
    }

    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            health: self.health.clone(),
            monitor: self.monitor.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Bind the configured address and run until SIGINT/SIGTERM
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.server.listen_addr).await?;
        tokio::spawn(setup_signal_handler(self.coordinator.clone()));
        self.run_with_listener(listener).await
    }

    /// Run on `listener` until the coordinator is triggered, then shut
    /// every component down exactly once
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let environment = self.config.environment();
        info!(
            environment = %environment,
            listen_addr = ?listener.local_addr().ok(),
            "Starting telemetry server"
        );

        let flush_task = self
            .logger
            .config()
            .buffering()
            .then(|| self.logger.spawn_flush_task());
        let cleanup_task = self.monitor.spawn_cleanup_task();

        if self.config.server.monitoring {
            self.health.start_monitoring().await;
        }

        self.logger.info(
            LogContext::System,
            "Telemetry server started",
            LogOptions::new().metadata(serde_json::json!({
                "environment": environment,
                "checks": self.health.check_names(),
            })),
        );

        let coordinator = self.coordinator.clone();
        let http = TelemetryHttpServer::new(self.app_state());
        let served = http
            .serve(listener, async move { coordinator.triggered().await })
            .await;

        cleanup_task.abort();
        self.coordinator.shutdown().await;
        if let Some(flush_task) = flush_task {
            flush_task.abort();
        }

        served?;
        info!("Telemetry server stopped");
        Ok(())
    }
}
