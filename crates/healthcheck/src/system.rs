//! Health check orchestration and monitoring.

use crate::checkers::{self, HealthChecker};
use crate::config::HealthCheckConfig;
use crate::executor::{RetryPolicy, execute_check};
use crate::scheduler::RepeatingTask;
use crate::types::{HealthMetrics, HealthRunStats, HealthStatus, SystemHealthReport, SystemInfo};
use common::Result;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use structured_logger::{LogContext, LogOptions, Logger};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

/// Runs the probe battery, keeps the latest report and drives periodic monitoring.
pub struct HealthCheckSystem {
    config: HealthCheckConfig,
    checkers: Vec<Arc<dyn HealthChecker>>,
    logger: Arc<Logger>,
    started: Instant,
    last_report: RwLock<Option<SystemHealthReport>>,
    stats: Mutex<HealthRunStats>,
    monitor: RepeatingTask,
    shut_down: AtomicBool,
}

impl HealthCheckSystem {
    /// Create a system with the built-in probes enabled in `config`.
    pub fn new(config: HealthCheckConfig, logger: Arc<Logger>) -> Result<Self> {
        let checkers = checkers::default_checkers(&config)?;
        Ok(Self::with_checkers(config, checkers, logger))
    }

    /// Create a system running exactly `checkers`.
    pub fn with_checkers(
        config: HealthCheckConfig,
        checkers: Vec<Arc<dyn HealthChecker>>,
        logger: Arc<Logger>,
    ) -> Self {
        let monitor = RepeatingTask::new("health-monitor", config.interval);
        Self {
            config,
            checkers,
            logger,
            started: Instant::now(),
            last_report: RwLock::new(None),
            stats: Mutex::new(HealthRunStats::default()),
            monitor,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Names of the configured probes, in report order.
    pub fn check_names(&self) -> Vec<&'static str> {
        self.checkers.iter().map(|c| c.name()).collect()
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.config.timeout,
            retries: self.config.retries,
            backoff: self.config.retry_backoff,
        }
    }

    /// Milliseconds since creation.
    pub fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Run every probe concurrently and store the resulting report.
    ///
    /// Probe failures are folded into the report; this never fails.
    pub async fn run_health_checks(&self) -> SystemHealthReport {
        let run_start = Instant::now();
        let policy = self.policy();

        let checks = join_all(
            self.checkers
                .iter()
                .map(|checker| execute_check(checker.as_ref(), policy)),
        )
        .await;

        let report = SystemHealthReport::new(checks, self.uptime_ms(), SystemInfo::collect());
        let run_time_ms = run_start.elapsed().as_secs_f64() * 1000.0;

        self.stats.lock().update(&report, run_time_ms);
        self.log_report(&report, run_time_ms);
        *self.last_report.write().await = Some(report.clone());

        report
    }

    fn log_report(&self, report: &SystemHealthReport, run_time_ms: f64) {
        let failing: Vec<_> = report
            .checks
            .iter()
            .filter(|c| !c.is_healthy())
            .map(|c| json!({"name": c.name, "status": c.status, "message": c.message, "error": c.error}))
            .collect();

        let options = LogOptions::new().duration(run_time_ms).metadata(json!({
            "overallStatus": report.overall_status,
            "summary": report.summary,
            "failingChecks": failing,
        }));

        match report.overall_status {
            HealthStatus::Critical => {
                self.logger
                    .critical(LogContext::System, "System health check failed", options)
            }
            HealthStatus::Warning => {
                self.logger
                    .warn(LogContext::System, "System health check has warnings", options)
            }
            HealthStatus::Healthy | HealthStatus::Unknown => {
                self.logger
                    .info(LogContext::System, "System health check passed", options)
            }
        }

        debug!(
            status = %report.overall_status,
            checks = report.summary.total,
            duration_ms = run_time_ms,
            "Health check cycle finished"
        );
    }

    /// Run one check now, then every `interval`. Returns false if already monitoring.
    pub async fn start_monitoring(self: &Arc<Self>) -> bool {
        if self.shut_down.load(Ordering::SeqCst) {
            return false;
        }

        let system: Weak<Self> = Arc::downgrade(self);
        let started = self.monitor.start(move || {
            let system = system.clone();
            async move {
                if let Some(system) = system.upgrade() {
                    system.run_health_checks().await;
                }
            }
        });
        if !started {
            return false;
        }

        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            checks = self.checkers.len(),
            "Health monitoring started"
        );
        self.run_health_checks().await;
        true
    }

    /// Stop periodic monitoring. Returns false if it was not running.
    pub fn stop_monitoring(&self) -> bool {
        let stopped = self.monitor.stop();
        if stopped {
            info!("Health monitoring stopped");
        }
        stopped
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    /// Most recent report, if any run has completed.
    pub async fn get_last_report(&self) -> Option<SystemHealthReport> {
        self.last_report.read().await.clone()
    }

    /// Whether the last report is healthy. False before the first run.
    pub async fn is_healthy(&self) -> bool {
        self.last_report
            .read()
            .await
            .as_ref()
            .is_some_and(|r| r.is_healthy())
    }

    /// Flattened metrics for dashboards.
    pub async fn get_metrics(&self) -> HealthMetrics {
        let report = self.last_report.read().await;
        let runs = *self.stats.lock();

        match report.as_ref() {
            Some(report) => {
                let avg_check_duration = if report.checks.is_empty() {
                    0.0
                } else {
                    report.checks.iter().map(|c| c.duration).sum::<f64>()
                        / report.checks.len() as f64
                };
                HealthMetrics {
                    overall_status: Some(report.overall_status),
                    last_check: Some(report.timestamp),
                    uptime: self.uptime_ms(),
                    total_checks: report.summary.total,
                    healthy_checks: report.summary.healthy,
                    warning_checks: report.summary.warning,
                    critical_checks: report.summary.critical,
                    unknown_checks: report.summary.unknown,
                    avg_check_duration,
                    memory_usage_percent: report.system_info.memory.system_usage_percent(),
                    load_average: report.system_info.load_average.one,
                    monitoring: self.is_monitoring(),
                    runs,
                }
            }
            None => HealthMetrics {
                overall_status: None,
                last_check: None,
                uptime: self.uptime_ms(),
                total_checks: 0,
                healthy_checks: 0,
                warning_checks: 0,
                critical_checks: 0,
                unknown_checks: 0,
                avg_check_duration: 0.0,
                memory_usage_percent: 0.0,
                load_average: 0.0,
                monitoring: self.is_monitoring(),
                runs,
            },
        }
    }

    /// Stop monitoring and release probe resources. Later calls are no-ops.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.monitor.stop_and_wait().await;
        join_all(self.checkers.iter().map(|c| c.shutdown())).await;
        info!("Health check system shut down");
    }
}
