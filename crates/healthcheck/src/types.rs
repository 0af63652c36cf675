//! Health check types and structures.

use chrono::{DateTime, Utc};
use common::resources::{LoadAverage, MemorySnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is healthy
    Healthy,
    /// Component works but crossed a warning threshold
    Warning,
    /// Component is failing
    Critical,
    /// Status could not be determined
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }

    /// Numeric severity for gauges (healthy 0, warning 1, critical 2, unknown 3).
    pub fn severity(&self) -> i64 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
            HealthStatus::Unknown => 3,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worst status among `statuses`: critical, then warning, otherwise healthy.
///
/// Unknown results do not degrade the overall status.
pub fn aggregate_status<I>(statuses: I) -> HealthStatus
where
    I: IntoIterator<Item = HealthStatus>,
{
    let mut overall = HealthStatus::Healthy;
    for status in statuses {
        match status {
            HealthStatus::Critical => return HealthStatus::Critical,
            HealthStatus::Warning => overall = HealthStatus::Warning,
            HealthStatus::Healthy | HealthStatus::Unknown => {}
        }
    }
    overall
}

/// What a probe reports when it completes.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub status: HealthStatus,
    pub message: String,
    pub metadata: Option<Value>,
}

impl CheckOutcome {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Healthy, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Warning, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Critical, message)
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Health check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    /// Milliseconds, including retries and backoff
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Last error when every attempt failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthCheckResult {
    /// Check if the result is healthy
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Number of results per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
    pub unknown: usize,
}

impl StatusSummary {
    pub fn from_results(results: &[HealthCheckResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Warning => summary.warning += 1,
                HealthStatus::Critical => summary.critical += 1,
                HealthStatus::Unknown => summary.unknown += 1,
            }
        }
        summary
    }
}

/// Host and runtime description attached to every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Crate name and version of the reporting service
    pub version: String,
    pub platform: String,
    pub arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub cpu_count: usize,
    pub memory: MemorySnapshot,
    pub load_average: LoadAverage,
}

impl SystemInfo {
    /// Snapshot the current host.
    pub fn collect() -> Self {
        Self {
            version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            platform: common::resources::os_description(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: common::resources::host_name(),
            cpu_count: common::resources::cpu_count(),
            memory: common::resources::memory_snapshot(),
            load_average: common::resources::load_average(),
        }
    }
}

/// Aggregate of one monitoring cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthReport {
    pub overall_status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the health system was created
    pub uptime: u64,
    pub checks: Vec<HealthCheckResult>,
    pub summary: StatusSummary,
    pub system_info: SystemInfo,
}

impl SystemHealthReport {
    /// Build a report, deriving overall status and summary from `checks`.
    pub fn new(checks: Vec<HealthCheckResult>, uptime: u64, system_info: SystemInfo) -> Self {
        Self {
            overall_status: aggregate_status(checks.iter().map(|c| c.status)),
            timestamp: Utc::now(),
            uptime,
            summary: StatusSummary::from_results(&checks),
            checks,
            system_info,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.overall_status == HealthStatus::Healthy
    }

    pub fn check(&self, name: &str) -> Option<&HealthCheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Running statistics over monitoring cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthRunStats {
    /// Total cycles performed
    pub total_runs: u64,

    /// Cycles whose overall status was healthy
    pub healthy_runs: u64,

    /// Average cycle duration (milliseconds)
    pub avg_run_time_ms: f64,

    /// Current consecutive non-healthy cycles
    pub consecutive_failures: u32,
}

impl HealthRunStats {
    /// Update stats with a finished cycle
    pub fn update(&mut self, report: &SystemHealthReport, run_time_ms: f64) {
        self.total_runs += 1;

        if report.is_healthy() {
            self.healthy_runs += 1;
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }

        self.avg_run_time_ms = (self.avg_run_time_ms * (self.total_runs - 1) as f64
            + run_time_ms)
            / self.total_runs as f64;
    }
}

/// Flattened view of the last report for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    /// `None` before the first run
    pub overall_status: Option<HealthStatus>,
    pub last_check: Option<DateTime<Utc>>,
    /// Milliseconds since the health system was created
    pub uptime: u64,
    pub total_checks: usize,
    pub healthy_checks: usize,
    pub warning_checks: usize,
    pub critical_checks: usize,
    pub unknown_checks: usize,
    /// Mean probe duration in the last report (milliseconds)
    pub avg_check_duration: f64,
    pub memory_usage_percent: f64,
    pub load_average: f64,
    pub monitoring: bool,
    pub runs: HealthRunStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, status: HealthStatus, duration: f64) -> HealthCheckResult {
        HealthCheckResult {
            name: name.to_string(),
            status,
            message: String::new(),
            duration,
            timestamp: Utc::now(),
            metadata: None,
            error: None,
        }
    }

    #[test]
    fn test_aggregate_status() {
        use HealthStatus::*;
        assert_eq!(aggregate_status([Healthy, Warning, Healthy]), Warning);
        assert_eq!(aggregate_status([Warning, Critical, Healthy]), Critical);
        assert_eq!(aggregate_status([Healthy, Healthy, Healthy]), Healthy);
        assert_eq!(aggregate_status([Healthy, Unknown]), Healthy);
        assert_eq!(aggregate_status(std::iter::empty()), Healthy);
    }

    #[test]
    fn test_summary_counts() {
        let checks = vec![
            result("database", HealthStatus::Healthy, 3.0),
            result("memory", HealthStatus::Warning, 1.0),
            result("filesystem", HealthStatus::Critical, 2.0),
            result("api", HealthStatus::Unknown, 0.0),
        ];
        let summary = StatusSummary::from_results(&checks);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.healthy, 1);
        assert_eq!(summary.warning, 1);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.unknown, 1);
    }

    #[test]
    fn test_report_derives_overall_status() {
        let checks = vec![
            result("database", HealthStatus::Healthy, 3.0),
            result("memory", HealthStatus::Warning, 1.0),
        ];
        let report = SystemHealthReport::new(checks, 10, SystemInfo::collect());
        assert_eq!(report.overall_status, HealthStatus::Warning);
        assert!(!report.is_healthy());
        assert_eq!(report.check("memory").unwrap().status, HealthStatus::Warning);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&HealthStatus::Critical).unwrap(), "\"critical\"");
        assert_eq!(HealthStatus::Warning.to_string(), "warning");
    }

    #[test]
    fn test_run_stats_update() {
        let mut stats = HealthRunStats::default();
        let healthy = SystemHealthReport::new(
            vec![result("memory", HealthStatus::Healthy, 1.0)],
            0,
            SystemInfo::collect(),
        );
        let critical = SystemHealthReport::new(
            vec![result("memory", HealthStatus::Critical, 1.0)],
            0,
            SystemInfo::collect(),
        );

        stats.update(&healthy, 10.0);
        stats.update(&critical, 30.0);

        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.healthy_runs, 1);
        assert_eq!(stats.consecutive_failures, 1);
        assert_eq!(stats.avg_run_time_ms, 20.0);
    }
}
