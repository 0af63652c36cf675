//! Performance monitoring configuration.

use common::Environment;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Performance monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub enabled: bool,

    /// Fraction of requests instrumented, 0.0 to 1.0
    pub sample_rate: f64,

    /// Requests slower than this raise a slow_request alert
    #[serde(with = "humantime_serde")]
    pub slow_request_threshold: Duration,

    /// Process resident memory, in bytes, that raises a high_memory alert
    pub memory_threshold: u64,

    /// Percent of 5xx responses in the metrics window that raises an error_rate alert
    pub error_rate_threshold: f64,

    /// Requests needed in the window before the error rate is evaluated
    pub min_requests_for_error_rate: usize,

    /// History size that triggers trimming to the newest half
    pub max_history: usize,

    /// Window used by `get_metrics` and the error-rate alert
    #[serde(with = "humantime_serde")]
    pub metrics_window: Duration,

    /// Completed requests older than this are purged by `cleanup`
    #[serde(with = "humantime_serde")]
    pub retention: Duration,

    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// Requests never ended are dropped from the active map after this
    #[serde(with = "humantime_serde")]
    pub active_request_ttl: Duration,

    /// Cooldown for critical alerts
    #[serde(with = "humantime_serde")]
    pub critical_cooldown: Duration,

    /// Cooldown for every other severity
    #[serde(with = "humantime_serde")]
    pub alert_cooldown: Duration,
}

impl PerformanceConfig {
    /// Defaults for a given environment; production samples 10% of requests.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            enabled: true,
            sample_rate: if environment.is_production() { 0.1 } else { 1.0 },
            slow_request_threshold: Duration::from_secs(2),
            memory_threshold: 100 * 1024 * 1024,
            error_rate_threshold: 5.0,
            min_requests_for_error_rate: 10,
            max_history: 1000,
            metrics_window: Duration::from_secs(15 * 60),
            retention: Duration::from_secs(60 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            active_request_ttl: Duration::from_secs(5 * 60),
            critical_cooldown: Duration::from_secs(5 * 60),
            alert_cooldown: Duration::from_secs(15 * 60),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self::for_environment(Environment::from_env())
    }
}
