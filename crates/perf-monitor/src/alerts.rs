//! Threshold alerts with per-(type, severity) cooldowns.

use crate::config::PerformanceConfig;
use crate::types::{AlertSeverity, AlertType, PerformanceAlert, PerformanceMetrics};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use structured_logger::LogLevel;
use tokio::time::Instant;

const MIB: f64 = 1024.0 * 1024.0;

/// Log level an alert is delivered at.
pub fn level_for_severity(severity: AlertSeverity) -> LogLevel {
    match severity {
        AlertSeverity::Critical => LogLevel::Critical,
        AlertSeverity::High => LogLevel::Error,
        AlertSeverity::Medium | AlertSeverity::Low => LogLevel::Warn,
    }
}

/// `base` when `value` exceeds `threshold`, `escalated` when it exceeds twice that.
fn grade(
    value: f64,
    threshold: f64,
    base: AlertSeverity,
    escalated: AlertSeverity,
) -> Option<AlertSeverity> {
    if value > threshold * 2.0 {
        Some(escalated)
    } else if value > threshold {
        Some(base)
    } else {
        None
    }
}

/// Slow request: medium, or high above twice the threshold.
pub fn slow_request_alert(
    metrics: &PerformanceMetrics,
    config: &PerformanceConfig,
) -> Option<PerformanceAlert> {
    let threshold = config.slow_request_threshold.as_secs_f64() * 1000.0;
    let severity = grade(
        metrics.duration,
        threshold,
        AlertSeverity::Medium,
        AlertSeverity::High,
    )?;

    Some(PerformanceAlert {
        alert_type: AlertType::SlowRequest,
        severity,
        message: format!(
            "Slow request: {} {} took {:.0}ms (threshold {:.0}ms)",
            metrics.method, metrics.endpoint, metrics.duration, threshold
        ),
        metrics: json!({
            "requestId": metrics.request_id,
            "endpoint": metrics.endpoint,
            "duration": metrics.duration,
            "threshold": threshold,
        }),
        timestamp: Utc::now(),
    })
}

/// High memory after the request: high, or critical above twice the threshold.
pub fn memory_alert(
    metrics: &PerformanceMetrics,
    config: &PerformanceConfig,
) -> Option<PerformanceAlert> {
    let used = metrics.memory_after.as_ref()?.rss_bytes;
    let severity = grade(
        used as f64,
        config.memory_threshold as f64,
        AlertSeverity::High,
        AlertSeverity::Critical,
    )?;

    Some(PerformanceAlert {
        alert_type: AlertType::HighMemory,
        severity,
        message: format!(
            "High memory usage: {:.1}MB after {} {} (threshold {:.1}MB)",
            used as f64 / MIB,
            metrics.method,
            metrics.endpoint,
            config.memory_threshold as f64 / MIB
        ),
        metrics: json!({
            "requestId": metrics.request_id,
            "rssBytes": used,
            "threshold": config.memory_threshold,
        }),
        timestamp: Utc::now(),
    })
}

/// Error rate over the window: high, or critical above twice the threshold.
///
/// Not evaluated until the window holds enough requests.
pub fn error_rate_alert(
    recent_requests: usize,
    server_errors: usize,
    config: &PerformanceConfig,
) -> Option<PerformanceAlert> {
    if recent_requests == 0 || recent_requests < config.min_requests_for_error_rate {
        return None;
    }

    let rate = server_errors as f64 / recent_requests as f64 * 100.0;
    let severity = grade(
        rate,
        config.error_rate_threshold,
        AlertSeverity::High,
        AlertSeverity::Critical,
    )?;

    Some(PerformanceAlert {
        alert_type: AlertType::ErrorRate,
        severity,
        message: format!(
            "High error rate: {:.1}% of {} recent requests (threshold {:.1}%)",
            rate, recent_requests, config.error_rate_threshold
        ),
        metrics: json!({
            "errorRate": rate,
            "recentRequests": recent_requests,
            "serverErrors": server_errors,
            "threshold": config.error_rate_threshold,
        }),
        timestamp: Utc::now(),
    })
}

/// Remembers when each (type, severity) pair last fired.
#[derive(Debug, Default)]
pub struct AlertCooldowns {
    last_sent: Mutex<HashMap<(AlertType, AlertSeverity), Instant>>,
}

impl AlertCooldowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cooldown that applies to `severity`.
    pub fn cooldown_for(severity: AlertSeverity, config: &PerformanceConfig) -> Duration {
        match severity {
            AlertSeverity::Critical => config.critical_cooldown,
            _ => config.alert_cooldown,
        }
    }

    /// Record `alert` and report whether it is outside its cooldown.
    pub fn try_fire(&self, alert: &PerformanceAlert, config: &PerformanceConfig, now: Instant) -> bool {
        let key = (alert.alert_type, alert.severity);
        let cooldown = Self::cooldown_for(alert.severity, config);

        let mut last_sent = self.last_sent.lock();
        if let Some(sent) = last_sent.get(&key) {
            if now.saturating_duration_since(*sent) < cooldown {
                return false;
            }
        }
        last_sent.insert(key, now);
        true
    }

    /// Drop entries whose cooldown has elapsed.
    pub fn sweep(&self, config: &PerformanceConfig, now: Instant) -> usize {
        let mut last_sent = self.last_sent.lock();
        let before = last_sent.len();
        last_sent.retain(|(_, severity), sent| {
            now.saturating_duration_since(*sent) < Self::cooldown_for(*severity, config)
        });
        before - last_sent.len()
    }

    pub fn len(&self) -> usize {
        self.last_sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.lock().is_empty()
    }
}
