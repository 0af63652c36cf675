//! Prometheus metrics for the telemetry server.

use healthcheck::{HealthMetrics, SystemHealthReport};
use perf_monitor::MetricsSummary;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

/// Labels for served HTTP requests
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub method: String,
    /// Status class (2xx, 4xx, 5xx)
    pub status: String,
}

/// Labels for per-probe metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CheckLabels {
    pub check: String,
}

type FloatGauge = Gauge<f64, AtomicU64>;

/// Metrics registry with all telemetry server metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    // HTTP
    http_requests_total: Family<RequestLabels, Counter>,
    http_request_duration_seconds: Histogram,

    // Health
    /// 0=healthy, 1=warning, 2=critical, 3=unknown
    health_check_status: Family<CheckLabels, Gauge>,
    health_check_duration_seconds: Family<CheckLabels, FloatGauge>,
    health_overall_status: Gauge,
    health_runs: Gauge,
    health_consecutive_failures: Gauge,

    // Performance
    perf_active_requests: Gauge,
    perf_recent_requests: Gauge,
    perf_error_rate_percent: FloatGauge,
    perf_avg_response_time_seconds: FloatGauge,
    process_resident_memory_bytes: Gauge,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "pos_http_requests",
            "HTTP requests served by status class",
            http_requests_total.clone(),
        );

        // Exponential buckets from 1ms to ~8s
        let http_request_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 14));
        registry.register(
            "pos_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let health_check_status = Family::<CheckLabels, Gauge>::default();
        registry.register(
            "pos_health_check_status",
            "Probe status (0=healthy, 1=warning, 2=critical, 3=unknown)",
            health_check_status.clone(),
        );

        let health_check_duration_seconds = Family::<CheckLabels, FloatGauge>::default();
        registry.register(
            "pos_health_check_duration_seconds",
            "Probe duration in the last health run",
            health_check_duration_seconds.clone(),
        );

        let health_overall_status = Gauge::default();
        registry.register(
            "pos_health_overall_status",
            "Overall status of the last health run",
            health_overall_status.clone(),
        );

        let health_runs = Gauge::default();
        registry.register(
            "pos_health_runs",
            "Health runs performed since start",
            health_runs.clone(),
        );

        let health_consecutive_failures = Gauge::default();
        registry.register(
            "pos_health_consecutive_failures",
            "Consecutive health runs that were not healthy",
            health_consecutive_failures.clone(),
        );

        let perf_active_requests = Gauge::default();
        registry.register(
            "pos_active_requests",
            "Sampled requests currently in flight",
            perf_active_requests.clone(),
        );

        let perf_recent_requests = Gauge::default();
        registry.register(
            "pos_recent_requests",
            "Sampled requests completed in the metrics window",
            perf_recent_requests.clone(),
        );

        let perf_error_rate_percent = FloatGauge::default();
        registry.register(
            "pos_error_rate_percent",
            "Percent of recent sampled requests answered with 5xx",
            perf_error_rate_percent.clone(),
        );

        let perf_avg_response_time_seconds = FloatGauge::default();
        registry.register(
            "pos_avg_response_time_seconds",
            "Mean response time of recent sampled requests",
            perf_avg_response_time_seconds.clone(),
        );

        let process_resident_memory_bytes = Gauge::default();
        registry.register(
            "pos_process_resident_memory_bytes",
            "Resident set size of the server process",
            process_resident_memory_bytes.clone(),
        );

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            health_check_status,
            health_check_duration_seconds,
            health_overall_status,
            health_runs,
            health_consecutive_failures,
            perf_active_requests,
            perf_recent_requests,
            perf_error_rate_percent,
            perf_avg_response_time_seconds,
            process_resident_memory_bytes,
        }
    }

    /// Record a served HTTP request
    pub fn record_request(&self, method: &str, status_code: u16, duration: Duration) {
        self.http_requests_total
            .get_or_create(&RequestLabels {
                method: method.to_string(),
                status: status_class(status_code).to_string(),
            })
            .inc();
        self.http_request_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Update probe gauges from a health report
    pub fn record_health_report(&self, report: &SystemHealthReport) {
        for check in &report.checks {
            let labels = CheckLabels {
                check: check.name.clone(),
            };
            self.health_check_status
                .get_or_create(&labels)
                .set(check.status.severity());
            self.health_check_duration_seconds
                .get_or_create(&labels)
                .set(check.duration / 1000.0);
        }
        self.health_overall_status
            .set(report.overall_status.severity());
    }

    /// Update run counters from the health metrics view
    pub fn record_health_metrics(&self, metrics: &HealthMetrics) {
        self.health_runs.set(metrics.runs.total_runs as i64);
        self.health_consecutive_failures
            .set(metrics.runs.consecutive_failures as i64);
    }

    /// Update performance gauges from a monitor summary
    pub fn record_performance(&self, summary: &MetricsSummary) {
        self.perf_active_requests.set(summary.active_requests as i64);
        self.perf_recent_requests.set(summary.recent_requests as i64);
        self.perf_error_rate_percent.set(summary.error_rate);
        self.perf_avg_response_time_seconds
            .set(summary.avg_response_time / 1000.0);
        self.process_resident_memory_bytes
            .set(summary.memory_usage.rss_bytes as i64);
    }

    /// Encode the registry in Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn status_class(status_code: u16) -> &'static str {
    match status_code {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use healthcheck::{HealthCheckResult, HealthStatus, SystemInfo};

    fn result(name: &str, status: HealthStatus, duration: f64) -> HealthCheckResult {
        HealthCheckResult {
            name: name.to_string(),
            status,
            message: String::new(),
            duration,
            timestamp: chrono::Utc::now(),
            metadata: None,
            error: None,
        }
    }

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(204), "2xx");
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(503), "5xx");
    }

    #[test]
    fn test_record_request_encodes() {
        let registry = MetricsRegistry::new();
        registry.record_request("GET", 200, Duration::from_millis(12));
        registry.record_request("GET", 200, Duration::from_millis(8));
        registry.record_request("POST", 500, Duration::from_millis(40));

        let text = registry.encode().unwrap();
        assert!(text.contains(r#"pos_http_requests_total{method="GET",status="2xx"} 2"#));
        assert!(text.contains(r#"pos_http_requests_total{method="POST",status="5xx"} 1"#));
        assert!(text.contains("pos_http_request_duration_seconds_count 3"));
    }

    #[test]
    fn test_record_health_report() {
        let registry = MetricsRegistry::new();
        let report = SystemHealthReport::new(
            vec![
                result("database", HealthStatus::Critical, 250.0),
                result("memory", HealthStatus::Healthy, 1.0),
            ],
            1000,
            SystemInfo::collect(),
        );
        registry.record_health_report(&report);

        let text = registry.encode().unwrap();
        assert!(text.contains(r#"pos_health_check_status{check="database"} 2"#));
        assert!(text.contains(r#"pos_health_check_status{check="memory"} 0"#));
        assert!(text.contains("pos_health_overall_status 2"));
    }
}
