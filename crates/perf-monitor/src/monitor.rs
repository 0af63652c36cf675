//! Request performance monitor.

use crate::alerts::{self, AlertCooldowns};
use crate::config::PerformanceConfig;
use crate::types::{
    AdditionalMetrics, CleanupStats, EndpointStats, MetricsSummary, PerformanceAlert,
    PerformanceMetrics, RequestInfo, ResponseInfo,
};
use chrono::Utc;
use common::resources;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use structured_logger::{LogContext, LogOptions, Logger};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Endpoints listed in `MetricsSummary::slowest_endpoints`.
pub const SLOWEST_ENDPOINTS: usize = 5;

/// Samples requests, keeps a rolling history and raises threshold alerts.
pub struct PerformanceMonitor {
    config: PerformanceConfig,
    logger: Arc<Logger>,
    active: DashMap<String, PerformanceMetrics>,
    history: Mutex<VecDeque<PerformanceMetrics>>,
    cooldowns: AlertCooldowns,
}

impl PerformanceMonitor {
    pub fn new(config: PerformanceConfig, logger: Arc<Logger>) -> Self {
        Self {
            config,
            logger,
            active: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
            cooldowns: AlertCooldowns::new(),
        }
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    fn sampled(&self) -> bool {
        let rate = self.config.sample_rate;
        rate >= 1.0 || (rate > 0.0 && rand::thread_rng().r#gen::<f64>() < rate)
    }

    /// Begin tracking a request.
    ///
    /// Returns an empty id when monitoring is disabled or the request is not
    /// sampled; pass that id to `end_request` unchanged.
    pub fn start_request(&self, info: RequestInfo) -> String {
        if !self.config.enabled || !self.sampled() {
            return String::new();
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let metrics = PerformanceMetrics {
            request_id: request_id.clone(),
            method: info.method,
            endpoint: info.path,
            start_time: Instant::now(),
            end_time: None,
            timestamp: Utc::now(),
            duration: 0.0,
            status_code: None,
            content_length: None,
            user_agent: info.user_agent,
            ip: info.ip,
            user_id: info.user_id,
            memory_before: resources::memory_snapshot(),
            memory_after: None,
            cpu_usage: None,
            cpu_before: resources::cpu_usage(),
            query_count: None,
            cache_hit: None,
            error: None,
        };
        self.active.insert(request_id.clone(), metrics);
        request_id
    }

    /// Finish a request, log it and return the alerts it raised.
    ///
    /// Unknown or empty ids are ignored.
    pub fn end_request(
        &self,
        request_id: &str,
        response: ResponseInfo,
        additional: AdditionalMetrics,
    ) -> Vec<PerformanceAlert> {
        if request_id.is_empty() {
            return Vec::new();
        }
        let Some((_, mut metrics)) = self.active.remove(request_id) else {
            debug!(request_id, "end_request for unknown request");
            return Vec::new();
        };

        let end = Instant::now();
        metrics.end_time = Some(end);
        metrics.duration = end.duration_since(metrics.start_time).as_secs_f64() * 1000.0;
        metrics.status_code = Some(response.status_code);
        metrics.content_length = response.content_length;
        metrics.memory_after = Some(resources::memory_snapshot());
        metrics.cpu_usage = Some(resources::cpu_usage().since(&metrics.cpu_before));
        metrics.query_count = additional.query_count;
        metrics.cache_hit = additional.cache_hit;
        metrics.error = additional.error;

        self.log_request(&metrics);
        self.push_history(metrics.clone());
        self.analyze(&metrics)
    }

    fn log_request(&self, metrics: &PerformanceMetrics) {
        let mut options = LogOptions::new()
            .request_id(&metrics.request_id)
            .metadata(json!({
                "contentLength": metrics.content_length,
                "ip": metrics.ip,
                "userAgent": metrics.user_agent,
                "memoryDelta": metrics.memory_after.map(|after| {
                    after.rss_bytes as i64 - metrics.memory_before.rss_bytes as i64
                }),
                "cpuMicros": metrics.cpu_usage.map(|cpu| cpu.total_micros()),
                "queryCount": metrics.query_count,
                "cacheHit": metrics.cache_hit,
                "error": metrics.error,
            }));
        if let Some(user_id) = &metrics.user_id {
            options = options.user_id(user_id);
        }

        self.logger.log_api_request(
            &metrics.method,
            &metrics.endpoint,
            metrics.status_code.unwrap_or_default(),
            metrics.duration,
            options,
        );
    }

    fn push_history(&self, metrics: PerformanceMetrics) {
        let mut history = self.history.lock();
        history.push_back(metrics);
        if history.len() > self.config.max_history {
            let keep = self.config.max_history / 2;
            let drop = history.len() - keep;
            history.drain(..drop);
        }
    }

    /// Evaluate thresholds for a finished request and log the alerts that
    /// are outside their cooldown.
    fn analyze(&self, metrics: &PerformanceMetrics) -> Vec<PerformanceAlert> {
        let (recent, errors) = self.window_counts(Instant::now());

        let candidates = [
            alerts::slow_request_alert(metrics, &self.config),
            alerts::memory_alert(metrics, &self.config),
            alerts::error_rate_alert(recent, errors, &self.config),
        ];

        let now = Instant::now();
        let fired: Vec<PerformanceAlert> = candidates
            .into_iter()
            .flatten()
            .filter(|alert| self.cooldowns.try_fire(alert, &self.config, now))
            .collect();

        for alert in &fired {
            self.logger.log(
                alerts::level_for_severity(alert.severity),
                LogContext::Performance,
                format!("Performance alert: {}", alert.message),
                LogOptions::new().metadata(json!({
                    "type": alert.alert_type,
                    "severity": alert.severity,
                    "metrics": alert.metrics,
                })),
            );
        }
        fired
    }

    fn window_start(&self, now: Instant) -> Option<Instant> {
        now.checked_sub(self.config.metrics_window)
    }

    fn in_window(metrics: &PerformanceMetrics, since: Option<Instant>) -> bool {
        match (since, metrics.end_time) {
            (Some(since), Some(end)) => end >= since,
            (None, _) => true,
            (_, None) => false,
        }
    }

    /// Requests and server errors inside the metrics window.
    fn window_counts(&self, now: Instant) -> (usize, usize) {
        let since = self.window_start(now);
        let history = self.history.lock();
        history
            .iter()
            .filter(|m| Self::in_window(m, since))
            .fold((0, 0), |(total, errors), m| {
                (total + 1, errors + usize::from(m.is_server_error()))
            })
    }

    /// Summary of the last `metrics_window` of completed requests.
    pub fn get_metrics(&self) -> MetricsSummary {
        let since = self.window_start(Instant::now());
        let history = self.history.lock();
        let recent: Vec<&PerformanceMetrics> = history
            .iter()
            .filter(|m| Self::in_window(m, since))
            .collect();

        let count = recent.len();
        let (avg_response_time, error_rate) = if count == 0 {
            (0.0, 0.0)
        } else {
            let total: f64 = recent.iter().map(|m| m.duration).sum();
            let errors = recent.iter().filter(|m| m.is_server_error()).count();
            (total / count as f64, errors as f64 / count as f64 * 100.0)
        };

        let mut by_endpoint: HashMap<&str, (f64, usize)> = HashMap::new();
        for m in &recent {
            let entry = by_endpoint.entry(m.endpoint.as_str()).or_default();
            entry.0 += m.duration;
            entry.1 += 1;
        }
        let mut slowest: Vec<EndpointStats> = by_endpoint
            .into_iter()
            .map(|(endpoint, (total, n))| EndpointStats {
                endpoint: endpoint.to_string(),
                avg_duration: total / n as f64,
                count: n,
            })
            .collect();
        slowest.sort_by(|a, b| b.avg_duration.total_cmp(&a.avg_duration));
        slowest.truncate(SLOWEST_ENDPOINTS);

        MetricsSummary {
            active_requests: self.active.len(),
            recent_requests: count,
            avg_response_time,
            error_rate,
            memory_usage: resources::memory_snapshot(),
            slowest_endpoints: slowest,
        }
    }

    pub fn active_requests(&self) -> usize {
        self.active.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// The most recent `limit` completed requests, newest first.
    pub fn recent_requests(&self, limit: usize) -> Vec<PerformanceMetrics> {
        self.history.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Purge expired history, stale active requests and elapsed cooldowns.
    pub fn cleanup(&self) -> CleanupStats {
        let now = Instant::now();

        let expired_history = match now.checked_sub(self.config.retention) {
            Some(cutoff) => {
                let mut history = self.history.lock();
                let before = history.len();
                history.retain(|m| m.end_time.is_some_and(|end| end >= cutoff));
                before - history.len()
            }
            None => 0,
        };

        let before = self.active.len();
        self.active.retain(|_, m| {
            now.saturating_duration_since(m.start_time) < self.config.active_request_ttl
        });
        let stale_active = before.saturating_sub(self.active.len());

        let expired_cooldowns = self.cooldowns.sweep(&self.config, now);

        let stats = CleanupStats {
            expired_history,
            stale_active,
            expired_cooldowns,
        };
        debug!(?stats, "Performance monitor cleanup");
        stats
    }

    /// Run `cleanup` every `cleanup_interval` until the monitor is dropped.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor: Weak<Self> = Arc::downgrade(self);
        let period = self.config.cleanup_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // Skip first immediate tick

            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                monitor.cleanup();
            }
        })
    }

    /// Measure `handler` as one request.
    ///
    /// Successful responses get `x-request-id` and `x-response-time` headers
    /// when sampled. A handler error is recorded as a 500 with its message
    /// and returned unchanged.
    pub async fn track<B, E, Fut>(&self, info: RequestInfo, handler: Fut) -> Result<http::Response<B>, E>
    where
        Fut: Future<Output = Result<http::Response<B>, E>>,
        E: Display,
    {
        let request_id = self.start_request(info);
        let started = Instant::now();

        match handler.await {
            Ok(mut response) => {
                self.end_request(
                    &request_id,
                    ResponseInfo::from_http(&response),
                    AdditionalMetrics::default(),
                );
                attach_headers(&mut response, &request_id, started.elapsed());
                Ok(response)
            }
            Err(e) => {
                self.end_request(
                    &request_id,
                    ResponseInfo::new(500),
                    AdditionalMetrics::error(e.to_string()),
                );
                Err(e)
            }
        }
    }
}

/// Add `x-request-id` and `x-response-time` to a sampled response.
pub fn attach_headers<B>(response: &mut http::Response<B>, request_id: &str, elapsed: Duration) {
    if request_id.is_empty() {
        return;
    }
    let headers = response.headers_mut();
    if let Ok(value) = http::HeaderValue::from_str(request_id) {
        headers.insert(crate::types::REQUEST_ID_HEADER, value);
    }
    let timing = format!("{:.2}ms", elapsed.as_secs_f64() * 1000.0);
    if let Ok(value) = http::HeaderValue::from_str(&timing) {
        headers.insert(crate::types::RESPONSE_TIME_HEADER, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Environment;
    use structured_logger::{LoggerConfig, MemorySink};

    fn monitor(config: PerformanceConfig) -> (PerformanceMonitor, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new(1000));
        let mut logger_config = LoggerConfig::for_environment(Environment::Test);
        logger_config.level = structured_logger::LogLevel::Debug;
        let logger = Arc::new(Logger::with_sinks(logger_config, vec![sink.clone()]));
        (PerformanceMonitor::new(config, logger), sink)
    }

    fn config() -> PerformanceConfig {
        PerformanceConfig::for_environment(Environment::Test)
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_or_unsampled_returns_empty_id() {
        let (disabled, _) = monitor(PerformanceConfig {
            enabled: false,
            ..config()
        });
        assert_eq!(disabled.start_request(RequestInfo::new("GET", "/")), "");

        let (never, _) = monitor(PerformanceConfig {
            sample_rate: 0.0,
            ..config()
        });
        assert_eq!(never.start_request(RequestInfo::new("GET", "/")), "");
        assert!(never.end_request("", ResponseInfo::new(200), AdditionalMetrics::default()).is_empty());
        assert_eq!(never.history_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_lifecycle() {
        let (monitor, sink) = monitor(config());
        let id = monitor.start_request(RequestInfo::new("POST", "/api/orders").user_id("u-7"));
        assert!(!id.is_empty());
        assert_eq!(monitor.active_requests(), 1);

        tokio::time::advance(Duration::from_millis(120)).await;
        monitor.end_request(
            &id,
            ResponseInfo {
                status_code: 201,
                content_length: Some(512),
            },
            AdditionalMetrics {
                query_count: Some(3),
                cache_hit: Some(false),
                error: None,
            },
        );

        assert_eq!(monitor.active_requests(), 0);
        let recorded = &monitor.recent_requests(1)[0];
        assert_eq!(recorded.status_code, Some(201));
        assert_eq!(recorded.query_count, Some(3));
        assert!(recorded.duration >= 120.0);

        let entry = &sink.entries()[0];
        assert_eq!(entry.status_code, Some(201));
        assert_eq!(entry.request_id.as_deref(), Some(id.as_str()));
        assert_eq!(entry.user_id.as_deref(), Some("u-7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_id_is_ignored() {
        let (monitor, sink) = monitor(config());
        assert!(monitor
            .end_request("nope", ResponseInfo::new(200), AdditionalMetrics::default())
            .is_empty());
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_trims_to_newest_half() {
        let (monitor, _) = monitor(PerformanceConfig {
            max_history: 10,
            ..config()
        });

        for i in 0..11 {
            let id = monitor.start_request(RequestInfo::new("GET", format!("/r/{}", i)));
            monitor.end_request(&id, ResponseInfo::new(200), AdditionalMetrics::default());
        }

        assert_eq!(monitor.history_len(), 5);
        let newest = monitor.recent_requests(5);
        assert_eq!(newest[0].endpoint, "/r/10");
        assert_eq!(newest[4].endpoint, "/r/6");
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_window_excludes_old_requests() {
        let (monitor, _) = monitor(config());
        let id = monitor.start_request(RequestInfo::new("GET", "/old"));
        monitor.end_request(&id, ResponseInfo::new(500), AdditionalMetrics::default());

        tokio::time::advance(Duration::from_secs(16 * 60)).await;
        let id = monitor.start_request(RequestInfo::new("GET", "/new"));
        monitor.end_request(&id, ResponseInfo::new(200), AdditionalMetrics::default());

        let metrics = monitor.get_metrics();
        assert_eq!(metrics.recent_requests, 1);
        assert_eq!(metrics.error_rate, 0.0);
        assert_eq!(metrics.slowest_endpoints[0].endpoint, "/new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_sweeps_stale_entries() {
        let (monitor, _) = monitor(config());
        let done = monitor.start_request(RequestInfo::new("GET", "/done"));
        monitor.end_request(&done, ResponseInfo::new(200), AdditionalMetrics::default());
        let _abandoned = monitor.start_request(RequestInfo::new("GET", "/abandoned"));

        tokio::time::advance(Duration::from_secs(61 * 60)).await;
        let stats = monitor.cleanup();

        assert_eq!(stats.expired_history, 1);
        assert_eq!(stats.stale_active, 1);
        assert_eq!(monitor.history_len(), 0);
        assert_eq!(monitor.active_requests(), 0);
    }

    #[test]
    fn test_attach_headers_skips_unsampled() {
        let mut response = http::Response::new(());
        attach_headers(&mut response, "", Duration::from_millis(5));
        assert!(response.headers().is_empty());

        attach_headers(&mut response, "abc", Duration::from_millis(5));
        assert_eq!(response.headers()["x-request-id"], "abc");
        assert_eq!(response.headers()["x-response-time"], "5.00ms");
    }
}
