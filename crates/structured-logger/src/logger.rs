//! The structured logger.

use crate::config::LoggerConfig;
use crate::rate_limit::RateLimiter;
use crate::sanitize::Sanitizer;
use crate::sink::{ConsoleSink, FileSink, LogSink};
use crate::types::{
    LogContext, LogEntry, LogLevel, LogOptions, PerformanceSnapshot, RiskLevel, SecurityInfo,
};
use chrono::Utc;
use common::resources::{self, CpuUsage};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error};

/// Maximum length of query text carried by database entries.
pub const MAX_QUERY_LENGTH: usize = 200;

struct TimerStart {
    started: Instant,
    cpu: CpuUsage,
}

/// Structured, sanitising, buffered logger.
///
/// Logging never fails from the caller's point of view: sink errors are
/// reported through `tracing` and the call completes.
pub struct Logger {
    config: RwLock<Arc<LoggerConfig>>,
    sanitizer: RwLock<Sanitizer>,
    sinks: RwLock<Vec<Arc<dyn LogSink>>>,
    buffer: Mutex<Vec<LogEntry>>,
    rate_limiter: RateLimiter,
    timers: DashMap<String, TimerStart>,
    correlation_id: RwLock<String>,
    shut_down: AtomicBool,
}

impl Logger {
    /// Create a logger writing to the console and file sinks.
    pub fn new(config: LoggerConfig) -> Self {
        Self::with_sinks(
            config,
            vec![Arc::new(ConsoleSink::new()), Arc::new(FileSink::new())],
        )
    }

    /// Create a logger writing to the given sinks only.
    pub fn with_sinks(config: LoggerConfig, sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self {
            sanitizer: RwLock::new(Sanitizer::new(&config.sensitive_fields)),
            config: RwLock::new(Arc::new(config)),
            sinks: RwLock::new(sinks),
            buffer: Mutex::new(Vec::new()),
            rate_limiter: RateLimiter::new(),
            timers: DashMap::new(),
            correlation_id: RwLock::new(generate_correlation_id()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn LogSink>) {
        self.sinks.write().push(sink);
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<LoggerConfig> {
        self.config.read().clone()
    }

    /// Mutate the configuration in place.
    pub fn update_config(&self, update: impl FnOnce(&mut LoggerConfig)) {
        let mut guard = self.config.write();
        let mut next = LoggerConfig::clone(&guard);
        update(&mut next);
        *self.sanitizer.write() = Sanitizer::new(&next.sensitive_fields);
        *guard = Arc::new(next);
    }

    /// Level gate: enabled and at or above the configured minimum.
    pub fn should_log(&self, level: LogLevel) -> bool {
        let config = self.config.read();
        config.enabled && level >= config.level
    }

    pub fn correlation_id(&self) -> String {
        self.correlation_id.read().clone()
    }

    pub fn set_correlation_id(&self, id: impl Into<String>) {
        *self.correlation_id.write() = id.into();
    }

    pub fn debug(&self, context: LogContext, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Debug, context, message.into(), options);
    }

    pub fn info(&self, context: LogContext, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Info, context, message.into(), options);
    }

    pub fn warn(&self, context: LogContext, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Warn, context, message.into(), options);
    }

    pub fn error(&self, context: LogContext, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Error, context, message.into(), options);
    }

    /// Log at critical level and flush the buffer immediately.
    pub fn critical(&self, context: LogContext, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Critical, context, message.into(), options);
        if self.config.read().flush_on_critical {
            self.flush();
        }
    }

    /// Log at a level chosen at runtime.
    pub fn log(
        &self,
        level: LogLevel,
        context: LogContext,
        message: impl Into<String>,
        options: LogOptions,
    ) {
        match level {
            LogLevel::Debug => self.debug(context, message, options),
            LogLevel::Info => self.info(context, message, options),
            LogLevel::Warn => self.warn(context, message, options),
            LogLevel::Error => self.error(context, message, options),
            LogLevel::Critical => self.critical(context, message, options),
        }
    }

    /// Log a completed API request; level follows the status code.
    pub fn log_api_request(
        &self,
        method: &str,
        endpoint: &str,
        status_code: u16,
        duration_ms: f64,
        options: LogOptions,
    ) {
        let level = level_for_status(status_code);
        let options = options
            .method(method)
            .endpoint(endpoint)
            .status_code(status_code)
            .duration(duration_ms);
        self.log(
            level,
            LogContext::Api,
            format!("{} {} {} - {:.2}ms", method, endpoint, status_code, duration_ms),
            options,
        );
    }

    /// Log an authentication event; failures are raised to warn.
    pub fn log_auth_event(
        &self,
        event: &str,
        user_id: Option<&str>,
        success: bool,
        options: LogOptions,
    ) {
        let mut options = options.merge_metadata(object(json!({
            "event": event,
            "success": success,
        })));
        if let Some(user_id) = user_id {
            options = options.user_id(user_id);
        }

        let level = if success { LogLevel::Info } else { LogLevel::Warn };
        self.log(
            level,
            LogContext::Auth,
            format!("Authentication event: {}", event),
            options,
        );
    }

    /// Log a database query; failures are raised to error.
    pub fn log_database_query(
        &self,
        query: &str,
        duration_ms: f64,
        success: bool,
        options: LogOptions,
    ) {
        let options = options
            .duration(duration_ms)
            .merge_metadata(object(json!({
                "query": truncate(query, MAX_QUERY_LENGTH),
                "success": success,
            })));

        let (level, message) = if success {
            (LogLevel::Debug, format!("Database query completed in {:.2}ms", duration_ms))
        } else {
            (LogLevel::Error, format!("Database query failed after {:.2}ms", duration_ms))
        };
        self.log(level, LogContext::Database, message, options);
    }

    /// Log a timed operation with a resource snapshot.
    ///
    /// No-op when performance logging is disabled.
    pub fn log_performance_metric(&self, operation: &str, duration_ms: f64, options: LogOptions) {
        if !self.config.read().enable_performance_logging {
            return;
        }

        let mut options = options.duration(duration_ms);
        let performance = options.performance.take().unwrap_or_else(|| PerformanceSnapshot {
            memory_usage: resources::memory_snapshot(),
            cpu_usage: None,
            response_time: None,
        });
        let options = options.performance(PerformanceSnapshot {
            response_time: Some(duration_ms),
            ..performance
        });

        self.info(
            LogContext::Performance,
            format!("Performance: {} completed in {:.2}ms", operation, duration_ms),
            options.merge_metadata(object(json!({ "operation": operation }))),
        );
    }

    /// Log a security event; risk picks the level (low: info, medium: warn, high: critical).
    ///
    /// No-op when security logging is disabled.
    pub fn log_security_event(&self, event: &str, risk_level: RiskLevel, options: LogOptions) {
        if !self.config.read().enable_security_logging {
            return;
        }

        let mut options = options;
        let security = options.security.take().unwrap_or_default();
        let options = options
            .security(SecurityInfo {
                suspicious: security.suspicious || risk_level != RiskLevel::Low,
                risk_level,
                ..security
            })
            .merge_metadata(object(json!({ "event": event })));

        let message = format!("Security event: {}", event);
        match risk_level {
            RiskLevel::Low => self.info(LogContext::Security, message, options),
            RiskLevel::Medium => self.warn(LogContext::Security, message, options),
            RiskLevel::High => self.critical(LogContext::Security, message, options),
        }
    }

    /// Start a timer under a caller-chosen id, replacing any timer with the same id.
    pub fn start_performance_timer(&self, id: impl Into<String>) {
        self.timers.insert(
            id.into(),
            TimerStart {
                started: Instant::now(),
                cpu: resources::cpu_usage(),
            },
        );
    }

    /// Stop a timer, log it, and return the elapsed milliseconds.
    ///
    /// Unknown ids return 0 without logging.
    pub fn end_performance_timer(&self, id: &str, operation: &str, options: LogOptions) -> f64 {
        let Some((_, start)) = self.timers.remove(id) else {
            return 0.0;
        };

        let duration_ms = start.started.elapsed().as_secs_f64() * 1000.0;
        let cpu = resources::cpu_usage().since(&start.cpu);
        let options = options.performance(PerformanceSnapshot {
            memory_usage: resources::memory_snapshot(),
            cpu_usage: Some(cpu),
            response_time: None,
        });

        self.log_performance_metric(operation, duration_ms, options);
        duration_ms
    }

    /// Number of running performance timers.
    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    /// Entries waiting in the production buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Write out all buffered entries in order.
    pub fn flush(&self) {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return;
        }
        debug!(entries = batch.len(), "Flushing log buffer");
        for entry in &batch {
            self.write(entry);
        }
        for sink in self.sinks.read().iter() {
            if let Err(e) = sink.flush() {
                error!(sink = sink.name(), error = %e, "Failed to flush log sink");
            }
        }
    }

    /// Flush remaining entries and stop buffering. Later calls are no-ops.
    pub fn shutdown(&self) {
        {
            let _buffer = self.buffer.lock();
            if self.shut_down.swap(true, Ordering::SeqCst) {
                return;
            }
        }
        self.flush();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Periodically flush the buffer until the logger is dropped or shut down.
    pub fn spawn_flush_task(self: &Arc<Self>) -> JoinHandle<()> {
        let logger: Weak<Logger> = Arc::downgrade(self);
        let period = self.config.read().flush_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // Skip first immediate tick

            loop {
                ticker.tick().await;
                let Some(logger) = logger.upgrade() else {
                    break;
                };
                if logger.is_shut_down() {
                    break;
                }
                // Sink writes are blocking I/O
                if let Err(e) = tokio::task::spawn_blocking(move || logger.flush()).await {
                    error!(error = %e, "Log flush task failed");
                }
            }
        })
    }

    fn emit(&self, level: LogLevel, context: LogContext, message: String, options: LogOptions) {
        if !self.should_log(level) {
            return;
        }

        let config = self.config();
        if config.rate_limit_enabled
            && !self.rate_limiter.allow(level, config.max_logs_per_minute)
        {
            return;
        }

        let entry = self.build_entry(&config, level, context, message, options);
        self.process(&config, entry);
    }

    fn build_entry(
        &self,
        config: &LoggerConfig,
        level: LogLevel,
        context: LogContext,
        message: String,
        options: LogOptions,
    ) -> LogEntry {
        let metadata = options
            .metadata
            .as_ref()
            .map(|value| self.sanitizer.read().sanitize(value));

        let error = options.error.map(|mut info| {
            if !config.is_development() {
                info.stack = None;
            }
            info
        });

        LogEntry {
            timestamp: Utc::now(),
            level,
            context,
            service: config.service.clone(),
            environment: config.environment,
            request_id: options.request_id,
            user_id: options.user_id,
            session_id: options.session_id,
            endpoint: options.endpoint,
            method: options.method,
            status_code: options.status_code,
            duration: options.duration,
            message,
            correlation_id: self.correlation_id(),
            trace_id: options.trace_id,
            metadata,
            error,
            performance: options
                .performance
                .filter(|_| config.enable_performance_logging),
            security: options.security.filter(|_| config.enable_security_logging),
        }
    }

    fn process(&self, config: &LoggerConfig, entry: LogEntry) {
        if !config.buffering() {
            self.write(&entry);
            return;
        }

        // The shutdown flag is only set while the buffer lock is held, so an
        // entry pushed here is always seen by the final flush.
        let mut buffer = self.buffer.lock();
        if self.is_shut_down() {
            drop(buffer);
            self.write(&entry);
            return;
        }
        buffer.push(entry);
        let should_flush = buffer.len() >= config.buffer_size.max(1);
        drop(buffer);

        if should_flush {
            self.flush();
        }
    }

    fn write(&self, entry: &LogEntry) {
        let config = self.config();
        let sinks = self.sinks.read().clone();
        for sink in sinks.iter().filter(|sink| sink.enabled(&config)) {
            if let Err(e) = sink.write(entry, &config) {
                error!(sink = sink.name(), error = %e, "Failed to write log entry");
            }
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LoggerConfig::default())
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Map an HTTP status code to a log level (5xx error, 4xx warn, else info).
pub fn level_for_status(status_code: u16) -> LogLevel {
    match status_code {
        500.. => LogLevel::Error,
        400..=499 => LogLevel::Warn,
        _ => LogLevel::Info,
    }
}

/// `{unix-millis}-{9 random alphanumerics}`
pub fn generate_correlation_id() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), token)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use common::Environment;

    fn logger(environment: Environment) -> (Logger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new(1000));
        let mut config = LoggerConfig::for_environment(environment);
        config.level = LogLevel::Debug;
        let logger = Logger::with_sinks(config, vec![sink.clone()]);
        (logger, sink)
    }

    #[test]
    fn test_level_for_status() {
        assert_eq!(level_for_status(200), LogLevel::Info);
        assert_eq!(level_for_status(302), LogLevel::Info);
        assert_eq!(level_for_status(404), LogLevel::Warn);
        assert_eq!(level_for_status(503), LogLevel::Error);
    }

    #[test]
    fn test_correlation_id_shape() {
        let id = generate_correlation_id();
        let (millis, token) = id.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(token.len(), 9);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ááááá", 2), "áá...");
    }

    #[test]
    fn test_below_minimum_level_is_dropped() {
        let (logger, sink) = logger(Environment::Development);
        logger.update_config(|c| c.level = LogLevel::Warn);

        logger.debug(LogContext::System, "hidden", LogOptions::new());
        logger.info(LogContext::System, "hidden", LogOptions::new());
        logger.warn(LogContext::System, "shown", LogOptions::new());

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "shown");
    }

    #[test]
    fn test_disabled_logger_drops_everything() {
        let (logger, sink) = logger(Environment::Development);
        logger.update_config(|c| c.enabled = false);
        logger.critical(LogContext::System, "nope", LogOptions::new());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_production_buffers_until_threshold() {
        let (logger, sink) = logger(Environment::Production);
        logger.update_config(|c| c.buffer_size = 3);

        logger.info(LogContext::Api, "one", LogOptions::new());
        logger.info(LogContext::Api, "two", LogOptions::new());
        assert!(sink.is_empty());
        assert_eq!(logger.buffered(), 2);

        logger.info(LogContext::Api, "three", LogOptions::new());
        assert_eq!(logger.buffered(), 0);
        let messages: Vec<_> = sink.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_critical_flushes_buffer() {
        let (logger, sink) = logger(Environment::Production);

        logger.info(LogContext::Payment, "queued", LogOptions::new());
        assert!(sink.is_empty());

        logger.critical(LogContext::Payment, "gateway down", LogOptions::new());
        assert_eq!(sink.len(), 2);
        assert_eq!(logger.buffered(), 0);
    }

    #[test]
    fn test_shutdown_flushes_once_and_stops_buffering() {
        let (logger, sink) = logger(Environment::Production);
        logger.info(LogContext::System, "pending", LogOptions::new());

        logger.shutdown();
        assert_eq!(sink.len(), 1);

        logger.info(LogContext::System, "after", LogOptions::new());
        assert_eq!(sink.len(), 2);
        logger.shutdown();
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_rate_limit_drops_but_never_failures() {
        let (logger, sink) = logger(Environment::Development);
        logger.update_config(|c| c.max_logs_per_minute = 3);

        for i in 0..10 {
            logger.info(LogContext::Api, format!("info {}", i), LogOptions::new());
        }
        for i in 0..10 {
            logger.error(LogContext::Api, format!("error {}", i), LogOptions::new());
        }

        let entries = sink.entries();
        let infos = entries.iter().filter(|e| e.level == LogLevel::Info).count();
        let errors = entries.iter().filter(|e| e.level == LogLevel::Error).count();
        // A minute boundary may fall inside the loop and open a second window
        assert!((3..=6).contains(&infos));
        assert_eq!(errors, 10);
    }

    #[test]
    fn test_error_stack_kept_only_in_development() {
        let mut info = crate::types::ErrorInfo::new("DbError", "timeout");
        info.stack = Some("caused by: socket closed".to_string());

        let (dev, dev_sink) = logger(Environment::Development);
        dev.error(LogContext::Database, "q", LogOptions::new().error(info.clone()));
        assert!(dev_sink.entries()[0].error.as_ref().unwrap().stack.is_some());

        let (test, test_sink) = logger(Environment::Test);
        test.error(LogContext::Database, "q", LogOptions::new().error(info));
        assert!(test_sink.entries()[0].error.as_ref().unwrap().stack.is_none());
    }
}
