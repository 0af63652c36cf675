//! Configuration loading and validation for the telemetry server

use common::Environment;
use healthcheck::HealthCheckConfig;
use perf_monitor::PerformanceConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use structured_logger::{LogLevel, LoggerConfig};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Overrides `APP_ENV`/`NODE_ENV` detection when set
    #[serde(default)]
    pub environment: Option<Environment>,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub health: HealthCheckConfig,

    /// Environment defaults apply when the section is absent
    #[serde(default)]
    pub performance: Option<PerformanceConfig>,

    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.server.validate()?;
        self.logging.validate()?;
        self.telemetry.validate()?;
        validate_health(&self.health)?;
        if let Some(performance) = &self.performance {
            validate_performance(performance)?;
        }
        Ok(())
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,

    /// Upper bound on component shutdown after a signal
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_shutdown_timeout")]
    pub shutdown_timeout: Duration,

    /// Start the periodic health monitor at boot
    pub monitoring: bool,
}

/// Application log settings, layered over the environment defaults
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<LogLevel>,

    pub service: Option<String>,

    pub directory: Option<PathBuf>,

    pub console: Option<bool>,

    pub file: Option<bool>,

    #[validate(range(min = 1, max = 10000))]
    pub buffer_size: Option<usize>,

    #[validate(range(min = 1))]
    pub max_logs_per_minute: Option<u32>,

    /// Default filter for the server's own tracing output
    #[validate(length(min = 1))]
    pub diagnostic_level: String,
}

/// OTLP export protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

/// OpenTelemetry export settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,

    #[validate(length(min = 1))]
    pub service_name: String,

    #[validate(custom = "validate_endpoint")]
    pub otlp_endpoint: String,

    pub protocol: OtlpProtocol,
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9090".to_string(),
            shutdown_timeout: Duration::from_secs(10),
            monitoring: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: None,
            service: None,
            directory: None,
            console: None,
            file: None,
            buffer_size: None,
            max_logs_per_minute: None,
            diagnostic_level: "info".to_string(),
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "pos-telemetry".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
            protocol: OtlpProtocol::Grpc,
        }
    }
}

// Custom validators

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.trim()
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

fn validate_shutdown_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let secs = timeout.as_secs_f64();
    if !(0.1..=300.0).contains(&secs) {
        return Err(ValidationError::new("shutdown_timeout_out_of_range"));
    }
    Ok(())
}

fn validate_endpoint(endpoint: &str) -> Result<(), ValidationError> {
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(ValidationError::new("endpoint_scheme_invalid"));
    }
    Ok(())
}

fn check(errors: &mut ValidationErrors, ok: bool, field: &'static str, code: &'static str) {
    if !ok {
        errors.add(field, ValidationError::new(code));
    }
}

fn finish(errors: ValidationErrors) -> Result<(), ValidationErrors> {
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_percent(value: f64) -> bool {
    (0.0..=100.0).contains(&value)
}

fn validate_health(config: &HealthCheckConfig) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let interval = config.interval.as_millis();
    check(&mut errors, (1_000..=3_600_000).contains(&interval), "health.interval", "interval_out_of_range");
    let timeout = config.timeout.as_millis();
    check(&mut errors, (10..=60_000).contains(&timeout), "health.timeout", "timeout_out_of_range");
    check(&mut errors, config.retries <= 10, "health.retries", "retries_out_of_range");
    check(
        &mut errors,
        is_percent(config.memory_warning_percent)
            && is_percent(config.memory_critical_percent)
            && config.memory_warning_percent < config.memory_critical_percent,
        "health.memory_warning_percent",
        "memory_thresholds_invalid",
    );
    check(
        &mut errors,
        is_percent(config.load_warning_percent)
            && config.load_warning_percent < config.load_critical_percent,
        "health.load_warning_percent",
        "load_thresholds_invalid",
    );
    check(
        &mut errors,
        config.db_connection_warning_ratio > 0.0
            && config.db_connection_warning_ratio < config.db_connection_critical_ratio
            && config.db_connection_critical_ratio <= 1.0,
        "health.db_connection_warning_ratio",
        "connection_ratios_invalid",
    );
    check(&mut errors, config.process_memory_limit > 0, "health.process_memory_limit", "must_be_positive");
    check(
        &mut errors,
        config.api_url().starts_with("http://") || config.api_url().starts_with("https://"),
        "health.api_base_url",
        "endpoint_scheme_invalid",
    );
    finish(errors)
}

fn validate_performance(config: &PerformanceConfig) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    check(
        &mut errors,
        (0.0..=1.0).contains(&config.sample_rate),
        "performance.sample_rate",
        "sample_rate_out_of_range",
    );
    check(
        &mut errors,
        !config.slow_request_threshold.is_zero(),
        "performance.slow_request_threshold",
        "must_be_positive",
    );
    check(
        &mut errors,
        config.error_rate_threshold > 0.0 && is_percent(config.error_rate_threshold),
        "performance.error_rate_threshold",
        "error_rate_out_of_range",
    );
    check(&mut errors, config.max_history >= 2, "performance.max_history", "max_history_too_small");
    check(
        &mut errors,
        !config.metrics_window.is_zero() && config.metrics_window <= config.retention,
        "performance.metrics_window",
        "window_exceeds_retention",
    );
    check(
        &mut errors,
        !config.cleanup_interval.is_zero(),
        "performance.cleanup_interval",
        "must_be_positive",
    );
    finish(errors)
}

// Configuration loading implementation

impl Config {
    /// Load from the default search paths, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::read_file(&path)?
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env();
        config.resolve_api_base_url();
        config.validate()?;
        Ok(config)
    }

    /// Load a specific file, then apply environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path.as_ref())?;
        config.apply_env();
        config.resolve_api_base_url();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate YAML without consulting the environment
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(contents)?;
        config.resolve_api_base_url();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/pos-telemetry/telemetry.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./telemetry.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/pos-telemetry/telemetry.yaml"))
    }

    /// Apply process environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
        self.health.apply_env();
    }

    /// Apply `APP_ENV`/`NODE_ENV`, `LOG_LEVEL`, `LOG_DIR` and
    /// `OTEL_EXPORTER_OTLP_ENDPOINT` from `lookup`. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(environment) = lookup("APP_ENV")
            .or_else(|| lookup("NODE_ENV"))
            .and_then(|value| value.parse().ok())
        {
            self.environment = Some(environment);
        }
        if let Some(level) = lookup("LOG_LEVEL").and_then(|value| value.parse().ok()) {
            self.logging.level = Some(level);
        }
        if let Some(directory) = lookup("LOG_DIR") {
            self.logging.directory = Some(PathBuf::from(directory));
        }
        if let Some(endpoint) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
            self.telemetry.otlp_endpoint = endpoint;
        }
    }

    /// Point the internal API probe at this server's own listener when no
    /// base URL is configured. Wildcard binds are reached over loopback.
    pub fn resolve_api_base_url(&mut self) {
        if self.health.api_base_url.is_some() {
            return;
        }
        if let Some(url) = self.self_url() {
            self.health.api_base_url = Some(url);
        }
    }

    fn self_url(&self) -> Option<String> {
        let mut addr: SocketAddr = self.server.listen_addr.parse().ok()?;
        if addr.ip().is_unspecified() {
            let loopback = match addr.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            };
            addr.set_ip(loopback);
        }
        Some(format!("http://{addr}"))
    }

    /// Effective deployment environment
    pub fn environment(&self) -> Environment {
        self.environment.unwrap_or_else(Environment::from_env)
    }

    /// Logger configuration: environment defaults with the `logging` section on top
    pub fn logger_config(&self) -> LoggerConfig {
        let mut config = LoggerConfig::for_environment(self.environment());
        let logging = &self.logging;

        if let Some(level) = logging.level {
            config.level = level;
        }
        if let Some(service) = &logging.service {
            config.service = service.clone();
        }
        if let Some(directory) = &logging.directory {
            config.log_directory = directory.clone();
        }
        if let Some(console) = logging.console {
            config.enable_console = console;
        }
        if let Some(file) = logging.file {
            config.enable_file_logging = file;
        }
        if let Some(buffer_size) = logging.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(max) = logging.max_logs_per_minute {
            config.max_logs_per_minute = max;
        }
        config
    }

    /// Performance configuration, defaulted from the environment when absent
    pub fn performance_config(&self) -> PerformanceConfig {
        self.performance
            .clone()
            .unwrap_or_else(|| PerformanceConfig::for_environment(self.environment()))
    }
}
