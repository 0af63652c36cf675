//! Health check configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Postgres connection settings for the database probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,

    /// Pool size for probe connections
    pub max_connections: u32,

    /// Bound on waiting for a pooled connection
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Tables whose row counts are reported
    pub key_tables: Vec<String>,
}

impl DatabaseSettings {
    /// Read `POSTGRES_*` variables over the defaults.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env();
        settings
    }

    /// Override fields from `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_USER`,
    /// `POSTGRES_PASSWORD` and `POSTGRES_DATABASE` (or `POSTGRES_DB`).
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("POSTGRES_HOST") {
            self.host = host;
        }
        if let Some(port) = std::env::var("POSTGRES_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.port = port;
        }
        if let Ok(user) = std::env::var("POSTGRES_USER") {
            self.user = user;
        }
        if let Ok(password) = std::env::var("POSTGRES_PASSWORD") {
            self.password = password;
        }
        if let Ok(database) =
            std::env::var("POSTGRES_DATABASE").or_else(|_| std::env::var("POSTGRES_DB"))
        {
            self.database = database;
        }
    }

    /// Connection URL without the password, for logs.
    pub fn display_url(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "pos".to_string(),
            max_connections: 2,
            acquire_timeout: Duration::from_secs(5),
            key_tables: vec![
                "orders".to_string(),
                "customers".to_string(),
                "products".to_string(),
            ],
        }
    }
}

/// Which built-in probes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeToggles {
    pub database: bool,
    pub memory: bool,
    pub filesystem: bool,
    pub api: bool,
    pub load: bool,
}

impl Default for ProbeToggles {
    fn default() -> Self {
        Self {
            database: true,
            memory: true,
            filesystem: true,
            api: true,
            load: true,
        }
    }
}

/// Internal API base URL used when none is configured
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:9090";

/// Health check configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Interval between monitoring cycles
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Timeout for a single probe attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Extra attempts after the first failure
    pub retries: u32,

    /// Backoff unit; attempt `n` waits `n * retry_backoff`
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// Host memory usage percent thresholds
    pub memory_warning_percent: f64,
    pub memory_critical_percent: f64,

    /// Process memory budget and the percent of it that is critical
    pub process_memory_limit: u64,
    pub process_memory_critical_percent: f64,

    /// Normalised 1-minute load percent thresholds
    pub load_warning_percent: f64,
    pub load_critical_percent: f64,

    /// Active/max connection ratios
    pub db_connection_warning_ratio: f64,
    pub db_connection_critical_ratio: f64,

    /// Directory used by the filesystem probe
    pub scratch_directory: PathBuf,

    /// Base URL of the internal API; the probe requests `{base}/health/live`.
    /// Unset means [`DEFAULT_API_BASE_URL`] unless the embedding server fills it in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    pub database: DatabaseSettings,

    pub probes: ProbeToggles,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            retries: 2,
            retry_backoff: Duration::from_secs(1),
            memory_warning_percent: 85.0,
            memory_critical_percent: 95.0,
            process_memory_limit: 1024 * 1024 * 1024,
            process_memory_critical_percent: 90.0,
            load_warning_percent: 80.0,
            load_critical_percent: 95.0,
            db_connection_warning_ratio: 0.80,
            db_connection_critical_ratio: 0.95,
            scratch_directory: std::env::temp_dir(),
            api_base_url: None,
            database: DatabaseSettings::default(),
            probes: ProbeToggles::default(),
        }
    }
}

impl HealthCheckConfig {
    /// Defaults with `POSTGRES_*` and `NEXT_PUBLIC_API_URL` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        self.database.apply_env();
        if let Ok(url) = std::env::var("NEXT_PUBLIC_API_URL") {
            self.api_base_url = Some(url);
        }
    }

    /// Base URL the API probe targets
    pub fn api_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }
}
