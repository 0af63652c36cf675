//! Health check implementations.

use crate::config::{DatabaseSettings, HealthCheckConfig};
use crate::types::{CheckOutcome, HealthStatus};
use async_trait::async_trait;
use common::resources::{self, LoadAverage, MemorySnapshot};
use common::{Error, Result};
use serde_json::{Map, Value, json};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Health checker trait
///
/// `check` returns `Err` for failures worth retrying; a returned outcome,
/// even a critical one, is final for the cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Get the name of this checker
    fn name(&self) -> &'static str;

    /// Perform a health check
    async fn check(&self) -> Result<CheckOutcome>;

    /// Release held resources
    async fn shutdown(&self) {}
}

/// Classify an active/max connection ratio.
pub fn classify_connection_ratio(ratio: f64, warning: f64, critical: f64) -> HealthStatus {
    if ratio > critical {
        HealthStatus::Critical
    } else if ratio > warning {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// Postgres reachability and connection pressure.
pub struct DatabaseChecker {
    pool: PgPool,
    settings: DatabaseSettings,
    warning_ratio: f64,
    critical_ratio: f64,
}

impl DatabaseChecker {
    /// Create the checker; the pool connects on first use.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(settings: DatabaseSettings, warning_ratio: f64, critical_ratio: f64) -> Self {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database);

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections.max(1))
            .min_connections(0)
            .acquire_timeout(settings.acquire_timeout)
            .connect_lazy_with(options);

        Self {
            pool,
            settings,
            warning_ratio,
            critical_ratio,
        }
    }

    pub fn from_config(config: &HealthCheckConfig) -> Self {
        Self::new(
            config.database.clone(),
            config.db_connection_warning_ratio,
            config.db_connection_critical_ratio,
        )
    }

    async fn table_counts(&self) -> Map<String, Value> {
        let mut counts = Map::new();
        for table in &self.settings.key_tables {
            let sql = format!("SELECT count(*) FROM {}", quote_ident(table));
            match sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool).await {
                Ok(count) => {
                    counts.insert(table.clone(), json!(count));
                }
                Err(e) => {
                    debug!(table = %table, error = %e, "Row count unavailable");
                    counts.insert(table.clone(), Value::Null);
                }
            }
        }
        counts
    }
}

#[async_trait]
impl HealthChecker for DatabaseChecker {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn check(&self) -> Result<CheckOutcome> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database(format!("connection failed: {}", e)))?;

        let (active, max): (i64, i64) = sqlx::query_as(
            "SELECT \
               (SELECT count(*) FROM pg_stat_activity WHERE state = 'active'), \
               current_setting('max_connections')::bigint",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::database)?;

        let ratio = if max > 0 { active as f64 / max as f64 } else { 0.0 };
        let status = classify_connection_ratio(ratio, self.warning_ratio, self.critical_ratio);
        let tables = self.table_counts().await;

        let message = match status {
            HealthStatus::Healthy => "Database connection healthy".to_string(),
            _ => format!(
                "Database connection usage at {:.1}% ({}/{})",
                ratio * 100.0,
                active,
                max
            ),
        };

        Ok(CheckOutcome::new(status, message).with_metadata(json!({
            "database": self.settings.display_url(),
            "activeConnections": active,
            "maxConnections": max,
            "connectionRatio": ratio,
            "tableCounts": tables,
            "poolSize": self.pool.size(),
        })))
    }

    async fn shutdown(&self) {
        self.pool.close().await;
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Memory thresholds.
#[derive(Debug, Clone, Copy)]
pub struct MemoryThresholds {
    pub system_warning_percent: f64,
    pub system_critical_percent: f64,
    pub process_limit_bytes: u64,
    pub process_critical_percent: f64,
}

impl From<&HealthCheckConfig> for MemoryThresholds {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            system_warning_percent: config.memory_warning_percent,
            system_critical_percent: config.memory_critical_percent,
            process_limit_bytes: config.process_memory_limit,
            process_critical_percent: config.process_memory_critical_percent,
        }
    }
}

/// Classify a memory snapshot against thresholds.
pub fn classify_memory(snapshot: &MemorySnapshot, thresholds: &MemoryThresholds) -> HealthStatus {
    let system = snapshot.system_usage_percent();
    let process = snapshot.process_usage_percent(thresholds.process_limit_bytes);

    if system > thresholds.system_critical_percent || process > thresholds.process_critical_percent
    {
        HealthStatus::Critical
    } else if system > thresholds.system_warning_percent {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// Host and process memory usage.
pub struct MemoryChecker {
    thresholds: MemoryThresholds,
}

impl MemoryChecker {
    pub fn new(thresholds: MemoryThresholds) -> Self {
        Self { thresholds }
    }
}

#[async_trait]
impl HealthChecker for MemoryChecker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn check(&self) -> Result<CheckOutcome> {
        let snapshot = resources::memory_snapshot();
        let status = classify_memory(&snapshot, &self.thresholds);
        let system = snapshot.system_usage_percent();
        let process = snapshot.process_usage_percent(self.thresholds.process_limit_bytes);

        Ok(CheckOutcome::new(
            status,
            format!(
                "System memory at {:.1}%, process at {:.1}% of limit",
                system, process
            ),
        )
        .with_metadata(json!({
            "systemUsagePercent": system,
            "processUsagePercent": process,
            "memory": snapshot,
        })))
    }
}

/// Temp-file write, read back and delete.
pub struct FilesystemChecker {
    directory: PathBuf,
}

impl FilesystemChecker {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl HealthChecker for FilesystemChecker {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn check(&self) -> Result<CheckOutcome> {
        let path = self
            .directory
            .join(format!(".health-check-{}.tmp", uuid::Uuid::new_v4()));
        let payload = format!("health-check {}", chrono::Utc::now().to_rfc3339());

        tokio::fs::write(&path, payload.as_bytes()).await?;
        let read_back = tokio::fs::read(&path).await;
        let removed = tokio::fs::remove_file(&path).await;

        let read_back = read_back?;
        removed?;

        if read_back != payload.as_bytes() {
            warn!(path = %path.display(), "Filesystem check read back different content");
            return Err(Error::healthcheck("file content mismatch after read back"));
        }

        Ok(CheckOutcome::healthy("Filesystem read/write healthy").with_metadata(json!({
            "directory": self.directory.display().to_string(),
            "bytes": read_back.len(),
        })))
    }
}

/// HTTP GET against the service's own liveness endpoint.
pub struct ApiChecker {
    url: String,
    client: reqwest::Client,
}

impl ApiChecker {
    /// Create a checker for `{base_url}/health/live`.
    pub fn new(base_url: &str, timeout_duration: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout_duration)
            .build()
            .map_err(Error::http)?;

        Ok(Self {
            url: format!("{}/health/live", base_url.trim_end_matches('/')),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthChecker for ApiChecker {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn check(&self) -> Result<CheckOutcome> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::http(format!("request to {} failed: {}", self.url, e)))?;

        let status_code = response.status();
        if !status_code.is_success() {
            return Err(Error::http(format!(
                "{} returned status {}",
                self.url,
                status_code.as_u16()
            )));
        }

        debug!(url = %self.url, status = status_code.as_u16(), "API check successful");
        Ok(CheckOutcome::healthy("Internal API responding").with_metadata(json!({
            "url": self.url,
            "statusCode": status_code.as_u16(),
        })))
    }
}

/// 1-minute load as a percentage of available cores.
pub fn normalized_load_percent(load: &LoadAverage, cpu_count: usize) -> f64 {
    load.one / cpu_count.max(1) as f64 * 100.0
}

/// Classify a normalised load percentage.
pub fn classify_load(percent: f64, warning: f64, critical: f64) -> HealthStatus {
    if percent > critical {
        HealthStatus::Critical
    } else if percent > warning {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// OS load average against core count.
pub struct LoadChecker {
    warning_percent: f64,
    critical_percent: f64,
}

impl LoadChecker {
    pub fn new(warning_percent: f64, critical_percent: f64) -> Self {
        Self {
            warning_percent,
            critical_percent,
        }
    }
}

#[async_trait]
impl HealthChecker for LoadChecker {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn check(&self) -> Result<CheckOutcome> {
        let load = resources::load_average();
        let cpus = resources::cpu_count();
        let percent = normalized_load_percent(&load, cpus);
        let status = classify_load(percent, self.warning_percent, self.critical_percent);

        Ok(CheckOutcome::new(
            status,
            format!("Load average {:.2} on {} cores ({:.1}%)", load.one, cpus, percent),
        )
        .with_metadata(json!({
            "loadAverage": load,
            "cpuCount": cpus,
            "loadPercent": percent,
        })))
    }
}

/// Build the enabled built-in probes from configuration.
///
/// Must run inside a tokio runtime when the database probe is enabled.
pub fn default_checkers(config: &HealthCheckConfig) -> Result<Vec<Arc<dyn HealthChecker>>> {
    let mut checkers: Vec<Arc<dyn HealthChecker>> = Vec::new();
    if config.probes.database {
        checkers.push(Arc::new(DatabaseChecker::from_config(config)));
    }
    if config.probes.memory {
        checkers.push(Arc::new(MemoryChecker::new(MemoryThresholds::from(config))));
    }
    if config.probes.filesystem {
        checkers.push(Arc::new(FilesystemChecker::new(&config.scratch_directory)));
    }
    if config.probes.api {
        checkers.push(Arc::new(ApiChecker::new(config.api_url(), config.timeout)?));
    }
    if config.probes.load {
        checkers.push(Arc::new(LoadChecker::new(
            config.load_warning_percent,
            config.load_critical_percent,
        )));
    }
    Ok(checkers)
}
