//! System health checks for the POS service.
//!
//! A [`HealthCheckSystem`] runs a battery of independent probes
//! concurrently and folds their results into one [`SystemHealthReport`]:
//! - Database reachability and connection pressure (Postgres)
//! - Host and process memory
//! - Filesystem write/read round trip
//! - Internal API liveness
//! - OS load normalised by core count
//!
//! Every probe attempt is bounded by a timeout and retried with linear
//! backoff. A probe that keeps failing yields a critical result instead of
//! an error, so a health run always completes.
//!
//! # Example
//!
//! ```no_run
//! use healthcheck::{HealthCheckConfig, HealthCheckSystem};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let logger = structured_logger::global();
//! let system = Arc::new(HealthCheckSystem::new(HealthCheckConfig::from_env(), logger)?);
//! system.start_monitoring().await;
//!
//! let healthy = system.is_healthy().await;
//! let report = system.get_last_report().await;
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod checkers;
pub mod config;
pub mod executor;
pub mod scheduler;
pub mod system;
pub mod types;

pub use checkers::{
    ApiChecker, DatabaseChecker, FilesystemChecker, HealthChecker, LoadChecker, MemoryChecker,
};
pub use config::{DEFAULT_API_BASE_URL, DatabaseSettings, HealthCheckConfig, ProbeToggles};
pub use executor::{RetryPolicy, execute_check};
pub use scheduler::RepeatingTask;
pub use system::HealthCheckSystem;
pub use types::{
    CheckOutcome, HealthCheckResult, HealthMetrics, HealthStatus, StatusSummary,
    SystemHealthReport, SystemInfo, aggregate_status,
};
