//! POS telemetry server
//!
//! Hosts the structured logger, the health check system and the request
//! performance monitor behind one HTTP listener.
//!
//! # Endpoints
//!
//! - `GET /health`: run every probe and return the report (503 when critical)
//! - `GET /health/live`: liveness only
//! - `GET /health/last`: the last stored report
//! - `GET /health/metrics`: flattened health metrics
//! - `GET /metrics`: Prometheus exposition
//! - `GET /api/performance`: request performance summary

pub mod config;
pub mod http_server;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use http_server::{AppState, TelemetryHttpServer, router};
pub use metrics::MetricsRegistry;
pub use server::{ServerError, TelemetryServer};
pub use shutdown::ShutdownCoordinator;
pub use telemetry::{TelemetryGuard, init_telemetry, setup_tracing};
