//! Request performance monitoring.
//!
//! [`PerformanceMonitor`] samples requests, records duration, memory and CPU
//! deltas, keeps a bounded history and raises cooldown-limited alerts for
//! slow requests, high memory and elevated error rates. The
//! [`middleware::track_performance`] function plugs it into an axum router.

pub mod alerts;
pub mod config;
pub mod middleware;
pub mod monitor;
pub mod types;

pub use alerts::AlertCooldowns;
pub use config::PerformanceConfig;
pub use middleware::track_performance;
pub use monitor::PerformanceMonitor;
pub use types::{
    AdditionalMetrics, AlertSeverity, AlertType, CleanupStats, EndpointStats, MetricsSummary,
    PerformanceAlert, PerformanceMetrics, RequestInfo, ResponseInfo,
};
