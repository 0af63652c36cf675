//! Structured logging for the POS service.
//!
//! Every entry is a [`LogEntry`] carrying level, functional context,
//! correlation id and optional request, error, performance and security
//! details. Metadata is sanitised before it reaches a sink, non-failure
//! levels are rate limited per minute, and production output is buffered
//! and flushed in batches.
//!
//! # Example
//!
//! ```no_run
//! use structured_logger::{LogContext, LogOptions, Logger, LoggerConfig};
//! use serde_json::json;
//!
//! let logger = Logger::new(LoggerConfig::default());
//! logger.info(
//!     LogContext::Payment,
//!     "Payment captured",
//!     LogOptions::new()
//!         .request_id("req-42")
//!         .metadata(json!({"order_id": 42, "card_token": "tok_abc"})),
//! );
//! logger.log_api_request("POST", "/api/orders", 201, 35.2, LogOptions::new());
//! logger.shutdown();
//! ```

pub mod config;
pub mod format;
pub mod logger;
pub mod rate_limit;
pub mod sanitize;
pub mod sink;
pub mod types;

pub use config::LoggerConfig;
pub use logger::Logger;
pub use sanitize::Sanitizer;
pub use sink::{ConsoleSink, FileSink, LogSink, MemorySink};
pub use types::{
    ErrorInfo, LogContext, LogEntry, LogLevel, LogOptions, PerformanceSnapshot, RiskLevel,
    SecurityInfo,
};

use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Arc<Logger>> = OnceLock::new();

/// Process-wide logger, created from environment defaults on first use.
pub fn global() -> Arc<Logger> {
    GLOBAL
        .get_or_init(|| Arc::new(Logger::default()))
        .clone()
}

/// Install the process-wide logger.
///
/// Returns the logger back if one is already installed.
pub fn set_global(logger: Arc<Logger>) -> Result<(), Arc<Logger>> {
    GLOBAL.set(logger)
}
