//! Tracing bootstrap for the telemetry binaries.
//!
//! These are the crates' own diagnostics. Application log entries go through
//! the structured logger instead.

use crate::Environment;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Build the env filter: `RUST_LOG` wins, otherwise the given default level.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize tracing with a human readable layer, or JSON in production.
pub fn init(environment: Environment, default_level: &str) {
    if environment.is_production() {
        init_json(default_level);
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter(default_level))
            .init();
    }
}

/// Initialize tracing with JSON formatting.
pub fn init_json(default_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(env_filter(default_level))
        .init();
}
