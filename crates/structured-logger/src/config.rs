//! Logger configuration.

use crate::types::LogLevel;
use common::Environment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Keys whose values never reach a sink in clear text.
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "key",
    "authorization",
    "credit_card",
    "cvv",
    "email",
];

/// Process-wide logger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Master switch
    pub enabled: bool,

    /// Minimum level that reaches a sink
    pub level: LogLevel,

    pub environment: Environment,

    /// Service identifier stamped on every entry and used in file names
    pub service: String,

    pub enable_console: bool,
    pub enable_file_logging: bool,
    pub enable_performance_logging: bool,
    pub enable_security_logging: bool,

    /// Directory receiving `{service}-{level}-{date}.log` files
    pub log_directory: PathBuf,

    /// Rotation limits (informational, rotation is left to the host)
    pub max_file_size: u64,
    pub max_files: u32,

    /// Lowercase substrings marking a metadata key as sensitive
    pub sensitive_fields: Vec<String>,

    pub rate_limit_enabled: bool,
    /// Per level, per calendar minute
    pub max_logs_per_minute: u32,

    /// Buffered entries that trigger a flush (production only)
    pub buffer_size: usize,

    /// Flush the buffer right after a critical entry
    pub flush_on_critical: bool,

    /// Period of the optional background flush task
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
}

impl LoggerConfig {
    /// Defaults for a given environment.
    ///
    /// Production logs info and above to console and file with buffering;
    /// development logs everything to the console; test keeps the console quiet.
    pub fn for_environment(environment: Environment) -> Self {
        let (level, enable_console, enable_file_logging) = match environment {
            Environment::Production => (LogLevel::Info, true, true),
            Environment::Development => (LogLevel::Debug, true, false),
            Environment::Test => (LogLevel::Warn, false, false),
        };

        Self {
            enabled: true,
            level,
            environment,
            service: "pos-app".to_string(),
            enable_console,
            enable_file_logging,
            enable_performance_logging: true,
            enable_security_logging: true,
            log_directory: PathBuf::from("logs"),
            max_file_size: 10 * 1024 * 1024,
            max_files: 5,
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS
                .iter()
                .map(|field| field.to_string())
                .collect(),
            rate_limit_enabled: true,
            max_logs_per_minute: 1000,
            buffer_size: 10,
            flush_on_critical: true,
            flush_interval: Duration::from_secs(5),
        }
    }

    /// Entries are buffered only in production.
    pub fn buffering(&self) -> bool {
        self.environment.is_production()
    }

    /// Whether development-only details (error source chains) are kept.
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::for_environment(Environment::from_env())
    }
}
