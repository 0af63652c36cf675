//! Integration tests for the structured logger

use common::Environment;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use structured_logger::sanitize::REDACTED;
use structured_logger::{
    LogContext, LogEntry, LogLevel, LogOptions, Logger, LoggerConfig, MemorySink, RiskLevel,
    SecurityInfo,
};

/// Helper to build a logger writing only to memory
fn memory_logger(environment: Environment) -> (Arc<Logger>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new(10_000));
    let mut config = LoggerConfig::for_environment(environment);
    config.level = LogLevel::Debug;
    config.service = "pos-test".to_string();
    let logger = Arc::new(Logger::with_sinks(config, vec![sink.clone()]));
    (logger, sink)
}

#[test]
fn test_nested_sensitive_metadata_never_reaches_sink() {
    let (logger, sink) = memory_logger(Environment::Development);

    logger.info(
        LogContext::Payment,
        "Card charged",
        LogOptions::new().metadata(json!({
            "order": {
                "id": 1001,
                "payment": {
                    "credit_card": "4111 1111 1111 1111",
                    "cvv": "737",
                    "processor": {"api_key": "sk_live_x", "name": "stripe"}
                }
            },
            "customer": {"email": "joao@restaurante.com.br"},
        })),
    );

    let entry = &sink.entries()[0];
    let metadata = entry.metadata.as_ref().unwrap();
    assert_eq!(metadata["order"]["id"], 1001);
    assert_eq!(metadata["order"]["payment"]["credit_card"], REDACTED);
    assert_eq!(metadata["order"]["payment"]["cvv"], REDACTED);
    assert_eq!(metadata["order"]["payment"]["processor"]["api_key"], REDACTED);
    assert_eq!(metadata["order"]["payment"]["processor"]["name"], "stripe");
    assert_eq!(metadata["customer"]["email"], "jo***@restaurante.com.br");

    let line = serde_json::to_string(entry).unwrap();
    assert!(!line.contains("4111"));
    assert!(!line.contains("sk_live_x"));
}

#[test]
fn test_entry_round_trips_through_json() {
    let (logger, sink) = memory_logger(Environment::Development);
    logger.log_api_request(
        "GET",
        "/api/tables",
        200,
        12.75,
        LogOptions::new().request_id("req-9").user_id("waiter-3"),
    );

    let entry = sink.entries().remove(0);
    let json = serde_json::to_string(&entry).unwrap();
    let parsed: LogEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, entry);
    assert_eq!(parsed.correlation_id, logger.correlation_id());
}

#[test]
fn test_api_request_levels_follow_status() {
    let (logger, sink) = memory_logger(Environment::Development);
    logger.log_api_request("GET", "/a", 200, 1.0, LogOptions::new());
    logger.log_api_request("GET", "/b", 404, 1.0, LogOptions::new());
    logger.log_api_request("GET", "/c", 502, 1.0, LogOptions::new());

    let levels: Vec<_> = sink.entries().iter().map(|e| e.level).collect();
    assert_eq!(levels, vec![LogLevel::Info, LogLevel::Warn, LogLevel::Error]);

    let entry = &sink.entries()[2];
    assert_eq!(entry.message, "GET /c 502 - 1.00ms");
    assert_eq!(entry.status_code, Some(502));
    assert_eq!(entry.context, LogContext::Api);
}

#[test]
fn test_auth_and_database_helpers() {
    let (logger, sink) = memory_logger(Environment::Development);

    logger.log_auth_event("login", Some("u-1"), true, LogOptions::new());
    logger.log_auth_event("login", None, false, LogOptions::new());
    let long_query = format!("SELECT * FROM orders WHERE note = '{}'", "x".repeat(400));
    logger.log_database_query(&long_query, 3.5, true, LogOptions::new());
    logger.log_database_query("SELECT 1", 9.0, false, LogOptions::new());

    let entries = sink.entries();
    assert_eq!(entries[0].level, LogLevel::Info);
    assert_eq!(entries[0].user_id.as_deref(), Some("u-1"));
    assert_eq!(entries[1].level, LogLevel::Warn);
    assert_eq!(entries[1].metadata.as_ref().unwrap()["success"], false);

    assert_eq!(entries[2].level, LogLevel::Debug);
    let query = entries[2].metadata.as_ref().unwrap()["query"].as_str().unwrap();
    assert_eq!(query.chars().count(), 203);
    assert!(query.ends_with("..."));
    assert_eq!(entries[3].level, LogLevel::Error);
}

#[test]
fn test_security_event_levels_and_toggle() {
    let (logger, sink) = memory_logger(Environment::Development);

    logger.log_security_event("odd login hour", RiskLevel::Low, LogOptions::new());
    logger.log_security_event(
        "repeated failed pin",
        RiskLevel::Medium,
        LogOptions::new().security(SecurityInfo {
            ip: Some("10.0.0.7".to_string()),
            ..Default::default()
        }),
    );
    logger.log_security_event("refund override", RiskLevel::High, LogOptions::new());

    let entries = sink.entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].level, LogLevel::Info);
    assert_eq!(entries[1].level, LogLevel::Warn);
    assert_eq!(entries[2].level, LogLevel::Critical);
    let security = entries[1].security.as_ref().unwrap();
    assert_eq!(security.ip.as_deref(), Some("10.0.0.7"));
    assert!(security.suspicious);
    assert_eq!(security.risk_level, RiskLevel::Medium);

    logger.update_config(|c| c.enable_security_logging = false);
    logger.log_security_event("ignored", RiskLevel::High, LogOptions::new());
    assert_eq!(sink.len(), 3);
}

#[test]
fn test_performance_logging_toggle() {
    let (logger, sink) = memory_logger(Environment::Development);
    logger.log_performance_metric("render_menu", 42.0, LogOptions::new());

    let entry = &sink.entries()[0];
    assert_eq!(entry.context, LogContext::Performance);
    assert_eq!(entry.duration, Some(42.0));
    assert_eq!(entry.performance.as_ref().unwrap().response_time, Some(42.0));

    logger.update_config(|c| c.enable_performance_logging = false);
    logger.log_performance_metric("render_menu", 42.0, LogOptions::new());
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_timer_ends_once() {
    let (logger, sink) = memory_logger(Environment::Development);

    logger.start_performance_timer("close-till");
    std::thread::sleep(Duration::from_millis(5));
    let elapsed = logger.end_performance_timer("close-till", "close till", LogOptions::new());
    assert!(elapsed >= 5.0);
    assert_eq!(logger.active_timers(), 0);

    let second = logger.end_performance_timer("close-till", "close till", LogOptions::new());
    assert_eq!(second, 0.0);
    assert_eq!(sink.len(), 1);

    let entry = &sink.entries()[0];
    assert!(entry.performance.as_ref().unwrap().cpu_usage.is_some());
}

#[test]
fn test_unknown_timer_returns_zero() {
    let (logger, sink) = memory_logger(Environment::Development);
    assert_eq!(logger.end_performance_timer("never-started", "x", LogOptions::new()), 0.0);
    assert!(sink.is_empty());
}

#[test]
fn test_log_dispatches_by_level() {
    let (logger, sink) = memory_logger(Environment::Development);
    for level in LogLevel::ALL {
        logger.log(level, LogContext::System, level.as_str(), LogOptions::new());
    }
    let levels: Vec<_> = sink.entries().iter().map(|e| e.level).collect();
    assert_eq!(levels, LogLevel::ALL.to_vec());
}

#[test]
fn test_correlation_id_is_stamped() {
    let (logger, sink) = memory_logger(Environment::Development);
    logger.set_correlation_id("shift-2024-03-09");
    logger.info(LogContext::System, "till opened", LogOptions::new());
    assert_eq!(sink.entries()[0].correlation_id, "shift-2024-03-09");
}

#[test]
fn test_production_flushes_every_ten_entries() {
    let (logger, sink) = memory_logger(Environment::Production);

    for i in 0..9 {
        logger.info(LogContext::Api, format!("request {}", i), LogOptions::new());
    }
    assert!(sink.is_empty());
    assert_eq!(logger.buffered(), 9);

    logger.info(LogContext::Api, "request 9", LogOptions::new());
    assert_eq!(sink.len(), 10);
    assert_eq!(logger.buffered(), 0);
}

#[test]
fn test_file_sink_writes_per_level_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = LoggerConfig::for_environment(Environment::Test);
    config.enable_file_logging = true;
    config.log_directory = dir.path().to_path_buf();
    config.service = "pos".to_string();

    let logger = Logger::new(config);
    logger.warn(LogContext::System, "disk at 85%", LogOptions::new());
    logger.error(LogContext::System, "printer offline", LogOptions::new());
    logger.info(LogContext::System, "below level", LogOptions::new());

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|n| n.starts_with("pos-warn-")));
    assert!(names.iter().any(|n| n.starts_with("pos-error-")));
}

#[tokio::test(start_paused = true)]
async fn test_flush_task_drains_buffer() {
    let (logger, sink) = memory_logger(Environment::Production);
    logger.update_config(|c| c.flush_interval = Duration::from_secs(5));
    let handle = logger.spawn_flush_task();

    logger.info(LogContext::System, "waiting", LogOptions::new());
    assert!(sink.is_empty());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(sink.len(), 1);

    logger.shutdown();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(handle.is_finished());
}

#[test]
fn test_failing_file_sink_does_not_break_logging() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, "plain file").unwrap();

    let sink = Arc::new(MemorySink::new(100));
    let mut config = LoggerConfig::for_environment(Environment::Test);
    config.enable_file_logging = true;
    config.log_directory = blocker.join("logs");
    let logger = Logger::with_sinks(
        config,
        vec![Arc::new(structured_logger::FileSink::new()), sink.clone()],
    );

    logger.error(LogContext::System, "printer offline", LogOptions::new());
    logger.critical(LogContext::Payment, "terminal unreachable", LogOptions::new());

    let messages: Vec<String> = sink.entries().into_iter().map(|e| e.message).collect();
    assert_eq!(messages, vec!["printer offline", "terminal unreachable"]);
    assert!(blocker.is_file());
}

#[test]
fn test_entries_logged_during_shutdown_are_written() {
    let (logger, sink) = memory_logger(Environment::Production);
    logger.update_config(|c| c.rate_limit_enabled = false);

    let writers: Vec<_> = (0..4)
        .map(|worker| {
            let logger = logger.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    logger.info(
                        LogContext::Api,
                        format!("worker {} request {}", worker, i),
                        LogOptions::new(),
                    );
                }
            })
        })
        .collect();
    logger.shutdown();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(logger.buffered(), 0);
    assert_eq!(sink.len(), 1000);
}

#[test]
fn test_after_shutdown_entries_bypass_buffer() {
    let (logger, sink) = memory_logger(Environment::Production);
    logger.info(LogContext::System, "buffered", LogOptions::new());
    logger.shutdown();
    assert_eq!(sink.len(), 1);

    logger.info(LogContext::System, "direct", LogOptions::new());
    assert_eq!(logger.buffered(), 0);
    assert_eq!(sink.len(), 2);
}
