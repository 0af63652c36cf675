//! Server lifecycle tests

use async_trait::async_trait;
use common::{Environment, Result};
use healthcheck::{CheckOutcome, HealthCheckConfig, HealthCheckSystem, HealthChecker};
use std::sync::Arc;
use std::time::Duration;
use structured_logger::{LogLevel, Logger, LoggerConfig, MemorySink};
use telemetry_server::{Config, TelemetryServer};
use tokio::net::TcpListener;

struct MemoryOk;

#[async_trait]
impl HealthChecker for MemoryOk {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn check(&self) -> Result<CheckOutcome> {
        Ok(CheckOutcome::healthy("memory ok"))
    }
}

#[tokio::test]
async fn test_run_until_triggered_then_shut_down_once() {
    let sink = Arc::new(MemorySink::new(100));
    let mut logger_config = LoggerConfig::for_environment(Environment::Test);
    logger_config.level = LogLevel::Info;
    let logger = Arc::new(Logger::with_sinks(logger_config, vec![sink.clone()]));
    let health = Arc::new(HealthCheckSystem::with_checkers(
        HealthCheckConfig::default(),
        vec![Arc::new(MemoryOk)],
        logger.clone(),
    ));

    let config = Config::from_yaml("environment: test").unwrap();
    let server = TelemetryServer::from_parts(config, logger.clone(), health.clone());
    let coordinator = server.coordinator();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let running = tokio::spawn(server.run_with_listener(listener));

    // Monitoring starts with an immediate run
    tokio::time::timeout(Duration::from_secs(5), async {
        while health.get_last_report().await.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(health.is_monitoring());

    assert!(coordinator.trigger());
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(!health.is_monitoring());
    assert!(logger.is_shut_down());
    assert!(!coordinator.shutdown().await);

    let messages: Vec<String> = sink.entries().into_iter().map(|e| e.message).collect();
    assert!(messages.iter().any(|m| m == "Telemetry server started"));
    assert_eq!(messages.last().map(String::as_str), Some("Telemetry server stopped"));
}
