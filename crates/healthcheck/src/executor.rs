//! Timed, retried execution of a single probe.

use crate::checkers::HealthChecker;
use crate::types::{HealthCheckResult, HealthStatus};
use chrono::Utc;
use common::Error;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

/// Timeout and retry policy for one probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Bound on each attempt
    pub timeout: Duration,
    /// Extra attempts after the first failure
    pub retries: u32,
    /// Attempt `n` is followed by a `n * backoff` pause
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Run `checker` under `policy` and always produce a result.
///
/// Each attempt races the probe against `policy.timeout`. A timed-out
/// attempt abandons the wait but cannot abort I/O the probe already started.
/// When every attempt fails the result is critical and carries the last error.
pub async fn execute_check(checker: &dyn HealthChecker, policy: RetryPolicy) -> HealthCheckResult {
    let name = checker.name();
    let start = Instant::now();
    let attempts = policy.attempts();
    let mut last_error: Option<Error> = None;

    for attempt in 1..=attempts {
        match timeout(policy.timeout, checker.check()).await {
            Ok(Ok(outcome)) => {
                let duration = elapsed_ms(start);
                debug!(
                    check = name,
                    status = %outcome.status,
                    attempt,
                    duration_ms = duration,
                    "Health check completed"
                );
                return HealthCheckResult {
                    name: name.to_string(),
                    status: outcome.status,
                    message: outcome.message,
                    duration,
                    timestamp: Utc::now(),
                    metadata: outcome.metadata,
                    error: None,
                };
            }
            Ok(Err(e)) => {
                warn!(check = name, attempt, error = %e, "Health check attempt failed");
                last_error = Some(e);
            }
            Err(_) => {
                warn!(check = name, attempt, "Health check attempt timed out");
                last_error = Some(Error::Timeout(policy.timeout));
            }
        }

        if attempt < attempts {
            sleep(policy.backoff * attempt).await;
        }
    }

    let message = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempt made".to_string());
    HealthCheckResult {
        name: name.to_string(),
        status: HealthStatus::Critical,
        message: format!("{} check failed after {} attempts", name, attempts),
        duration: elapsed_ms(start),
        timestamp: Utc::now(),
        metadata: None,
        error: Some(message),
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
