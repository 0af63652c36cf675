//! Request metrics and alert types.

use chrono::{DateTime, Utc};
use common::resources::{CpuUsage, MemorySnapshot};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::net::IpAddr;
use tokio::time::Instant;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";
pub const USER_ID_HEADER: &str = "x-user-id";

/// What the monitor learns about a request before handling it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInfo {
    pub method: String,
    /// Path only, without query string
    pub path: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: Option<String>,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Extract request details from method, URI and headers.
    ///
    /// The client address comes from `x-forwarded-for` (first hop), then
    /// `x-real-ip`, then `peer`.
    pub fn from_http(
        method: &http::Method,
        uri: &http::Uri,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
    ) -> Self {
        let ip = header_str(headers, "x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(|first| first.trim().to_string())
            .filter(|first| !first.is_empty())
            .or_else(|| header_str(headers, "x-real-ip").map(|v| v.trim().to_string()))
            .or_else(|| peer.map(|addr| addr.to_string()));

        Self {
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            ip,
            user_agent: header_str(headers, http::header::USER_AGENT.as_str()).map(str::to_string),
            user_id: header_str(headers, USER_ID_HEADER).map(str::to_string),
        }
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// What the monitor learns from the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    pub status_code: u16,
    pub content_length: Option<u64>,
}

impl ResponseInfo {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            content_length: None,
        }
    }

    pub fn from_http<B>(response: &http::Response<B>) -> Self {
        Self {
            status_code: response.status().as_u16(),
            content_length: header_str(response.headers(), http::header::CONTENT_LENGTH.as_str())
                .and_then(|v| v.parse().ok()),
        }
    }
}

/// Caller-supplied figures merged into a finished request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdditionalMetrics {
    pub query_count: Option<u32>,
    pub cache_hit: Option<bool>,
    pub error: Option<String>,
}

impl AdditionalMetrics {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// One instrumented request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub request_id: String,
    pub method: String,
    pub endpoint: String,
    #[serde(skip)]
    pub start_time: Instant,
    #[serde(skip)]
    pub end_time: Option<Instant>,
    /// Wall-clock start
    pub timestamp: DateTime<Utc>,
    /// Milliseconds; zero while active
    pub duration: f64,
    pub status_code: Option<u16>,
    pub content_length: Option<u64>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub user_id: Option<String>,
    pub memory_before: MemorySnapshot,
    pub memory_after: Option<MemorySnapshot>,
    /// Process CPU time spent while the request ran
    pub cpu_usage: Option<CpuUsage>,
    #[serde(skip)]
    pub cpu_before: CpuUsage,
    pub query_count: Option<u32>,
    pub cache_hit: Option<bool>,
    pub error: Option<String>,
}

impl PerformanceMetrics {
    pub fn is_server_error(&self) -> bool {
        self.status_code.is_some_and(|code| code >= 500)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SlowRequest,
    HighMemory,
    HighCpu,
    ErrorRate,
    HighLoad,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::SlowRequest => "slow_request",
            AlertType::HighMemory => "high_memory",
            AlertType::HighCpu => "high_cpu",
            AlertType::ErrorRate => "error_rate",
            AlertType::HighLoad => "high_load",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A threshold breach derived from request metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceAlert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub metrics: Value,
    pub timestamp: DateTime<Utc>,
}

/// Average duration of one endpoint in the metrics window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub endpoint: String,
    pub avg_duration: f64,
    pub count: usize,
}

/// Derived view over the recent request history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub active_requests: usize,
    pub recent_requests: usize,
    /// Milliseconds
    pub avg_response_time: f64,
    /// Percent of recent requests answered with 5xx
    pub error_rate: f64,
    pub memory_usage: MemorySnapshot,
    /// Up to five endpoints, slowest average first
    pub slowest_endpoints: Vec<EndpointStats>,
}

/// What a cleanup sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub expired_history: usize,
    pub stale_active: usize,
    pub expired_cooldowns: usize,
}
