//! Rendering of log entries for the console and file sinks.

use crate::types::{LogEntry, LogLevel};
use std::fmt::Write as _;

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

fn level_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "\x1b[36m",
        LogLevel::Info => "\x1b[32m",
        LogLevel::Warn => "\x1b[33m",
        LogLevel::Error => "\x1b[31m",
        LogLevel::Critical => "\x1b[1;35m",
    }
}

/// One-line JSON, the production format.
pub fn json_line(entry: &LogEntry) -> String {
    serde_json::to_string(entry).unwrap_or_else(|e| {
        format!(
            r#"{{"level":"{}","message":"unserializable log entry: {}"}}"#,
            entry.level, e
        )
    })
}

/// Colourised human-readable rendering used outside production.
///
/// The first line carries timestamp, level, context and message; metadata
/// and error details follow pretty-printed and indented.
pub fn pretty(entry: &LogEntry) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "{DIM}{}{RESET} {}{:<8}{RESET} [{}] {}",
        entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        level_color(entry.level),
        entry.level.as_str().to_uppercase(),
        entry.context,
        entry.message,
    );

    if let (Some(method), Some(endpoint)) = (&entry.method, &entry.endpoint) {
        let _ = write!(out, " {DIM}{} {}{RESET}", method, endpoint);
    }
    if let Some(status) = entry.status_code {
        let _ = write!(out, " {DIM}status={}{RESET}", status);
    }
    if let Some(duration) = entry.duration {
        let _ = write!(out, " {DIM}{:.2}ms{RESET}", duration);
    }
    if let Some(request_id) = &entry.request_id {
        let _ = write!(out, " {DIM}req={}{RESET}", request_id);
    }

    if let Some(metadata) = &entry.metadata {
        push_block(&mut out, "metadata", &serde_json::to_string_pretty(metadata).unwrap_or_default());
    }
    if let Some(error) = &entry.error {
        let mut text = format!("{}: {}", error.name, error.message);
        if let Some(code) = &error.code {
            let _ = write!(text, " (code {})", code);
        }
        if let Some(stack) = &error.stack {
            let _ = write!(text, "\n{}", stack);
        }
        push_block(&mut out, "error", &text);
    }
    if let Some(performance) = &entry.performance {
        push_block(
            &mut out,
            "performance",
            &serde_json::to_string_pretty(performance).unwrap_or_default(),
        );
    }
    if let Some(security) = &entry.security {
        push_block(
            &mut out,
            "security",
            &serde_json::to_string_pretty(security).unwrap_or_default(),
        );
    }

    out
}

fn push_block(out: &mut String, label: &str, body: &str) {
    let _ = write!(out, "\n  {}:", label);
    for line in body.lines() {
        let _ = write!(out, "\n    {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorInfo, LogContext};
    use chrono::Utc;
    use common::Environment;
    use serde_json::json;

    fn entry() -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Warn,
            context: LogContext::Payment,
            service: "pos".to_string(),
            environment: Environment::Development,
            request_id: Some("req-1".to_string()),
            user_id: None,
            session_id: None,
            endpoint: Some("/api/orders".to_string()),
            method: Some("POST".to_string()),
            status_code: Some(402),
            duration: Some(12.5),
            message: "payment declined".to_string(),
            correlation_id: "c-1".to_string(),
            trace_id: None,
            metadata: Some(json!({"order_id": 9})),
            error: Some(ErrorInfo::new("GatewayError", "card declined").with_code("51")),
            performance: None,
            security: None,
        }
    }

    #[test]
    fn test_pretty_contains_fields() {
        let text = pretty(&entry());
        let first = text.lines().next().unwrap();
        assert!(first.contains("WARN"));
        assert!(first.contains("[payment]"));
        assert!(first.contains("payment declined"));
        assert!(first.contains("POST /api/orders"));
        assert!(text.contains("\"order_id\": 9"));
        assert!(text.contains("GatewayError: card declined (code 51)"));
    }

    #[test]
    fn test_json_line_is_single_line() {
        let line = json_line(&entry());
        assert!(!line.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["statusCode"], 402);
        assert_eq!(parsed["level"], "warn");
    }
}
