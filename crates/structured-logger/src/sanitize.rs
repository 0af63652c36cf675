//! Metadata sanitisation.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Replacement for sensitive values.
pub const REDACTED: &str = "[REDACTED]";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Redacts sensitive keys anywhere in a JSON value.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    fields: Vec<String>,
}

impl Sanitizer {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|f| f.as_ref().to_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    /// Whether a key names a sensitive field (substring match, case-insensitive).
    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.fields.iter().any(|field| key.contains(field.as_str()))
    }

    /// Return a sanitised copy of `value`.
    pub fn sanitize(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.sanitize_map(map)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.sanitize(v)).collect()),
            other => other.clone(),
        }
    }

    fn sanitize_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let clean = if self.is_sensitive(key) {
                    redact(key, value)
                } else {
                    self.sanitize(value)
                };
                (key.clone(), clean)
            })
            .collect()
    }
}

fn redact(key: &str, value: &Value) -> Value {
    if key.to_lowercase().contains("email") {
        if let Value::String(address) = value {
            if let Some(masked) = mask_email(address) {
                return Value::String(masked);
            }
        }
    }
    Value::String(REDACTED.to_string())
}

/// Mask an email address as `jo***@example.com`.
///
/// Returns `None` when the value does not look like an address.
pub fn mask_email(address: &str) -> Option<String> {
    if !EMAIL_RE.is_match(address) {
        return None;
    }
    let (local, domain) = address.split_once('@')?;
    let visible: String = local.chars().take(2).collect();
    Some(format!("{}***@{}", visible, domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SENSITIVE_FIELDS;
    use serde_json::json;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(DEFAULT_SENSITIVE_FIELDS)
    }

    #[test]
    fn test_redacts_top_level_keys() {
        let out = sanitizer().sanitize(&json!({
            "password": "hunter2",
            "api_key": "sk-123",
            "Authorization": "Bearer abc",
            "order_id": 17,
        }));

        assert_eq!(out["password"], REDACTED);
        assert_eq!(out["api_key"], REDACTED);
        assert_eq!(out["Authorization"], REDACTED);
        assert_eq!(out["order_id"], 17);
    }

    #[test]
    fn test_redacts_nested_and_arrays() {
        let out = sanitizer().sanitize(&json!({
            "payment": {
                "card": {"credit_card": "4111111111111111", "cvv": "123", "brand": "visa"}
            },
            "attempts": [{"token": "t1"}, {"token": "t2", "ok": true}],
        }));

        assert_eq!(out["payment"]["card"]["credit_card"], REDACTED);
        assert_eq!(out["payment"]["card"]["cvv"], REDACTED);
        assert_eq!(out["payment"]["card"]["brand"], "visa");
        assert_eq!(out["attempts"][0]["token"], REDACTED);
        assert_eq!(out["attempts"][1]["ok"], true);
    }

    #[test]
    fn test_masks_email_values() {
        let out = sanitizer().sanitize(&json!({
            "customer_email": "maria.silva@example.com",
            "email": "not-an-address",
        }));

        assert_eq!(out["customer_email"], "ma***@example.com");
        assert_eq!(out["email"], REDACTED);
    }

    #[test]
    fn test_sensitive_object_value_is_redacted_whole() {
        let out = sanitizer().sanitize(&json!({"secrets": {"a": 1}}));
        assert_eq!(out["secrets"], REDACTED);
    }

    #[test]
    fn test_mask_email_short_local_part() {
        assert_eq!(mask_email("a@b.io").as_deref(), Some("a***@b.io"));
        assert_eq!(mask_email("plainaddress"), None);
    }

    #[test]
    fn test_custom_field_list() {
        let sanitizer = Sanitizer::new(["PIN", ""]);
        let out = sanitizer.sanitize(&json!({"pin_code": "0000", "table": 4}));
        assert_eq!(out["pin_code"], REDACTED);
        assert_eq!(out["table"], 4);
    }
}
