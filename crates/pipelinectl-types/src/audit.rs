//! Append-only audit trail (§4.2) and its redaction rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::AuditEventId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Failure,
    Rejected,
}

/// Immutable `(id, timestamp, actor, action, resource, result, details)` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub result: AuditResult,
    /// Arbitrary structured context, redacted via [`redact_value`] before
    /// being handed to the store (§4.2 "never returns secrets").
    pub details: Value,
}

/// Field names whose values are always replaced with `[REDACTED]`,
/// matched case-insensitively against object keys at any depth.
const SENSITIVE_FIELD_SUBSTRINGS: [&str; 4] = ["password", "secret", "token", "key"];

fn is_sensitive_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_FIELD_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

/// Recursively redact any object field whose name matches
/// `password|secret|token|key` (case-insensitive substring match), leaving
/// the rest of the structure untouched.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_sensitive_field(k) {
                    out.insert(k.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    out.insert(k.clone(), redact_value(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}
