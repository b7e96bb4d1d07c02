//! Audit Log (C2, §4.2): a thin wrapper over `Store::append_audit` /
//! `query_audit` that stamps an id/timestamp and redacts sensitive fields
//! before anything reaches the store. §4.2's minimum-coverage list (webhook
//! accept/reject, deployment start/stop/state-change, rollback
//! initiate/complete, manual trigger, sensitive config reads, auth
//! failures) is covered by the narrow helpers below plus the direct
//! `record` calls the webhook crate already makes against the `Store`.

use chrono::Utc;
use serde_json::Value;

use pipelinectl_store::{AuditFilters, Store};
use pipelinectl_types::audit::{redact_value, AuditEvent, AuditResult};
use pipelinectl_types::ids::{AuditEventId, DeploymentId};
use pipelinectl_types::Result;

/// Append one audit event. `details` is redacted before being persisted
/// (§4.2 "never returns secrets").
pub fn record(store: &dyn Store, actor: &str, action: &str, resource: &str, result: AuditResult, details: Value) -> Result<()> {
    let event = AuditEvent {
        id: AuditEventId::generate(rand::random()),
        timestamp: Utc::now(),
        actor: actor.to_string(),
        action: action.to_string(),
        resource: resource.to_string(),
        result,
        details: redact_value(&details),
    };
    store.append_audit(event)
}

pub fn record_deployment(
    store: &dyn Store,
    actor: &str,
    action: &str,
    deployment_id: &DeploymentId,
    result: AuditResult,
    details: Value,
) -> Result<()> {
    record(store, actor, action, &format!("deployment:{deployment_id}"), result, details)
}

pub fn record_manual_trigger(store: &dyn Store, actor: &str, deployment_id: &DeploymentId, details: Value) -> Result<()> {
    record(store, actor, "deployment:manual_trigger", &format!("deployment:{deployment_id}"), AuditResult::Success, details)
}

pub fn record_rollback(store: &dyn Store, actor: &str, action: &str, deployment_id: &DeploymentId, result: AuditResult, details: Value) -> Result<()> {
    record(store, actor, action, &format!("deployment:{deployment_id}"), result, details)
}

/// §4.2 "configuration reads of sensitive fields".
pub fn record_config_read(store: &dyn Store, actor: &str, field: &str) -> Result<()> {
    record(store, actor, "config:read_sensitive_field", field, AuditResult::Success, serde_json::json!({ "field": field }))
}

/// §4.2 "authentication failures".
pub fn record_auth_failure(store: &dyn Store, actor: &str, reason: &str) -> Result<()> {
    record(store, actor, "auth:failure", "authentication", AuditResult::Failure, serde_json::json!({ "reason": reason }))
}

pub fn query(store: &dyn Store, filters: &AuditFilters, limit: usize, offset: usize) -> Result<Vec<AuditEvent>> {
    store.query_audit(filters, limit, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinectl_store::InMemoryStore;

    #[test]
    fn recorded_events_redact_sensitive_detail_fields() {
        let store = InMemoryStore::new();
        record(&store, "alice", "config:read_sensitive_field", "deployment.secret", AuditResult::Success, serde_json::json!({ "token": "abc123" })).unwrap();
        let events = query(&store, &AuditFilters::default(), 10, 0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details["token"], serde_json::json!("[REDACTED]"));
    }

    #[test]
    fn auth_failure_is_recorded_with_failure_result() {
        let store = InMemoryStore::new();
        record_auth_failure(&store, "203.0.113.7", "signature_invalid").unwrap();
        let events = query(&store, &AuditFilters { action: Some("auth:failure".to_string()), ..Default::default() }, 10, 0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].result, AuditResult::Failure);
    }
}
