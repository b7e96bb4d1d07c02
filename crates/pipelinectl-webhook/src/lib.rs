//! # pipelinectl-webhook
//!
//! Webhook Intake (C11, §4.11): a pure function, `handle_webhook`, that a
//! thin HTTP layer (outside this crate's scope, §1) calls per request. It
//! verifies the signature (C1), deduplicates against in-flight and
//! recently-completed deployments for the same `(repository, commit)`,
//! enforces a per-source-IP rate limit and payload size cap, and on
//! success stores a `Pending` deployment plus an audit entry.

mod envelope;
mod rate_limit;

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;

use pipelinectl_config::DeploymentConfig;
use pipelinectl_store::Store;
use pipelinectl_types::audit::{redact_value, AuditEvent, AuditResult};
use pipelinectl_types::deployment::Deployment;
use pipelinectl_types::ids::{AuditEventId, DeploymentId};
use pipelinectl_types::{Error, Result};

pub use envelope::DeploymentRequest;
pub use rate_limit::RateLimiter;

/// Returned to the caller on success; the only observable difference
/// between "brand new deployment" and "deduplicated against an existing
/// one" is which path produced this id (§4.11, §8 "redelivering the same
/// webhook ... returns the same deployment_id").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeAccepted {
    pub deployment_id: DeploymentId,
    pub deduplicated: bool,
}

/// Collaborators the intake path needs. Owned by the caller (typically
/// the CLI's long-lived `Deps` wiring) and shared across requests.
pub struct WebhookDeps {
    pub secret: Vec<u8>,
    pub store: Arc<dyn Store>,
    pub config: DeploymentConfig,
    pub rate_limiter: RateLimiter,
}

impl WebhookDeps {
    pub fn new(secret: Vec<u8>, store: Arc<dyn Store>, config: DeploymentConfig) -> Self {
        Self { secret, store, config, rate_limiter: RateLimiter::default_limits() }
    }
}

/// Handle one inbound webhook delivery (§4.11).
///
/// Order of checks matters for the worked scenarios in §8: rate limit and
/// size cap are enforced before signature verification touches the body,
/// since both reject cheaply without needing a valid MAC.
pub fn handle_webhook(
    raw_body: &[u8],
    signature_header: Option<&str>,
    source_ip: IpAddr,
    deps: &WebhookDeps,
) -> Result<IntakeAccepted> {
    if !deps.rate_limiter.allow(source_ip) {
        audit_reject(deps, "webhook_rate_limited", source_ip, None);
        return Err(Error::RateLimited);
    }

    if raw_body.len() as u64 > deps.config.max_payload_bytes {
        audit_reject(deps, "webhook_payload_too_large", source_ip, None);
        return Err(Error::PayloadTooLarge);
    }

    if let Err(e) = pipelinectl_auth::verify_signature(&deps.secret, raw_body, signature_header) {
        audit_reject(deps, &format!("webhook_{}", e.kind()), source_ip, None);
        return Err(e);
    }

    let request = match envelope::parse(raw_body) {
        Ok(r) => r,
        Err(e) => {
            audit_reject(deps, "webhook_malformed", source_ip, None);
            return Err(e);
        }
    };

    let now = Utc::now();
    let within = chrono::Duration::from_std(deps.config.webhook_dedup_window)
        .map_err(|e| Error::Internal(anyhow::anyhow!(e)))?;

    if let Some(existing) = deps
        .store
        .find_recent_webhook_deployment(&request.repository, &request.commit, within, now)?
    {
        audit_accept(deps, &request, &existing, source_ip, true);
        return Ok(IntakeAccepted { deployment_id: existing, deduplicated: true });
    }

    let id = DeploymentId::generate(rand::random());
    let deployment = Deployment::new_webhook(id.clone(), request.repository.clone(), request.commit.clone(), request.branch.clone(), now);
    deps.store.put_deployment(deployment)?;

    audit_accept(deps, &request, &id, source_ip, false);
    Ok(IntakeAccepted { deployment_id: id, deduplicated: false })
}

fn audit_accept(deps: &WebhookDeps, request: &DeploymentRequest, deployment_id: &DeploymentId, source_ip: IpAddr, deduplicated: bool) {
    let details = redact_value(&serde_json::json!({
        "repository": request.repository.as_str(),
        "commit": request.commit,
        "branch": request.branch,
        "actor": request.actor,
        "source_ip": source_ip.to_string(),
        "deployment_id": deployment_id.as_str(),
        "deduplicated": deduplicated,
    }));
    let event = AuditEvent {
        id: AuditEventId::generate(rand::random()),
        timestamp: Utc::now(),
        actor: request.actor.clone(),
        action: "deployment:accepted".to_string(),
        resource: format!("deployment:{}", deployment_id.as_str()),
        result: AuditResult::Success,
        details,
    };
    if let Err(e) = deps.store.append_audit(event) {
        tracing::warn!(error = %e, "failed to append webhook-accept audit entry");
    }
}

fn audit_reject(deps: &WebhookDeps, action: &str, source_ip: IpAddr, repository: Option<&str>) {
    let details = serde_json::json!({
        "source_ip": source_ip.to_string(),
        "repository": repository,
    });
    let event = AuditEvent {
        id: AuditEventId::generate(rand::random()),
        timestamp: Utc::now(),
        actor: "webhook".to_string(),
        action: action.to_string(),
        resource: "webhook:intake".to_string(),
        result: AuditResult::Rejected,
        details,
    };
    if let Err(e) = deps.store.append_audit(event) {
        tracing::warn!(error = %e, "failed to append webhook-reject audit entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinectl_store::InMemoryStore;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    fn deps() -> WebhookDeps {
        WebhookDeps::new(b"topsecret".to_vec(), Arc::new(InMemoryStore::new()), DeploymentConfig::default())
    }

    fn signed_body(secret: &[u8], body: &[u8]) -> String {
        format!("sha256={}", pipelinectl_auth::sign(secret, body))
    }

    #[test]
    fn accepts_a_well_formed_signed_webhook() {
        let deps = deps();
        let body = br#"{"repository":"owner/r","commit":"abc123","branch":"main","actor":"alice"}"#;
        let header = signed_body(&deps.secret, body);
        let accepted = handle_webhook(body, Some(&header), ip(), &deps).unwrap();
        assert!(!accepted.deduplicated);

        let stored = deps.store.lookup_deployment_by_id(&accepted.deployment_id).unwrap();
        assert!(stored.is_some());
    }

    #[test]
    fn redelivery_within_window_returns_same_deployment_id() {
        let deps = deps();
        let body = br#"{"repository":"owner/r","commit":"abc123","branch":"main"}"#;
        let header = signed_body(&deps.secret, body);
        let first = handle_webhook(body, Some(&header), ip(), &deps).unwrap();
        let second = handle_webhook(body, Some(&header), ip(), &deps).unwrap();
        assert_eq!(first.deployment_id, second.deployment_id);
        assert!(second.deduplicated);
    }

    #[test]
    fn invalid_signature_is_rejected_and_stores_nothing() {
        let deps = deps();
        let body = br#"{"repository":"owner/r","commit":"abc123","branch":"main"}"#;
        let bad_header = signed_body(b"wrong-secret", body);
        let err = handle_webhook(body, Some(&bad_header), ip(), &deps).unwrap_err();
        assert_eq!(err.kind(), "signature_invalid");

        let history = deps
            .store
            .query_history(&pipelinectl_store::HistoryFilters::default(), 10, 0)
            .unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn oversized_payload_is_rejected_before_signature_check() {
        let deps = WebhookDeps::new(b"s".to_vec(), Arc::new(InMemoryStore::new()), DeploymentConfig { max_payload_bytes: 10, ..DeploymentConfig::default() });
        let body = vec![b'a'; 1000];
        let err = handle_webhook(&body, None, ip(), &deps).unwrap_err();
        assert_eq!(err.kind(), "payload_too_large");
    }

    #[test]
    fn rate_limit_exhaustion_rejects_subsequent_requests() {
        let deps = WebhookDeps {
            secret: b"s".to_vec(),
            store: Arc::new(InMemoryStore::new()),
            config: DeploymentConfig::default(),
            rate_limiter: RateLimiter::new(1, 0.0),
        };
        let body = br#"{"repository":"owner/r","commit":"abc123","branch":"main"}"#;
        let header = signed_body(&deps.secret, body);
        assert!(handle_webhook(body, Some(&header), ip(), &deps).is_ok());
        let err = handle_webhook(body, Some(&header), ip(), &deps).unwrap_err();
        assert_eq!(err.kind(), "rate_limited");
    }
}
