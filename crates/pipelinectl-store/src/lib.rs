//! # pipelinectl-store
//!
//! The persistence contract (C4, §4.4): a [`Store`] trait plus an
//! [`InMemoryStore`] reference implementation. `claim_active` is the
//! concurrency primitive the orchestrator uses to enforce at-most-one
//! active deployment per repository (§4.10, §8 invariant #1); every
//! mutation of a `Deployment` goes through optimistic-concurrency CAS on
//! `(id, version)` (§4.4).
//!
//! A durable backend (relational, embedded KV) implements the same trait;
//! nothing above this crate depends on `InMemoryStore` directly.

mod in_memory;

use chrono::{DateTime, Utc};
use pipelinectl_types::deployment::{Deployment, DeploymentState, StageResult};
use pipelinectl_types::health::HealthReport;
use pipelinectl_types::ids::DeploymentId;
use pipelinectl_types::prediction::FailurePrediction;
use pipelinectl_types::audit::AuditEvent;
use pipelinectl_types::{Error, Repository, Result};

pub use in_memory::InMemoryStore;

/// Outcome of [`Store::claim_active`] (§4.4, §8 invariant #1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    Busy { active_deployment_id: DeploymentId },
}

/// Filters for [`Store::query_history`] (§4.2 "filterable by ...").
#[derive(Debug, Clone, Default)]
pub struct HistoryFilters {
    pub repository: Option<Repository>,
    pub state: Option<DeploymentState>,
    pub since: Option<DateTime<Utc>>,
}

/// Filters for [`Store::query_audit`] (§4.2 "filterable by (actor, action,
/// resource_kind, time_range)").
#[derive(Debug, Clone, Default)]
pub struct AuditFilters {
    pub actor: Option<String>,
    pub action: Option<String>,
    pub resource_kind: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

pub trait Store: Send + Sync {
    fn put_deployment(&self, deployment: Deployment) -> Result<()>;

    /// CAS update: succeeds only if the stored deployment's version equals
    /// `expected_version`; otherwise returns `Error::Conflict` so the
    /// caller can reload and re-validate the transition (§4.10).
    fn update_deployment(&self, deployment: Deployment, expected_version: u64) -> Result<()>;

    fn append_stage_result(&self, deployment_id: &DeploymentId, stage: StageResult) -> Result<()>;

    fn lookup_deployment_by_id(&self, id: &DeploymentId) -> Result<Option<Deployment>>;

    fn query_history(&self, filters: &HistoryFilters, limit: usize, offset: usize) -> Result<Vec<Deployment>>;

    /// The concurrency primitive (§4.4, §4.10): claims the repository's
    /// single active-deployment slot for `deployment_id`, or reports who
    /// currently holds it.
    fn claim_active(&self, repository: &Repository, deployment_id: &DeploymentId) -> Result<ClaimOutcome>;

    /// Release the slot. Idempotent: releasing a repository that isn't
    /// claimed, or is claimed by a different deployment, is a no-op.
    fn release_active(&self, repository: &Repository, deployment_id: &DeploymentId) -> Result<()>;

    /// The currently-active (if any) or most recently queued deployment
    /// id for `(repository, commit)` under `trigger = webhook`, used by the
    /// dedup window (§4.10, §4.11).
    fn find_recent_webhook_deployment(
        &self,
        repository: &Repository,
        commit: &str,
        within: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<DeploymentId>>;

    fn put_health_report(&self, report: HealthReport) -> Result<()>;
    fn latest_health_report(&self, repository: &Repository) -> Result<Option<HealthReport>>;

    fn put_prediction(&self, prediction: FailurePrediction) -> Result<()>;
    fn latest_prediction(&self, repository: &Repository) -> Result<Option<FailurePrediction>>;

    fn append_audit(&self, event: AuditEvent) -> Result<()>;
    fn query_audit(&self, filters: &AuditFilters, limit: usize, offset: usize) -> Result<Vec<AuditEvent>>;
}

/// Convenience used by callers reloading after a CAS conflict.
pub fn conflict(message: impl Into<String>) -> Error {
    Error::Conflict(message.into())
}
