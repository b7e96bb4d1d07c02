//! The deployment state machine (§4.10) and its stage results (§3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BackupRef, DeploymentId};
use crate::Repository;

/// States of the deployment DAG (§4.10). Ordering here is declaration
/// order only; legality of a transition is decided by [`DeploymentState::can_transition_to`],
/// not by variant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Pending,
    Validating,
    BackingUp,
    Applying,
    Verifying,
    RollingBack,
    Completed,
    Failed,
    Cancelled,
}

impl DeploymentState {
    /// Terminal states never transition further (invariant #2, §8).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentState::Completed | DeploymentState::Failed | DeploymentState::Cancelled
        )
    }

    /// True while a deployment occupies the repository's single
    /// concurrency slot (invariant #1, §8).
    pub fn counts_toward_concurrency(self) -> bool {
        matches!(
            self,
            DeploymentState::Validating
                | DeploymentState::BackingUp
                | DeploymentState::Applying
                | DeploymentState::Verifying
                | DeploymentState::RollingBack
        )
    }

    /// Validates a single edge of the DAG in §4.10. Does not account for
    /// rollback sub-deployments (those are separate `Deployment` records
    /// with `trigger = rollback`, themselves following this same DAG from
    /// `Pending`).
    pub fn can_transition_to(self, next: DeploymentState) -> bool {
        use DeploymentState::*;
        match (self, next) {
            (Pending, Validating) => true,
            (Pending, Cancelled) => true,
            (Validating, BackingUp) => true,
            (Validating, Failed) => true,
            (BackingUp, Applying) => true,
            (BackingUp, Failed) => true,
            (Applying, Verifying) => true,
            (Applying, Failed) => true,
            (Verifying, Completed) => true,
            (Verifying, Failed) => true,
            (Verifying, Cancelled) => true,
            (Failed, RollingBack) => true,
            (RollingBack, Completed) => true,
            (RollingBack, Failed) => true,
            _ => false,
        }
    }
}

/// How a deployment was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Webhook,
    Manual,
    Rollback,
}

/// Kinds of deployment failure (§4.10 "Failure semantics").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    BackupFailed,
    ApplyFailed,
    HealthCheckFailed,
    Timeout,
    Cancelled,
    RollbackFailed,
}

/// Structured terminal error attached to a failed deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentError {
    pub kind: FailureKind,
    pub message: String,
    pub retriable: bool,
    pub stage: StageName,
}

/// Stage names in execution order (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Validate,
    Backup,
    Apply,
    Verify,
    Rollback,
}

impl StageName {
    pub const ORDER: [StageName; 5] = [
        StageName::Validate,
        StageName::Backup,
        StageName::Apply,
        StageName::Verify,
        StageName::Rollback,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Validate => "validate",
            StageName::Backup => "backup",
            StageName::Apply => "apply",
            StageName::Verify => "verify",
            StageName::Rollback => "rollback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Per-stage record under a deployment (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub name: StageName,
    pub state: StageState,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    /// Bounded ring of recent log lines. Capacity enforced by
    /// [`StageResult::push_log`], never by callers.
    pub logs: Vec<String>,
    pub error: Option<StageError>,
    pub artifacts: BTreeMap<String, String>,
}

const MAX_LOG_LINES: usize = 200;

impl StageResult {
    pub fn pending(name: StageName) -> Self {
        Self {
            name,
            state: StageState::Pending,
            started_at: None,
            ended_at: None,
            attempts: 0,
            logs: Vec::new(),
            error: None,
            artifacts: BTreeMap::new(),
        }
    }

    /// Append a log line, dropping the oldest entry once the bounded ring
    /// is full (§3 "logs (bounded ring)").
    pub fn push_log(&mut self, line: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_LINES {
            self.logs.remove(0);
        }
        self.logs.push(line.into());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    pub kind: FailureKind,
    pub message: String,
    pub retriable: bool,
}

/// Rollback bookkeeping surfaced to the caller on failure (§6, §7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub triggered: bool,
    pub completed: bool,
    pub rollback_deployment_id: Option<DeploymentId>,
    pub failed_services: Vec<String>,
}

/// The unit of orchestration (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub repository: Repository,
    pub commit: String,
    pub branch: String,
    pub trigger: Trigger,
    pub parent_deployment_id: Option<DeploymentId>,
    pub initiator: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub state: DeploymentState,
    pub current_stage: Option<StageName>,
    pub stage_results: Vec<StageResult>,
    pub config_hash_before: Option<String>,
    pub config_hash_after: Option<String>,
    pub backup_ref: Option<BackupRef>,
    pub error: Option<DeploymentError>,
    pub rollback_triggered: bool,
    pub rollback_of: Option<DeploymentId>,
    /// Whether the backup stage runs at all (§4.10 "unless configuration
    /// declares create_backup=false"). Always `true` for webhook triggers.
    pub create_backup: bool,
    /// Whether the verify stage's health evaluation runs. Always `false`
    /// for webhook triggers.
    pub skip_health_check: bool,
    /// Optimistic-concurrency stamp used by the store's CAS update (§4.4).
    pub version: u64,
}

impl Deployment {
    pub fn new_webhook(
        id: DeploymentId,
        repository: Repository,
        commit: String,
        branch: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            repository,
            commit,
            branch,
            trigger: Trigger::Webhook,
            parent_deployment_id: None,
            initiator: "webhook".to_string(),
            reason: Some("automated".to_string()),
            created_at: now,
            started_at: None,
            ended_at: None,
            state: DeploymentState::Pending,
            current_stage: None,
            stage_results: Vec::new(),
            config_hash_before: None,
            config_hash_after: None,
            backup_ref: None,
            error: None,
            rollback_triggered: false,
            rollback_of: None,
            create_backup: true,
            skip_health_check: false,
            version: 0,
        }
    }

    /// A deployment initiated via the manual-trigger inbound contract
    /// (§6 "Inbound: manual deployment").
    #[allow(clippy::too_many_arguments)]
    pub fn new_manual(
        id: DeploymentId,
        repository: Repository,
        commit: String,
        branch: String,
        reason: String,
        initiator: String,
        create_backup: bool,
        skip_health_check: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            repository,
            commit,
            branch,
            trigger: Trigger::Manual,
            parent_deployment_id: None,
            initiator,
            reason: Some(reason),
            created_at: now,
            started_at: None,
            ended_at: None,
            state: DeploymentState::Pending,
            current_stage: None,
            stage_results: Vec::new(),
            config_hash_before: None,
            config_hash_after: None,
            backup_ref: None,
            error: None,
            rollback_triggered: false,
            rollback_of: None,
            create_backup,
            skip_health_check,
            version: 0,
        }
    }

    /// A rollback sub-deployment, itself following the same DAG from
    /// `Pending` (§4.10 "rollback sub-deployments ... themselves following
    /// this same DAG").
    pub fn new_rollback(
        id: DeploymentId,
        parent: &Deployment,
        initiator: String,
        reason: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            repository: parent.repository.clone(),
            commit: parent.commit.clone(),
            branch: parent.branch.clone(),
            trigger: Trigger::Rollback,
            parent_deployment_id: Some(parent.id.clone()),
            initiator,
            reason: Some(reason),
            created_at: now,
            started_at: None,
            ended_at: None,
            state: DeploymentState::Pending,
            current_stage: None,
            stage_results: Vec::new(),
            config_hash_before: parent.config_hash_before.clone(),
            config_hash_after: None,
            backup_ref: parent.backup_ref.clone(),
            error: None,
            rollback_triggered: false,
            rollback_of: Some(parent.id.clone()),
            create_backup: false,
            skip_health_check: parent.skip_health_check,
            version: 0,
        }
    }

    /// Repository + commit + webhook-trigger identity used for "at most one
    /// active deployment" matching (§3 invariant).
    pub fn webhook_identity(&self) -> Option<(&Repository, &str)> {
        matches!(self.trigger, Trigger::Webhook).then_some((&self.repository, self.commit.as_str()))
    }

    /// Validate and apply a state transition, bumping the version. Returns
    /// `Err` (caller maps to `Error::Conflict`/`Internal`) if the edge is
    /// illegal or the deployment is already terminal.
    pub fn transition(&mut self, next: DeploymentState) -> Result<(), String> {
        // `can_transition_to` already encodes terminality for every state
        // except `Failed`, which has exactly one legal outgoing edge
        // (`RollingBack`, §4.10) despite `is_terminal()` treating `Failed`
        // as terminal for concurrency/reporting purposes.
        if !self.state.can_transition_to(next) {
            return Err(format!(
                "illegal transition for deployment {}: {:?} -> {:?}",
                self.id, self.state, next
            ));
        }
        self.state = next;
        self.version += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_dag_is_legal() {
        use DeploymentState::*;
        let mut d = Deployment::new_webhook(
            DeploymentId::new("d1"),
            Repository::new("owner/r"),
            "abc123".into(),
            "main".into(),
            Utc::now(),
        );
        for next in [Validating, BackingUp, Applying, Verifying, Completed] {
            d.transition(next).expect("legal edge");
        }
        assert!(d.state.is_terminal());
    }

    #[test]
    fn terminal_state_never_advances() {
        let mut d = Deployment::new_webhook(
            DeploymentId::new("d1"),
            Repository::new("owner/r"),
            "abc123".into(),
            "main".into(),
            Utc::now(),
        );
        d.transition(DeploymentState::Validating).unwrap();
        d.transition(DeploymentState::Failed).unwrap();
        assert!(d.transition(DeploymentState::RollingBack).is_ok());
        d.transition(DeploymentState::Completed).unwrap();
        assert!(d.state.is_terminal());
        assert!(d.transition(DeploymentState::RollingBack).is_err());
    }

    #[test]
    fn cancel_only_legal_from_pending_or_verifying() {
        let mut d = Deployment::new_webhook(
            DeploymentId::new("d1"),
            Repository::new("owner/r"),
            "abc123".into(),
            "main".into(),
            Utc::now(),
        );
        assert!(d.state.can_transition_to(DeploymentState::Cancelled));
        d.transition(DeploymentState::Validating).unwrap();
        assert!(!d.state.can_transition_to(DeploymentState::Cancelled));
        d.transition(DeploymentState::BackingUp).unwrap();
        d.transition(DeploymentState::Applying).unwrap();
        d.transition(DeploymentState::Verifying).unwrap();
        assert!(d.state.can_transition_to(DeploymentState::Cancelled));
    }

    #[test]
    fn rollback_failed_is_terminal() {
        let mut d = Deployment::new_webhook(
            DeploymentId::new("d1"),
            Repository::new("owner/r"),
            "abc123".into(),
            "main".into(),
            Utc::now(),
        );
        for next in [
            DeploymentState::Validating,
            DeploymentState::BackingUp,
            DeploymentState::Applying,
            DeploymentState::Verifying,
            DeploymentState::Failed,
            DeploymentState::RollingBack,
        ] {
            d.transition(next).unwrap();
        }
        d.transition(DeploymentState::Failed).unwrap();
        assert!(d.state.is_terminal());
    }
}
