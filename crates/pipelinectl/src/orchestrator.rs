//! Deployment Orchestrator (C10, §4.10): drives a [`Deployment`] through its
//! state machine with at-most-one active deployment per repository, retry
//! with backoff per stage, and bounded rollback on failure.
//!
//! A rollback is itself a `Deployment` record (`trigger = Rollback`) driven
//! through the exact same state machine: its `apply` stage restores the
//! parent's backup instead of invoking the applier, and its `backup` stage
//! is always skipped (§4.10 "rollback sub-deployments ... themselves
//! following this same DAG from `Pending`").

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use pipelinectl_store::ClaimOutcome;
use pipelinectl_types::audit::AuditResult;
use pipelinectl_types::collaborators::{AlertLevel as SinkAlertLevel, ApplyOutcome, RestoreOutcome};
use pipelinectl_types::deployment::{
    Deployment, DeploymentError, DeploymentState, FailureKind, RollbackOutcome, StageError, StageName, StageResult, StageState,
    Trigger,
};
use pipelinectl_types::event::DeploymentEvent;
use pipelinectl_types::health::HealthStatus;
use pipelinectl_types::ids::{BackupRef, DeploymentId};
use pipelinectl_types::{Error, Repository, Result};

use crate::audit;
use crate::deps::Deps;
use crate::requests::{ManualDeploymentRequest, RollbackRequest};

/// What [`Orchestrator::trigger_deployment`] did with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// The repository's single active-deployment slot was already held;
    /// the caller's deployment record stays `pending` (§4.10, §8 invariant #1).
    AlreadyActive { active_deployment_id: DeploymentId },
}

enum StageOutcome {
    Validated,
    BackedUp(BackupRef),
    Applied,
    Verified,
}

/// Owned, thread-portable snapshot of the fields a stage closure needs;
/// never the `Deployment` itself, so a stage can run on its own thread
/// under a wall-clock budget (§5) without the orchestrator blocking on it
/// past that budget.
#[derive(Clone)]
struct StageInputs {
    deps: Arc<Deps>,
    repository: Repository,
    commit: String,
    branch: String,
    skip_health_check: bool,
    backup_ref: Option<BackupRef>,
}

/// Substrings that fail the validate stage's content scan (§4.10 "forbidden
/// patterns, hardcoded credentials, path-traversal attempts"). Applied to
/// the textual surfaces the orchestrator itself controls (commit, branch);
/// scanning the full config payload happens at the applier boundary, which
/// this crate treats as opaque (§1).
const FORBIDDEN_PATTERNS: [(&str, &str); 3] = [
    ("../", "path traversal sequence"),
    ("BEGIN PRIVATE KEY", "embedded private key"),
    ("AKIA", "hardcoded AWS access key"),
];

fn scan_forbidden_patterns(text: &str) -> Vec<String> {
    FORBIDDEN_PATTERNS
        .iter()
        .filter(|(pattern, _)| text.contains(pattern))
        .map(|(_, label)| label.to_string())
        .collect()
}

fn do_validate(inputs: &StageInputs) -> Result<StageOutcome> {
    if inputs.repository.as_str().trim().is_empty() {
        return Err(Error::Validation("repository is empty".to_string()));
    }
    if inputs.commit.trim().is_empty() {
        return Err(Error::Validation("commit is empty".to_string()));
    }
    if inputs.branch.trim().is_empty() {
        return Err(Error::Validation("branch is empty".to_string()));
    }
    let mut findings = scan_forbidden_patterns(&inputs.commit);
    findings.extend(scan_forbidden_patterns(&inputs.branch));
    if !findings.is_empty() {
        return Err(Error::Validation(format!("forbidden pattern(s) detected: {}", findings.join(", "))));
    }
    Ok(StageOutcome::Validated)
}

fn do_backup(inputs: &StageInputs) -> Result<StageOutcome> {
    let backup_ref = inputs.deps.backup.create(&inputs.repository, &inputs.commit)?;
    Ok(StageOutcome::BackedUp(backup_ref))
}

fn do_apply(inputs: &StageInputs) -> Result<StageOutcome> {
    match inputs.deps.applier.apply(&inputs.repository, &inputs.commit)? {
        ApplyOutcome::Ok => Ok(StageOutcome::Applied),
        ApplyOutcome::Failed { kind, message } => Err(Error::ApplyFailed(format!("{kind}: {message}"))),
    }
}

/// The rollback sub-deployment's `apply` stage: restore the parent's
/// backup instead of invoking the applier.
fn do_restore(inputs: &StageInputs) -> Result<StageOutcome> {
    let backup_ref = inputs.backup_ref.as_ref().ok_or_else(|| Error::RollbackFailed("no backup to restore".to_string()))?;
    match inputs.deps.backup.restore(backup_ref)? {
        RestoreOutcome::Ok => Ok(StageOutcome::Applied),
        RestoreOutcome::Partial { failed_services } => {
            Err(Error::RollbackFailed(format!("partial restore, failed services: {}", failed_services.join(", "))))
        }
        RestoreOutcome::Failed { failed_services } => {
            Err(Error::RollbackFailed(format!("restore failed, services: {}", failed_services.join(", "))))
        }
    }
}

fn do_verify(inputs: &StageInputs) -> Result<StageOutcome> {
    if inputs.skip_health_check {
        return Ok(StageOutcome::Verified);
    }
    let snapshot = inputs.deps.target_health.check(&inputs.repository)?;
    if !snapshot.healthy {
        return Err(Error::HealthCheckFailed(format!("target service reports unhealthy (version {:?})", snapshot.version)));
    }
    let report = inputs.deps.health_checker.evaluate(&inputs.repository);
    if matches!(report.status, HealthStatus::Critical) {
        return Err(Error::HealthCheckFailed(format!("post-deploy health score {:.1} is critical", report.score)));
    }
    Ok(StageOutcome::Verified)
}

fn stage_for_state(state: DeploymentState) -> Option<StageName> {
    match state {
        DeploymentState::Validating => Some(StageName::Validate),
        DeploymentState::BackingUp => Some(StageName::Backup),
        DeploymentState::Applying => Some(StageName::Apply),
        DeploymentState::Verifying => Some(StageName::Verify),
        DeploymentState::RollingBack => Some(StageName::Rollback),
        _ => None,
    }
}

fn failure_kind_for_stage(stage: StageName) -> FailureKind {
    match stage {
        StageName::Validate => FailureKind::Validation,
        StageName::Backup => FailureKind::BackupFailed,
        StageName::Apply => FailureKind::ApplyFailed,
        StageName::Verify => FailureKind::HealthCheckFailed,
        StageName::Rollback => FailureKind::RollbackFailed,
    }
}

fn retry_policy_for(deps: &Deps, stage: StageName) -> pipelinectl_retry::RetryPolicy {
    match stage {
        // Validate/backup/rollback default to 0 retries (§4.10).
        StageName::Validate | StageName::Backup | StageName::Rollback => pipelinectl_retry::RetryPolicy::none(),
        StageName::Apply | StageName::Verify => pipelinectl_retry::RetryPolicy {
            max_attempts: deps.config.retry_policy.max_attempts,
            base_delay: deps.config.retry_policy.base_backoff,
            max_delay: deps.config.retry_policy.max_backoff,
            jitter: deps.config.retry_policy.jitter_fraction,
        },
    }
}

fn run_with_timeout(timeout: Duration, work: Arc<dyn Fn() -> Result<StageOutcome> + Send + Sync>) -> Result<StageOutcome> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(work());
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout),
    }
}

pub struct Orchestrator {
    deps: Arc<Deps>,
}

impl Orchestrator {
    pub fn new(deps: Arc<Deps>) -> Self {
        Self { deps }
    }

    pub fn submit_manual_deployment(&self, request: &ManualDeploymentRequest) -> Result<DeploymentId> {
        request.validate()?;
        let id = DeploymentId::generate(rand::random());
        let deployment = Deployment::new_manual(
            id.clone(),
            Repository::new(request.repository.clone()),
            request.resolved_commit(),
            request.branch.clone(),
            request.reason.clone(),
            request.triggered_by.clone(),
            request.create_backup,
            request.skip_health_check,
            Utc::now(),
        );
        self.deps.store.put_deployment(deployment)?;
        audit::record_manual_trigger(
            &*self.deps.store,
            &request.triggered_by,
            &id,
            serde_json::json!({ "repository": request.repository, "branch": request.branch }),
        )?;
        self.trigger_deployment(id.clone())?;
        Ok(id)
    }

    /// §6 "Inbound: rollback": validates the target is an existing,
    /// terminal deployment, then drives a fresh rollback sub-deployment
    /// through the same claim/state-machine path as any other trigger.
    pub fn submit_rollback(&self, request: &RollbackRequest) -> Result<DeploymentId> {
        request.validate()?;
        let target_id = DeploymentId::new(request.deployment_id.clone());
        let target = self
            .deps
            .store
            .lookup_deployment_by_id(&target_id)?
            .ok_or_else(|| Error::NotFound(target_id.to_string()))?;
        if !target.state.is_terminal() {
            return Err(Error::Validation(format!(
                "deployment {target_id} is not terminal (state {:?})",
                target.state
            )));
        }
        let rollback_id = DeploymentId::generate(rand::random());
        let rollback_deployment = Deployment::new_rollback(rollback_id.clone(), &target, "operator".to_string(), request.reason.clone(), Utc::now());
        self.deps.store.put_deployment(rollback_deployment)?;
        audit::record_rollback(
            &*self.deps.store,
            "operator",
            "rollback:manual_trigger",
            &target_id,
            AuditResult::Success,
            serde_json::json!({ "rollback_deployment_id": rollback_id.to_string() }),
        )?;
        self.trigger_deployment(rollback_id.clone())?;
        Ok(rollback_id)
    }

    /// Claim the repository's active slot and drive an already-persisted,
    /// `pending` deployment to completion. Runs on the calling thread; the
    /// caller (webhook/CLI layer) decides whether to call this from a
    /// spawned worker thread (§4.10 "one OS thread per active deployment").
    pub fn trigger_deployment(&self, deployment_id: DeploymentId) -> Result<TriggerOutcome> {
        let mut deployment = self
            .deps
            .store
            .lookup_deployment_by_id(&deployment_id)?
            .ok_or_else(|| Error::NotFound(deployment_id.to_string()))?;

        match self.deps.store.claim_active(&deployment.repository, &deployment_id)? {
            ClaimOutcome::Busy { active_deployment_id } => Ok(TriggerOutcome::AlreadyActive { active_deployment_id }),
            ClaimOutcome::Claimed => {
                self.deps.deployment_bus.publish(DeploymentEvent::Started {
                    deployment_id: deployment.id.clone(),
                    repository: deployment.repository.clone(),
                });
                deployment.started_at = Some(Utc::now());
                audit::record_deployment(
                    &*self.deps.store,
                    &deployment.initiator.clone(),
                    "deployment:start",
                    &deployment.id,
                    AuditResult::Success,
                    serde_json::json!({ "repository": deployment.repository.as_str(), "trigger": format!("{:?}", deployment.trigger) }),
                )?;

                let result = self.drive(&mut deployment);
                self.deps.store.release_active(&deployment.repository, &deployment_id)?;
                result.map(|()| TriggerOutcome::Started)
            }
        }
    }

    fn stage_inputs(&self, deployment: &Deployment) -> StageInputs {
        StageInputs {
            deps: Arc::clone(&self.deps),
            repository: deployment.repository.clone(),
            commit: deployment.commit.clone(),
            branch: deployment.branch.clone(),
            skip_health_check: deployment.skip_health_check,
            backup_ref: deployment.backup_ref.clone(),
        }
    }

    /// Drives `deployment` from its current state through to a terminal
    /// state. Used for both ordinary deployments and rollback
    /// sub-deployments: when `deployment.trigger == Trigger::Rollback`, the
    /// `apply` stage restores the backup instead of invoking the applier,
    /// and the `backup` stage is always skipped.
    fn drive(&self, deployment: &mut Deployment) -> Result<()> {
        let is_rollback = matches!(deployment.trigger, Trigger::Rollback);
        let inputs = self.stage_inputs(deployment);

        self.transition(deployment, DeploymentState::Validating)?;
        if let Err(e) = self.execute_stage(deployment, StageName::Validate, {
            let inputs = inputs.clone();
            Arc::new(move || do_validate(&inputs))
        }) {
            return self.fail(deployment, FailureKind::Validation, e, false);
        }

        self.transition(deployment, DeploymentState::BackingUp)?;
        if is_rollback || !deployment.create_backup {
            self.skip_stage(deployment, StageName::Backup)?;
        } else {
            match self.execute_stage(deployment, StageName::Backup, {
                let inputs = inputs.clone();
                Arc::new(move || do_backup(&inputs))
            }) {
                Ok(StageOutcome::BackedUp(backup_ref)) => {
                    deployment.config_hash_before = Some(backup_ref.as_str().to_string());
                    deployment.backup_ref = Some(backup_ref);
                    self.persist(deployment)?;
                }
                Ok(_) => unreachable!("backup stage always returns StageOutcome::BackedUp"),
                Err(e) => return self.fail(deployment, FailureKind::BackupFailed, e, false),
            }
        }

        self.transition(deployment, DeploymentState::Applying)?;
        let apply_inputs = self.stage_inputs(deployment);
        let apply_result = if is_rollback {
            self.execute_stage(deployment, StageName::Apply, Arc::new(move || do_restore(&apply_inputs)))
        } else {
            self.execute_stage(deployment, StageName::Apply, Arc::new(move || do_apply(&apply_inputs)))
        };
        match apply_result {
            Ok(_) => {
                deployment.config_hash_after =
                    if is_rollback { deployment.config_hash_before.clone() } else { Some(deployment.commit.clone()) };
                self.persist(deployment)?;
            }
            Err(e) => {
                let kind = if is_rollback { FailureKind::RollbackFailed } else { FailureKind::ApplyFailed };
                return self.fail(deployment, kind, e, !is_rollback);
            }
        }

        self.transition(deployment, DeploymentState::Verifying)?;
        if deployment.skip_health_check {
            self.skip_stage(deployment, StageName::Verify)?;
        } else {
            let verify_inputs = self.stage_inputs(deployment);
            if let Err(e) = self.execute_stage(deployment, StageName::Verify, Arc::new(move || do_verify(&verify_inputs))) {
                let kind = if is_rollback { FailureKind::RollbackFailed } else { FailureKind::HealthCheckFailed };
                return self.fail(deployment, kind, e, !is_rollback);
            }
        }

        self.transition(deployment, DeploymentState::Completed)?;
        deployment.ended_at = Some(Utc::now());
        self.persist(deployment)?;
        self.deps.deployment_bus.publish(DeploymentEvent::Completed { deployment_id: deployment.id.clone() });
        self.audit_deployment("deployment:complete", deployment, AuditResult::Success);
        Ok(())
    }

    /// Run one stage's work under its retry policy and wall-clock timeout,
    /// recording a `StageResult` per attempt and a `stage-update` event per
    /// transition (§4.10, §3 "logs").
    fn execute_stage(
        &self,
        deployment: &mut Deployment,
        stage: StageName,
        work: Arc<dyn Fn() -> Result<StageOutcome> + Send + Sync>,
    ) -> Result<StageOutcome> {
        let policy = retry_policy_for(&self.deps, stage);
        let timeout = if stage == StageName::Rollback { self.deps.config.rollback_budget } else { self.deps.config.stage_timeout(stage) };
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let started_at = Utc::now();
            let mut running = StageResult::pending(stage);
            running.state = StageState::Running;
            running.started_at = Some(started_at);
            running.attempts = attempt;
            self.deps.store.append_stage_result(&deployment.id, running)?;
            self.deps
                .deployment_bus
                .publish(DeploymentEvent::StageUpdate { deployment_id: deployment.id.clone(), stage, state: StageState::Running });

            match run_with_timeout(timeout, Arc::clone(&work)) {
                Ok(outcome) => {
                    let mut completed = StageResult::pending(stage);
                    completed.state = StageState::Completed;
                    completed.started_at = Some(started_at);
                    completed.ended_at = Some(Utc::now());
                    completed.attempts = attempt;
                    self.deps.store.append_stage_result(&deployment.id, completed)?;
                    self.deps
                        .deployment_bus
                        .publish(DeploymentEvent::StageUpdate { deployment_id: deployment.id.clone(), stage, state: StageState::Completed });
                    return Ok(outcome);
                }
                Err(e) => {
                    let retriable = e.retriable();
                    if pipelinectl_retry::should_retry(&policy, retriable, attempt) {
                        thread::sleep(pipelinectl_retry::calculate_delay(&policy, attempt));
                        continue;
                    }
                    let mut failed = StageResult::pending(stage);
                    failed.state = StageState::Failed;
                    failed.started_at = Some(started_at);
                    failed.ended_at = Some(Utc::now());
                    failed.attempts = attempt;
                    failed.error = Some(StageError { kind: failure_kind_for_stage(stage), message: e.to_string(), retriable });
                    self.deps.store.append_stage_result(&deployment.id, failed)?;
                    self.deps
                        .deployment_bus
                        .publish(DeploymentEvent::StageUpdate { deployment_id: deployment.id.clone(), stage, state: StageState::Failed });
                    return Err(e);
                }
            }
        }
    }

    fn skip_stage(&self, deployment: &Deployment, stage: StageName) -> Result<()> {
        let mut skipped = StageResult::pending(stage);
        skipped.state = StageState::Skipped;
        self.deps.store.append_stage_result(&deployment.id, skipped)?;
        self.deps
            .deployment_bus
            .publish(DeploymentEvent::StageUpdate { deployment_id: deployment.id.clone(), stage, state: StageState::Skipped });
        Ok(())
    }

    /// Apply a legal state transition and persist it via CAS; on a version
    /// conflict, reload and re-validate the edge is still legal before
    /// retrying once (§4.10 "a conflict is resolved by reloading and
    /// re-validating the transition legality").
    fn transition(&self, deployment: &mut Deployment, next: DeploymentState) -> Result<()> {
        let expected_version = deployment.version;
        deployment.transition(next).map_err(Error::Validation)?;
        deployment.current_stage = stage_for_state(next);

        match self.deps.store.update_deployment(deployment.clone(), expected_version) {
            Ok(()) => Ok(()),
            Err(Error::Conflict(_)) => {
                let mut reloaded = self
                    .deps
                    .store
                    .lookup_deployment_by_id(&deployment.id)?
                    .ok_or_else(|| Error::NotFound(deployment.id.to_string()))?;
                if !reloaded.state.can_transition_to(next) {
                    return Err(pipelinectl_store::conflict(format!(
                        "deployment {} no longer transitionable to {:?} after reload (now {:?})",
                        deployment.id, next, reloaded.state
                    )));
                }
                let reload_expected = reloaded.version;
                reloaded.transition(next).map_err(Error::Validation)?;
                reloaded.current_stage = stage_for_state(next);
                self.deps.store.update_deployment(reloaded.clone(), reload_expected)?;
                *deployment = reloaded;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Persist field mutations that didn't change `state` (no version
    /// bump needed beyond what the preceding `transition` already wrote).
    fn persist(&self, deployment: &Deployment) -> Result<()> {
        self.deps.store.update_deployment(deployment.clone(), deployment.version)
    }

    fn audit_deployment(&self, action: &str, deployment: &Deployment, result: AuditResult) {
        if let Err(e) = audit::record_deployment(
            &*self.deps.store,
            &deployment.initiator,
            action,
            &deployment.id,
            result,
            serde_json::json!({ "state": format!("{:?}", deployment.state), "repository": deployment.repository.as_str() }),
        ) {
            warn!(deployment_id = %deployment.id, error = %e, "failed to record audit event");
        }
    }

    fn fail(&self, deployment: &mut Deployment, kind: FailureKind, err: Error, attempt_rollback: bool) -> Result<()> {
        let stage = deployment.current_stage.unwrap_or(StageName::Validate);
        deployment.error = Some(DeploymentError { kind, message: err.to_string(), retriable: err.retriable(), stage });
        if attempt_rollback && deployment.backup_ref.is_some() {
            deployment.rollback_triggered = true;
        }
        self.transition(deployment, DeploymentState::Failed)?;
        deployment.ended_at = Some(Utc::now());
        self.persist(deployment)?;
        self.deps
            .deployment_bus
            .publish(DeploymentEvent::Failed { deployment_id: deployment.id.clone(), error: deployment.error.clone().unwrap() });
        self.audit_deployment("deployment:failed", deployment, AuditResult::Failure);

        if attempt_rollback && deployment.backup_ref.is_some() {
            self.transition(deployment, DeploymentState::RollingBack)?;
            let outcome = self.run_rollback(deployment)?;
            self.deps.deployment_bus.publish(DeploymentEvent::RollbackCompleted {
                deployment_id: deployment.id.clone(),
                rollback_deployment_id: outcome.rollback_deployment_id.clone().unwrap_or_else(|| DeploymentId::new("unknown")),
                outcome: outcome.clone(),
            });
            if outcome.completed {
                self.transition(deployment, DeploymentState::Completed)?;
                deployment.ended_at = Some(Utc::now());
                self.persist(deployment)?;
                self.deps.deployment_bus.publish(DeploymentEvent::Completed { deployment_id: deployment.id.clone() });
                self.audit_deployment("deployment:rollback-complete", deployment, AuditResult::Success);
            } else {
                self.notify_rollback_incomplete(deployment, &outcome);
                deployment.error = Some(DeploymentError {
                    kind: FailureKind::RollbackFailed,
                    message: format!("rollback did not complete, failed services: {}", outcome.failed_services.join(", ")),
                    retriable: false,
                    stage: StageName::Rollback,
                });
                self.transition(deployment, DeploymentState::Failed)?;
                deployment.ended_at = Some(Utc::now());
                self.persist(deployment)?;
                self.deps.deployment_bus.publish(DeploymentEvent::Failed {
                    deployment_id: deployment.id.clone(),
                    error: deployment.error.clone().unwrap(),
                });
                self.audit_deployment("deployment:rollback-failed", deployment, AuditResult::Failure);
            }
        }
        Ok(())
    }

    /// Create and drive the rollback sub-deployment, bounded in aggregate
    /// by `rollback_budget` (§4.10). The driver thread is detached on
    /// timeout: it cannot be safely killed, only its result discarded, the
    /// same trade-off `pipelinectl-health`'s dimension timeout makes.
    fn run_rollback(&self, parent: &mut Deployment) -> Result<RollbackOutcome> {
        let Some(_backup_ref) = parent.backup_ref.clone() else {
            return Ok(RollbackOutcome { triggered: false, completed: false, rollback_deployment_id: None, failed_services: Vec::new() });
        };

        let rollback_id = DeploymentId::generate(rand::random());
        let rollback_deployment = Deployment::new_rollback(
            rollback_id.clone(),
            parent,
            "orchestrator".to_string(),
            "automatic rollback after stage failure".to_string(),
            Utc::now(),
        );
        self.deps.store.put_deployment(rollback_deployment.clone())?;
        self.deps
            .deployment_bus
            .publish(DeploymentEvent::RollbackInitiated { deployment_id: parent.id.clone(), rollback_deployment_id: rollback_id.clone() });
        audit::record_rollback(
            &*self.deps.store,
            "orchestrator",
            "rollback:initiate",
            &parent.id,
            AuditResult::Success,
            serde_json::json!({ "rollback_deployment_id": rollback_id.to_string() }),
        )?;

        let budget = self.deps.config.rollback_budget;
        let orchestrator = Orchestrator { deps: Arc::clone(&self.deps) };
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut d = rollback_deployment;
            let result = orchestrator.drive(&mut d);
            let _ = tx.send((d, result));
        });

        let (rollback_deployment, drive_result) = match rx.recv_timeout(budget) {
            Ok(pair) => pair,
            Err(_) => {
                audit::record_rollback(
                    &*self.deps.store,
                    "orchestrator",
                    "rollback:timeout",
                    &parent.id,
                    AuditResult::Failure,
                    serde_json::json!({ "rollback_deployment_id": rollback_id.to_string() }),
                )?;
                return Ok(RollbackOutcome {
                    triggered: true,
                    completed: false,
                    rollback_deployment_id: Some(rollback_id),
                    failed_services: vec!["rollback exceeded its budget".to_string()],
                });
            }
        };

        let completed = matches!(rollback_deployment.state, DeploymentState::Completed);
        let failed_services = if completed {
            Vec::new()
        } else {
            rollback_deployment.error.as_ref().map(|e| vec![e.message.clone()]).unwrap_or_default()
        };
        audit::record_rollback(
            &*self.deps.store,
            "orchestrator",
            "rollback:complete",
            &parent.id,
            if completed { AuditResult::Success } else { AuditResult::Failure },
            serde_json::json!({ "rollback_deployment_id": rollback_id.to_string(), "ok": drive_result.is_ok() }),
        )?;
        Ok(RollbackOutcome { triggered: true, completed, rollback_deployment_id: Some(rollback_id), failed_services })
    }

    fn notify_rollback_incomplete(&self, deployment: &Deployment, outcome: &RollbackOutcome) {
        let message = format!("rollback for {} did not complete cleanly: {:?}", deployment.id, outcome.failed_services);
        match &self.deps.notifications {
            Some(sink) => sink.alert(SinkAlertLevel::Critical, "rollback incomplete", &message, serde_json::json!({ "deployment_id": deployment.id.to_string() })),
            None => warn!(deployment_id = %deployment.id, "{}", message),
        }
    }
}
