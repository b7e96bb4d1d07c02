use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use pipelinectl_types::deployment::{Deployment, DeploymentState, StageResult, Trigger};
use pipelinectl_types::health::HealthReport;
use pipelinectl_types::ids::DeploymentId;
use pipelinectl_types::prediction::FailurePrediction;
use pipelinectl_types::audit::AuditEvent;
use pipelinectl_types::{Error, Repository, Result};

use crate::{AuditFilters, ClaimOutcome, HistoryFilters, Store};

#[derive(Default)]
struct State {
    deployments: HashMap<DeploymentId, Deployment>,
    active_claims: HashMap<Repository, DeploymentId>,
    health_reports: HashMap<Repository, Vec<HealthReport>>,
    predictions: HashMap<Repository, Vec<FailurePrediction>>,
    audit: Vec<AuditEvent>,
}

/// In-memory reference implementation of [`Store`]. Sufficient to run the
/// orchestrator and monitor standalone, and to exercise the whole crate in
/// tests; a durable backend swaps in behind the same trait.
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("pipelinectl-store mutex poisoned")
    }
}

impl Store for InMemoryStore {
    fn put_deployment(&self, deployment: Deployment) -> Result<()> {
        let mut st = self.lock();
        st.deployments.insert(deployment.id.clone(), deployment);
        Ok(())
    }

    fn update_deployment(&self, deployment: Deployment, expected_version: u64) -> Result<()> {
        let mut st = self.lock();
        match st.deployments.get(&deployment.id) {
            None => Err(Error::NotFound(format!("deployment {} not found", deployment.id))),
            Some(existing) if existing.version != expected_version => Err(Error::Conflict(format!(
                "deployment {} version mismatch: expected {}, found {}",
                deployment.id, expected_version, existing.version
            ))),
            Some(_) => {
                st.deployments.insert(deployment.id.clone(), deployment);
                Ok(())
            }
        }
    }

    fn append_stage_result(&self, deployment_id: &DeploymentId, stage: StageResult) -> Result<()> {
        let mut st = self.lock();
        let deployment = st
            .deployments
            .get_mut(deployment_id)
            .ok_or_else(|| Error::NotFound(format!("deployment {deployment_id} not found")))?;
        if deployment.state.is_terminal() {
            return Err(Error::Conflict(format!(
                "deployment {deployment_id} is terminal; cannot append stage result"
            )));
        }
        if let Some(existing) = deployment.stage_results.iter_mut().find(|s| s.name == stage.name) {
            *existing = stage;
        } else {
            deployment.stage_results.push(stage);
        }
        Ok(())
    }

    fn lookup_deployment_by_id(&self, id: &DeploymentId) -> Result<Option<Deployment>> {
        Ok(self.lock().deployments.get(id).cloned())
    }

    fn query_history(&self, filters: &HistoryFilters, limit: usize, offset: usize) -> Result<Vec<Deployment>> {
        let st = self.lock();
        let mut matches: Vec<Deployment> = st
            .deployments
            .values()
            .filter(|d| filters.repository.as_ref().is_none_or(|r| *r == d.repository))
            .filter(|d| filters.state.is_none_or(|s| s == d.state))
            .filter(|d| filters.since.is_none_or(|since| d.created_at >= since))
            .cloned()
            .collect();
        matches.sort_by_key(|d| d.created_at);
        matches.reverse();
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }

    fn claim_active(&self, repository: &Repository, deployment_id: &DeploymentId) -> Result<ClaimOutcome> {
        let mut st = self.lock();
        if let Some(existing) = st.active_claims.get(repository) {
            if existing == deployment_id {
                return Ok(ClaimOutcome::Claimed);
            }
            return Ok(ClaimOutcome::Busy { active_deployment_id: existing.clone() });
        }
        st.active_claims.insert(repository.clone(), deployment_id.clone());
        Ok(ClaimOutcome::Claimed)
    }

    fn release_active(&self, repository: &Repository, deployment_id: &DeploymentId) -> Result<()> {
        let mut st = self.lock();
        if st.active_claims.get(repository) == Some(deployment_id) {
            st.active_claims.remove(repository);
        }
        Ok(())
    }

    fn find_recent_webhook_deployment(
        &self,
        repository: &Repository,
        commit: &str,
        within: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<DeploymentId>> {
        let st = self.lock();
        let cutoff = now - within;
        let mut candidates: Vec<&Deployment> = st
            .deployments
            .values()
            .filter(|d| d.trigger == Trigger::Webhook)
            .filter(|d| d.repository == *repository && d.commit == commit)
            .filter(|d| d.created_at >= cutoff)
            .filter(|d| !matches!(d.state, DeploymentState::Cancelled))
            .collect();
        candidates.sort_by_key(|d| d.created_at);
        Ok(candidates.last().map(|d| d.id.clone()))
    }

    fn put_health_report(&self, report: HealthReport) -> Result<()> {
        let mut st = self.lock();
        st.health_reports.entry(report.repository.clone()).or_default().push(report);
        Ok(())
    }

    fn latest_health_report(&self, repository: &Repository) -> Result<Option<HealthReport>> {
        Ok(self.lock().health_reports.get(repository).and_then(|v| v.last().cloned()))
    }

    fn put_prediction(&self, prediction: FailurePrediction) -> Result<()> {
        let mut st = self.lock();
        st.predictions.entry(prediction.repository.clone()).or_default().push(prediction);
        Ok(())
    }

    fn latest_prediction(&self, repository: &Repository) -> Result<Option<FailurePrediction>> {
        Ok(self.lock().predictions.get(repository).and_then(|v| v.last().cloned()))
    }

    fn append_audit(&self, event: AuditEvent) -> Result<()> {
        self.lock().audit.push(event);
        Ok(())
    }

    fn query_audit(&self, filters: &AuditFilters, limit: usize, offset: usize) -> Result<Vec<AuditEvent>> {
        let st = self.lock();
        let mut matches: Vec<AuditEvent> = st
            .audit
            .iter()
            .filter(|e| filters.actor.as_deref().is_none_or(|a| a == e.actor))
            .filter(|e| filters.action.as_deref().is_none_or(|a| a == e.action))
            .filter(|e| filters.resource_kind.as_deref().is_none_or(|k| e.resource.starts_with(k)))
            .filter(|e| filters.since.is_none_or(|s| e.timestamp >= s))
            .filter(|e| filters.until.is_none_or(|u| e.timestamp <= u))
            .cloned()
            .collect();
        matches.sort_by_key(|e| e.timestamp);
        matches.reverse();
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }
}
