//! # pipelinectl-metrics
//!
//! The Metrics Source capability (C6, §4.6): a narrow, object-safe trait
//! the health checker, trend analyzer, and anomaly detector all read
//! through. No implementation lives here beyond [`StaticMetricsSource`], a
//! fixture-backed double for tests; a real CI/CD integration implements
//! [`MetricsSource`] against its own API outside this crate.
//!
//! All methods are idempotent reads (§4.6): repeated calls with the same
//! arguments must return equivalent data, and a missing implementation
//! degrades gracefully rather than failing the caller (§4.6 "tolerates
//! missing implementations").

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pipelinectl_types::pipeline_run::{PipelineRun, QualityMetrics, ReliabilityMetrics};
use pipelinectl_types::Repository;

/// Read-only access to pipeline history and point-in-time quality /
/// reliability metrics (§4.6).
pub trait MetricsSource: Send + Sync {
    /// Runs for `repository` since `since`, oldest first, capped at `limit`.
    /// Must be finite and restartable (§4.6).
    fn pipeline_runs(&self, repository: &Repository, since: DateTime<Utc>, limit: usize) -> Vec<PipelineRun>;

    fn quality_metrics(&self, repository: &Repository) -> Option<QualityMetrics>;

    fn reliability_metrics(&self, repository: &Repository) -> Option<ReliabilityMetrics>;

    /// Repositories this source knows about, used by the monitor's tick
    /// fan-out (§4.9).
    fn monitored_repositories(&self) -> Vec<Repository>;
}

/// Fixed, in-memory [`MetricsSource`] for tests and local experimentation.
/// Holds whatever runs/metrics were inserted; never calls out anywhere.
#[derive(Debug, Default)]
pub struct StaticMetricsSource {
    runs: HashMap<Repository, Vec<PipelineRun>>,
    quality: HashMap<Repository, QualityMetrics>,
    reliability: HashMap<Repository, ReliabilityMetrics>,
}

impl StaticMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runs(mut self, repository: Repository, mut runs: Vec<PipelineRun>) -> Self {
        runs.sort_by_key(|r| r.created_at);
        self.runs.insert(repository, runs);
        self
    }

    pub fn with_quality(mut self, repository: Repository, metrics: QualityMetrics) -> Self {
        self.quality.insert(repository, metrics);
        self
    }

    pub fn with_reliability(mut self, repository: Repository, metrics: ReliabilityMetrics) -> Self {
        self.reliability.insert(repository, metrics);
        self
    }
}

impl MetricsSource for StaticMetricsSource {
    fn pipeline_runs(&self, repository: &Repository, since: DateTime<Utc>, limit: usize) -> Vec<PipelineRun> {
        self.runs
            .get(repository)
            .map(|runs| runs.iter().filter(|r| r.created_at >= since).take(limit).cloned().collect())
            .unwrap_or_default()
    }

    fn quality_metrics(&self, repository: &Repository) -> Option<QualityMetrics> {
        self.quality.get(repository).cloned()
    }

    fn reliability_metrics(&self, repository: &Repository) -> Option<ReliabilityMetrics> {
        self.reliability.get(repository).cloned()
    }

    fn monitored_repositories(&self) -> Vec<Repository> {
        let mut repos: Vec<Repository> = self.runs.keys().cloned().collect();
        repos.sort();
        repos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinectl_types::pipeline_run::Conclusion;

    fn run(repo: &Repository, created_at: DateTime<Utc>, conclusion: Conclusion) -> PipelineRun {
        PipelineRun {
            repository: repo.clone(),
            run_id: format!("{}", created_at.timestamp()),
            workflow: "ci".into(),
            branch: "main".into(),
            created_at,
            started_at: Some(created_at),
            completed_at: Some(created_at),
            conclusion,
            duration_s: Some(120.0),
            queue_time_s: Some(5.0),
            concurrent_runs: 1,
            actor: "test".into(),
        }
    }

    #[test]
    fn pipeline_runs_respects_since_and_limit() {
        let repo = Repository::new("owner/r");
        let t0 = Utc::now();
        let source = StaticMetricsSource::new().with_runs(
            repo.clone(),
            vec![
                run(&repo, t0, Conclusion::Success),
                run(&repo, t0 + chrono::Duration::seconds(1), Conclusion::Failure),
                run(&repo, t0 + chrono::Duration::seconds(2), Conclusion::Success),
            ],
        );
        let runs = source.pipeline_runs(&repo, t0 + chrono::Duration::seconds(1), 10);
        assert_eq!(runs.len(), 2);
    }

    #[test]
    fn unknown_repository_degrades_to_empty_and_none() {
        let source = StaticMetricsSource::new();
        let repo = Repository::new("owner/missing");
        assert!(source.pipeline_runs(&repo, Utc::now(), 10).is_empty());
        assert!(source.quality_metrics(&repo).is_none());
        assert!(source.reliability_metrics(&repo).is_none());
    }

    #[test]
    fn monitored_repositories_are_sorted() {
        let a = Repository::new("owner/a");
        let b = Repository::new("owner/b");
        let source = StaticMetricsSource::new().with_runs(b.clone(), vec![]).with_runs(a.clone(), vec![]);
        assert_eq!(source.monitored_repositories(), vec![a, b]);
    }
}
