//! Immutable time-series input ingested by the Metrics Source (§3, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    InProgress,
    Queued,
}

/// One historical (or in-flight) CI/CD run. Never mutated by the core once
/// ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub repository: Repository,
    pub run_id: String,
    pub workflow: String,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub conclusion: Conclusion,
    pub duration_s: Option<f64>,
    pub queue_time_s: Option<f64>,
    /// Number of runs executing concurrently at the time this one started; always >= 1.
    pub concurrent_runs: u32,
    pub actor: String,
}

/// Point-in-time quality metrics, independently sourced from pipeline runs
/// (§4.5 "Quality" dimension). All fields optional: a missing metric
/// degrades to the dimension default, it never fails evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub test_coverage_percent: Option<f64>,
    pub code_quality_score: Option<f64>,
    pub security_vulnerabilities: Option<u32>,
    pub technical_debt_hours: Option<f64>,
}

/// Point-in-time reliability metrics (§4.5 "Reliability" dimension).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReliabilityMetrics {
    pub flaky_test_count: Option<u32>,
    pub mttr_hours: Option<f64>,
    pub deploy_frequency_per_week: Option<f64>,
    pub change_failure_percent: Option<f64>,
}
