//! Output of the Anomaly Detector's ensemble (§3, §4.8).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anomaly::Anomaly;
use crate::Repository;

/// A contributing factor to a failure probability, consolidated by kind
/// (maximum impact wins across submodels) and sorted descending by impact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Factor {
    pub kind: String,
    pub impact: f64,
}

/// Snapshot of the features that went into the prediction, for
/// explainability and for deciding when the model cache must be rebuilt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub baseline_failure_rate: f64,
    pub current_hour_failure_rate: Option<f64>,
    pub recent_avg_duration_s: Option<f64>,
    pub historical_success_duration_s: Option<f64>,
    pub duration_trend_relative: Option<f64>,
    pub success_rate_trend_relative: Option<f64>,
    pub max_consecutive_failures: u32,
    /// Always `None`: reserved for a real change-source contract that has
    /// not been supplied (`spec.md` §9 open question 2).
    pub recent_repository_changes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePrediction {
    pub repository: Repository,
    pub timestamp: DateTime<Utc>,
    pub probability: f64,
    pub confidence: f64,
    pub contributing_factors: Vec<Factor>,
    pub recommendations: Vec<String>,
    pub features: FeatureSnapshot,
    pub anomalies: Vec<Anomaly>,
}

/// Per-metric `{mean, stdev}` baseline, refreshed on the baseline-refresh
/// interval (§3, §4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Baseline {
    pub metrics: BTreeMap<String, MeanStdev>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MeanStdev {
    pub mean: f64,
    pub stdev: f64,
}

/// Consolidate per-submodel factors: for each `kind`, keep the maximum
/// impact observed; return sorted descending by impact (§4.8).
pub fn consolidate_factors(raw: Vec<Factor>) -> Vec<Factor> {
    let mut by_kind: BTreeMap<String, f64> = BTreeMap::new();
    for f in raw {
        by_kind
            .entry(f.kind)
            .and_modify(|existing| {
                if f.impact > *existing {
                    *existing = f.impact;
                }
            })
            .or_insert(f.impact);
    }
    let mut out: Vec<Factor> = by_kind
        .into_iter()
        .map(|(kind, impact)| Factor { kind, impact })
        .collect();
    out.sort_by(|a, b| b.impact.partial_cmp(&a.impact).unwrap_or(std::cmp::Ordering::Equal));
    out
}
