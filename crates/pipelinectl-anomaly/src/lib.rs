//! # pipelinectl-anomaly
//!
//! The Anomaly Detector (C8, §4.8): `predict_failure(repository)` runs a
//! three-submodel ensemble (statistical, trend, pattern) with fixed
//! weights, plus a per-metric z-score baseline check refreshed on its own
//! interval.

mod baseline;
mod ensemble;
mod features;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use pipelinectl_config::AnomalyConfig;
use pipelinectl_metrics::MetricsSource;
use pipelinectl_trend::TrendAnalyzer;
use pipelinectl_types::anomaly;
use pipelinectl_types::prediction::{Baseline, FailurePrediction};
use pipelinectl_types::Repository;

use baseline::BaselineCache;

pub struct AnomalyDetector {
    metrics: Arc<dyn MetricsSource>,
    trend: Arc<TrendAnalyzer>,
    config: AnomalyConfig,
    baseline_cache: BaselineCache,
}

impl AnomalyDetector {
    pub fn new(metrics: Arc<dyn MetricsSource>, trend: Arc<TrendAnalyzer>, config: AnomalyConfig, baseline_refresh: Duration) -> Self {
        Self { metrics, trend, config, baseline_cache: BaselineCache::new(baseline_refresh) }
    }

    /// `predict_failure(repository) -> FailurePrediction` (§4.8).
    pub fn predict_failure(&self, repository: &Repository) -> FailurePrediction {
        let snapshot = features::extract(&*self.metrics, &self.trend, repository);

        let statistical = ensemble::statistical_submodel(&snapshot);
        let trend = ensemble::trend_submodel(&snapshot);
        let pattern = ensemble::pattern_submodel(&snapshot);
        let combined = ensemble::combine(statistical, trend, pattern);

        let baseline = self.baseline_cache.get_or_refresh(repository, || self.compute_baseline(repository));
        let anomalies = self.detect_anomalies(repository, &baseline);

        let recommendations = recommendations_for(&combined.factors);

        FailurePrediction {
            repository: repository.clone(),
            timestamp: Utc::now(),
            probability: combined.probability,
            confidence: combined.confidence,
            contributing_factors: combined.factors,
            recommendations,
            features: snapshot,
            anomalies,
        }
    }

    fn compute_baseline(&self, repository: &Repository) -> Baseline {
        let since = Utc::now() - chrono::Duration::days(30);
        let runs = self.metrics.pipeline_runs(repository, since, 100_000);
        let durations: Vec<f64> = runs.iter().filter_map(|r| r.duration_s).collect();
        let queue_times: Vec<f64> = runs.iter().filter_map(|r| r.queue_time_s).collect();

        let mut metrics = std::collections::BTreeMap::new();
        metrics.insert("duration".to_string(), baseline::mean_stdev(&durations));
        metrics.insert("queue_time".to_string(), baseline::mean_stdev(&queue_times));
        Baseline { metrics }
    }

    fn detect_anomalies(&self, repository: &Repository, baseline: &Baseline) -> Vec<pipelinectl_types::anomaly::Anomaly> {
        let since = Utc::now() - chrono::Duration::days(1);
        let recent_runs = self.metrics.pipeline_runs(repository, since, 1_000);

        let mut out = Vec::new();
        for run in &recent_runs {
            if let (Some(duration), Some(stats)) = (run.duration_s, baseline.metrics.get("duration")) {
                if let Some(a) = anomaly::detect("duration", duration, stats.mean, stats.stdev, self.config.z_threshold) {
                    out.push(a);
                }
            }
            if let (Some(queue_time), Some(stats)) = (run.queue_time_s, baseline.metrics.get("queue_time")) {
                if let Some(a) = anomaly::detect("queue_time", queue_time, stats.mean, stats.stdev, self.config.z_threshold) {
                    out.push(a);
                }
            }
        }
        out
    }
}

fn recommendations_for(factors: &[pipelinectl_types::prediction::Factor]) -> Vec<String> {
    factors
        .iter()
        .map(|f| match f.kind.as_str() {
            "temporal-pattern" => "investigate why failures cluster at this hour of day".to_string(),
            "duration-increase" => "investigate recent slowdowns before the next deployment".to_string(),
            "success-rate-decline" => "review recent changes; success rate is trending down".to_string(),
            "consecutive-failures" => "address the root cause of repeated consecutive failures".to_string(),
            other => format!("investigate contributing factor: {other}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinectl_metrics::StaticMetricsSource;
    use pipelinectl_types::pipeline_run::{Conclusion, PipelineRun};

    fn run(repo: &Repository, created_at: chrono::DateTime<Utc>, conclusion: Conclusion, duration_s: f64) -> PipelineRun {
        PipelineRun {
            repository: repo.clone(),
            run_id: format!("{}", created_at.timestamp()),
            workflow: "ci".into(),
            branch: "main".into(),
            created_at,
            started_at: Some(created_at),
            completed_at: Some(created_at),
            conclusion,
            duration_s: Some(duration_s),
            queue_time_s: Some(2.0),
            concurrent_runs: 1,
            actor: "test".into(),
        }
    }

    #[test]
    fn degrading_history_yields_high_probability_prediction() {
        let repo = Repository::new("owner/r");
        let now = Utc::now();
        let mut runs = Vec::new();
        for i in 0..30 {
            runs.push(run(&repo, now - chrono::Duration::days(60 - i), Conclusion::Success, 60.0));
        }
        for i in 0..30 {
            let conclusion = if i % 10 < 4 { Conclusion::Failure } else { Conclusion::Success };
            runs.push(run(&repo, now - chrono::Duration::days(30 - i), conclusion, 80.0));
        }
        let metrics: Arc<dyn MetricsSource> = Arc::new(StaticMetricsSource::new().with_runs(repo.clone(), runs));
        let trend = Arc::new(TrendAnalyzer::new(metrics.clone(), AnomalyConfig::default(), Duration::from_secs(1800)));
        let detector = AnomalyDetector::new(metrics, trend, AnomalyConfig::default(), Duration::from_secs(86_400));

        let prediction = detector.predict_failure(&repo);
        assert!(prediction.probability >= 0.0 && prediction.probability <= 1.0);
        assert!(prediction.confidence >= 0.0 && prediction.confidence <= 1.0);
    }

    #[test]
    fn no_history_still_produces_a_bounded_prediction() {
        let repo = Repository::new("owner/r");
        let metrics: Arc<dyn MetricsSource> = Arc::new(StaticMetricsSource::new().with_runs(repo.clone(), vec![]));
        let trend = Arc::new(TrendAnalyzer::new(metrics.clone(), AnomalyConfig::default(), Duration::from_secs(1800)));
        let detector = AnomalyDetector::new(metrics, trend, AnomalyConfig::default(), Duration::from_secs(86_400));

        let prediction = detector.predict_failure(&repo);
        assert!(prediction.probability >= 0.0 && prediction.probability <= 1.0);
        assert!(prediction.anomalies.is_empty());
    }
}
