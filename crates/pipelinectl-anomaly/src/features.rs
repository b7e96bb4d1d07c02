//! Extracts the [`FeatureSnapshot`] the ensemble's three submodels read
//! from, given raw pipeline-run history and the trend analyzer's
//! 30-day-window coefficients (§4.8).

use chrono::{Timelike, Utc};

use pipelinectl_metrics::MetricsSource;
use pipelinectl_trend::TrendAnalyzer;
use pipelinectl_types::pipeline_run::Conclusion;
use pipelinectl_types::prediction::FeatureSnapshot;
use pipelinectl_types::Repository;

const TRAINING_WINDOW_DAYS: i64 = 30;

pub fn extract(metrics: &dyn MetricsSource, trend: &TrendAnalyzer, repository: &Repository) -> FeatureSnapshot {
    let now = Utc::now();
    let since = now - chrono::Duration::days(TRAINING_WINDOW_DAYS);
    let runs = metrics.pipeline_runs(repository, since, 100_000);

    let finished: Vec<_> = runs
        .iter()
        .filter(|r| matches!(r.conclusion, Conclusion::Success | Conclusion::Failure))
        .collect();

    let baseline_failure_rate = if finished.is_empty() {
        0.0
    } else {
        finished.iter().filter(|r| matches!(r.conclusion, Conclusion::Failure)).count() as f64 / finished.len() as f64
    };

    let current_hour = now.hour();
    let same_hour: Vec<_> = finished.iter().filter(|r| r.created_at.hour() == current_hour).copied().collect();
    let current_hour_failure_rate = if same_hour.is_empty() {
        None
    } else {
        Some(same_hour.iter().filter(|r| matches!(r.conclusion, Conclusion::Failure)).count() as f64 / same_hour.len() as f64)
    };

    let recent_cutoff = now - chrono::Duration::days(7);
    let recent_durations: Vec<f64> = runs.iter().filter(|r| r.created_at >= recent_cutoff).filter_map(|r| r.duration_s).collect();
    let recent_avg_duration_s = non_empty_mean(&recent_durations);

    let historical_success_durations: Vec<f64> = runs
        .iter()
        .filter(|r| matches!(r.conclusion, Conclusion::Success))
        .filter_map(|r| r.duration_s)
        .collect();
    let historical_success_duration_s = non_empty_mean(&historical_success_durations);

    let duration_trend_relative = trend.degradation_trend(repository);
    let success_rate_trend_relative = success_rate_trend(&runs);

    let max_consecutive_failures = max_consecutive_failures(&runs);

    FeatureSnapshot {
        baseline_failure_rate,
        current_hour_failure_rate,
        recent_avg_duration_s,
        historical_success_duration_s,
        duration_trend_relative,
        success_rate_trend_relative,
        max_consecutive_failures,
        recent_repository_changes: None,
    }
}

fn non_empty_mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

/// Relative change in success rate between the earlier and recent halves
/// of the 30-day training window, mirroring `degradation_trend`'s
/// halved-window approach for duration (§4.8 "Trend" submodel).
fn success_rate_trend(runs: &[pipelinectl_types::pipeline_run::PipelineRun]) -> Option<f64> {
    let finished: Vec<_> = runs.iter().filter(|r| matches!(r.conclusion, Conclusion::Success | Conclusion::Failure)).collect();
    if finished.len() < 10 {
        return None;
    }
    let mid = finished.len() / 2;
    let (earlier, recent) = finished.split_at(mid);
    let earlier_rate = earlier.iter().filter(|r| matches!(r.conclusion, Conclusion::Success)).count() as f64 / earlier.len() as f64;
    let recent_rate = recent.iter().filter(|r| matches!(r.conclusion, Conclusion::Success)).count() as f64 / recent.len() as f64;
    if earlier_rate.abs() < f64::EPSILON {
        return None;
    }
    Some((recent_rate - earlier_rate) / earlier_rate)
}

fn max_consecutive_failures(runs: &[pipelinectl_types::pipeline_run::PipelineRun]) -> u32 {
    let mut ordered: Vec<_> = runs
        .iter()
        .filter(|r| matches!(r.conclusion, Conclusion::Success | Conclusion::Failure))
        .collect();
    ordered.sort_by_key(|r| r.created_at);

    let mut max_streak = 0u32;
    let mut current = 0u32;
    for run in ordered {
        if matches!(run.conclusion, Conclusion::Failure) {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinectl_metrics::StaticMetricsSource;
    use pipelinectl_types::pipeline_run::PipelineRun;
    use std::sync::Arc;

    fn run(repo: &Repository, created_at: chrono::DateTime<Utc>, conclusion: Conclusion) -> PipelineRun {
        PipelineRun {
            repository: repo.clone(),
            run_id: format!("{}", created_at.timestamp()),
            workflow: "ci".into(),
            branch: "main".into(),
            created_at,
            started_at: Some(created_at),
            completed_at: Some(created_at),
            conclusion,
            duration_s: Some(60.0),
            queue_time_s: Some(1.0),
            concurrent_runs: 1,
            actor: "test".into(),
        }
    }

    #[test]
    fn max_consecutive_failures_counts_the_longest_streak() {
        let repo = Repository::new("owner/r");
        let now = Utc::now();
        let runs = vec![
            run(&repo, now - chrono::Duration::hours(5), Conclusion::Success),
            run(&repo, now - chrono::Duration::hours(4), Conclusion::Failure),
            run(&repo, now - chrono::Duration::hours(3), Conclusion::Failure),
            run(&repo, now - chrono::Duration::hours(2), Conclusion::Failure),
            run(&repo, now - chrono::Duration::hours(1), Conclusion::Success),
        ];
        assert_eq!(max_consecutive_failures(&runs), 3);
    }

    #[test]
    fn extract_degrades_gracefully_with_no_history() {
        let repo = Repository::new("owner/r");
        let metrics = StaticMetricsSource::new().with_runs(repo.clone(), vec![]);
        let trend = TrendAnalyzer::new(
            Arc::new(StaticMetricsSource::new().with_runs(repo.clone(), vec![])),
            pipelinectl_config::AnomalyConfig::default(),
            std::time::Duration::from_secs(1800),
        );
        let snapshot = extract(&metrics, &trend, &repo);
        assert_eq!(snapshot.baseline_failure_rate, 0.0);
        assert!(snapshot.recent_avg_duration_s.is_none());
        assert!(snapshot.recent_repository_changes.is_none());
    }
}
