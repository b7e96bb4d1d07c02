//! # pipelinectl-trend
//!
//! The Trend Analyzer (C7, §4.7): OLS trend coefficients, summary
//! statistics, moving averages, change-point detection, z-score
//! anomalies, Pearson correlations, and an optional short-horizon
//! forecast, all behind a 30-minute TTL cache keyed on
//! `(repository, window, cache bucket)`.

mod cache;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use pipelinectl_config::AnomalyConfig;
use pipelinectl_metrics::MetricsSource;
use pipelinectl_types::pipeline_run::Conclusion;
use pipelinectl_types::trend::{
    ComputedTrendReport, NamedCorrelation, SeasonalityReport, TrendReport, Window, MIN_TREND_SAMPLES,
};
use pipelinectl_types::Repository;

use cache::TrendCache;

/// Feature pairs correlated by `analyze` (§3 "Correlations"). Named as
/// `(label_a, label_b)`; the samples behind each label are derived from
/// the same run history, aligned by index.
const CORRELATION_PAIRS: [(&str, &str); 2] = [("duration", "queue_time"), ("duration", "concurrent_runs")];

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions {
    pub include_seasonality: bool,
    pub include_forecast: bool,
    pub include_anomalies: bool,
}

pub struct TrendAnalyzer {
    metrics: Arc<dyn MetricsSource>,
    anomaly: AnomalyConfig,
    cache: TrendCache,
    forecast_horizon: u32,
    forecast_decay_k: f64,
}

impl TrendAnalyzer {
    pub fn new(metrics: Arc<dyn MetricsSource>, anomaly: AnomalyConfig, cache_ttl: Duration) -> Self {
        Self {
            metrics,
            anomaly,
            cache: TrendCache::new(cache_ttl),
            forecast_horizon: 7,
            forecast_decay_k: 0.15,
        }
    }

    /// `analyze(repository, window, options) -> TrendReport` (§4.7).
    pub fn analyze(&self, repository: &Repository, window: Window, options: AnalyzeOptions) -> TrendReport {
        let now = Utc::now();
        if let Some(cached) = self.cache.get(repository, window, now) {
            return cached;
        }

        let since = now - chrono::Duration::days(window.days());
        let runs = self.metrics.pipeline_runs(repository, since, 100_000);

        let report = if runs.len() < MIN_TREND_SAMPLES {
            TrendReport::InsufficientData {
                repository: repository.clone(),
                window,
                have: runs.len(),
                required: MIN_TREND_SAMPLES,
            }
        } else {
            let durations: Vec<f64> = runs.iter().filter_map(|r| r.duration_s).collect();
            let success_series: Vec<f64> = runs
                .iter()
                .map(|r| if matches!(r.conclusion, Conclusion::Success) { 1.0 } else { 0.0 })
                .collect();
            let queue_times: Vec<f64> = runs.iter().filter_map(|r| r.queue_time_s).collect();
            let concurrency: Vec<f64> = runs.iter().map(|r| r.concurrent_runs as f64).collect();

            let duration_trend = stats::trend_coefficient(&durations, self.anomaly.outlier_significance);
            let success_rate_trend = stats::trend_coefficient(&success_series, self.anomaly.outlier_significance);
            let summary = stats::summary_stats(&durations);
            let moving_average_window = (durations.len() / 10).max(3);
            let moving_average = stats::moving_average(&durations, moving_average_window);
            let change_points = stats::change_points(&durations);

            let anomalies = if options.include_anomalies {
                stats::anomalies("duration", &durations, self.anomaly.z_threshold)
            } else {
                Vec::new()
            };

            let correlations = self.correlations(&durations, &queue_times, &concurrency);

            let forecast = options.include_forecast.then(|| stats::forecast(&durations, self.forecast_horizon, self.forecast_decay_k));
            let seasonality = options.include_seasonality.then(|| seasonality_report(&runs));

            TrendReport::Computed(Box::new(ComputedTrendReport {
                repository: repository.clone(),
                window,
                generated_at: now,
                sample_count: runs.len(),
                duration_trend,
                success_rate_trend,
                stats: summary,
                moving_average,
                change_points,
                anomalies,
                correlations,
                forecast,
                seasonality,
            }))
        };

        self.cache.put(repository, window, now, report.clone());
        report
    }

    fn correlations(&self, durations: &[f64], queue_times: &[f64], concurrency: &[f64]) -> Vec<NamedCorrelation> {
        let mut out = Vec::new();
        for (a_label, b_label) in CORRELATION_PAIRS {
            let (a, b): (&[f64], &[f64]) = match (a_label, b_label) {
                ("duration", "queue_time") => (durations, queue_times),
                ("duration", "concurrent_runs") => (durations, concurrency),
                _ => continue,
            };
            if a.len() != b.len() || a.is_empty() {
                continue;
            }
            out.push(NamedCorrelation {
                feature_a: a_label.to_string(),
                feature_b: b_label.to_string(),
                correlation: stats::pearson_correlation(a, b),
            });
        }
        out
    }

    /// Relative change in mean duration between the most recent half and
    /// the earlier half of the short (7d) window — the one signal the
    /// health checker's performance dimension needs (§4.5, §9).
    pub fn degradation_trend(&self, repository: &Repository) -> Option<f64> {
        let now = Utc::now();
        let since = now - chrono::Duration::days(Window::Short.days());
        let runs = self.metrics.pipeline_runs(repository, since, 100_000);
        let durations: Vec<f64> = runs.iter().filter_map(|r| r.duration_s).collect();
        if durations.len() < MIN_TREND_SAMPLES {
            return None;
        }
        let mid = durations.len() / 2;
        let (earlier, recent) = durations.split_at(mid);
        let earlier_mean = earlier.iter().sum::<f64>() / earlier.len() as f64;
        let recent_mean = recent.iter().sum::<f64>() / recent.len() as f64;
        if earlier_mean.abs() < f64::EPSILON {
            return None;
        }
        Some((recent_mean - earlier_mean) / earlier_mean)
    }
}

/// Bucket run starts into hour-of-week (0..168), a fixed-size array per
/// the design note against string-keyed maps in hot paths (§9).
fn seasonality_report(runs: &[pipelinectl_types::pipeline_run::PipelineRun]) -> SeasonalityReport {
    use chrono::Timelike;
    let mut sums = [0.0f64; 168];
    let mut counts = [0u32; 168];
    for run in runs {
        let Some(duration) = run.duration_s else { continue };
        let weekday = run.created_at.weekday().num_days_from_monday() as usize;
        let hour = run.created_at.hour() as usize;
        let bucket = weekday * 24 + hour;
        sums[bucket] += duration;
        counts[bucket] += 1;
    }
    let hour_of_week_means = sums
        .iter()
        .zip(counts.iter())
        .map(|(sum, count)| if *count > 0 { sum / *count as f64 } else { 0.0 })
        .collect();
    SeasonalityReport { hour_of_week_means }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinectl_metrics::StaticMetricsSource;
    use pipelinectl_types::pipeline_run::PipelineRun;

    fn run(repo: &Repository, created_at: chrono::DateTime<Utc>, duration_s: f64) -> PipelineRun {
        PipelineRun {
            repository: repo.clone(),
            run_id: format!("{}", created_at.timestamp()),
            workflow: "ci".into(),
            branch: "main".into(),
            created_at,
            started_at: Some(created_at),
            completed_at: Some(created_at),
            conclusion: Conclusion::Success,
            duration_s: Some(duration_s),
            queue_time_s: Some(2.0),
            concurrent_runs: 1,
            actor: "test".into(),
        }
    }

    #[test]
    fn fewer_than_minimum_samples_reports_insufficient_data() {
        let repo = Repository::new("owner/r");
        let metrics = Arc::new(StaticMetricsSource::new().with_runs(repo.clone(), vec![run(&repo, Utc::now(), 60.0)]));
        let analyzer = TrendAnalyzer::new(metrics, AnomalyConfig::default(), Duration::from_secs(1800));
        let report = analyzer.analyze(&repo, Window::Short, AnalyzeOptions::default());
        assert!(matches!(report, TrendReport::InsufficientData { have: 1, required: 5, .. }));
    }

    #[test]
    fn two_calls_within_ttl_are_byte_identical() {
        let repo = Repository::new("owner/r");
        let now = Utc::now();
        let runs: Vec<_> = (0..10).map(|i| run(&repo, now - chrono::Duration::hours(i), 100.0 + i as f64)).collect();
        let metrics = Arc::new(StaticMetricsSource::new().with_runs(repo.clone(), runs));
        let analyzer = TrendAnalyzer::new(metrics, AnomalyConfig::default(), Duration::from_secs(1800));

        let first = analyzer.analyze(&repo, Window::Short, AnalyzeOptions::default());
        let second = analyzer.analyze(&repo, Window::Short, AnalyzeOptions::default());
        assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&second).unwrap());
    }

    #[test]
    fn degradation_trend_detects_slower_recent_half() {
        let repo = Repository::new("owner/r");
        let now = Utc::now();
        let mut runs = Vec::new();
        for i in 0..10 {
            runs.push(run(&repo, now - chrono::Duration::hours(10 - i), 60.0));
        }
        for i in 0..10 {
            runs.push(run(&repo, now - chrono::Duration::hours(i), 120.0));
        }
        let metrics = Arc::new(StaticMetricsSource::new().with_runs(repo.clone(), runs));
        let analyzer = TrendAnalyzer::new(metrics, AnomalyConfig::default(), Duration::from_secs(1800));
        let trend = analyzer.degradation_trend(&repo).expect("enough samples");
        assert!(trend > 0.0, "expected a positive (slower) degradation trend, got {trend}");
    }
}
