//! # pipelinectl-health
//!
//! The Health Checker (C5, §4.5): runs four independent dimension checks
//! and combines them into a [`pipelinectl_types::health::HealthReport`].
//!
//! Per the redesign notes (§9 "cyclic references"), this crate never
//! depends on the trend analyzer or anomaly detector crates directly —
//! it only asks for a narrow [`DegradationTrendSource`] capability, which
//! the facade wires to the real trend analyzer. Each dimension runs on
//! its own thread (matching the workspace's synchronous, thread-per-unit
//! concurrency idiom) so that one slow check cannot stall the others; a
//! dimension that doesn't report within `budget` is scored as an error.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::warn;

use pipelinectl_config::HealthThresholds;
use pipelinectl_metrics::MetricsSource;
use pipelinectl_types::health::{build_report, Dimension, DimensionResult, HealthReport};
use pipelinectl_types::Repository;

/// Narrow capability covering the one signal the trend analyzer
/// contributes to health scoring: the performance dimension's
/// degradation trend (§4.5 "Performance ... degradation trend (§4.7)").
pub trait DegradationTrendSource: Send + Sync {
    /// Relative change in mean duration over the analyzer's short window;
    /// positive means getting slower. `None` when there isn't enough
    /// history to compute a trend.
    fn degradation_trend(&self, repository: &Repository) -> Option<f64>;
}

/// Optional resource-usage signal for the performance dimension's cpu
/// check (§4.5 "cpu ... when available"). No default implementation:
/// its complete absence is itself the documented degrade-to-None case.
pub trait ResourceUsageSource: Send + Sync {
    fn cpu_percent(&self, repository: &Repository) -> Option<f64>;
}

/// Evaluates the four health dimensions for a repository (§4.5).
pub struct HealthChecker {
    metrics: Arc<dyn MetricsSource>,
    degradation: Arc<dyn DegradationTrendSource>,
    resource_usage: Option<Arc<dyn ResourceUsageSource>>,
    thresholds: HealthThresholds,
    /// Per-dimension wall-clock budget; a dimension that exceeds it is
    /// scored as an error (§4.5 "total wall-clock budget").
    dimension_budget: Duration,
}

impl HealthChecker {
    pub fn new(
        metrics: Arc<dyn MetricsSource>,
        degradation: Arc<dyn DegradationTrendSource>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            metrics,
            degradation,
            resource_usage: None,
            thresholds,
            dimension_budget: Duration::from_secs(10),
        }
    }

    pub fn with_resource_usage(mut self, source: Arc<dyn ResourceUsageSource>) -> Self {
        self.resource_usage = Some(source);
        self
    }

    pub fn with_dimension_budget(mut self, budget: Duration) -> Self {
        self.dimension_budget = budget;
        self
    }

    /// Run all four dimension checks and combine them (§4.5). Each check
    /// runs on its own thread; a timed-out or panicking check degrades to
    /// `score: 50` with an issue string rather than failing the report.
    pub fn evaluate(&self, repository: &Repository) -> HealthReport {
        let start = Instant::now();

        let pipeline = self.run_dimension(Dimension::Pipeline, {
            let metrics = Arc::clone(&self.metrics);
            let repository = repository.clone();
            let thresholds = self.thresholds.clone();
            move || check_pipeline(&*metrics, &repository, &thresholds)
        });

        let performance = self.run_dimension(Dimension::Performance, {
            let metrics = Arc::clone(&self.metrics);
            let degradation = Arc::clone(&self.degradation);
            let resource_usage = self.resource_usage.clone();
            let repository = repository.clone();
            let thresholds = self.thresholds.clone();
            move || check_performance(&*metrics, &*degradation, resource_usage.as_deref(), &repository, &thresholds)
        });

        let quality = self.run_dimension(Dimension::Quality, {
            let metrics = Arc::clone(&self.metrics);
            let repository = repository.clone();
            let thresholds = self.thresholds.clone();
            move || check_quality(&*metrics, &repository, &thresholds)
        });

        let reliability = self.run_dimension(Dimension::Reliability, {
            let metrics = Arc::clone(&self.metrics);
            let repository = repository.clone();
            let thresholds = self.thresholds.clone();
            move || check_reliability(&*metrics, &repository, &thresholds)
        });

        let dimensions = vec![pipeline, performance, quality, reliability];
        build_report(repository.clone(), Utc::now(), dimensions, start.elapsed().as_millis() as u64)
    }

    fn run_dimension(
        &self,
        dimension: Dimension,
        check: impl FnOnce() -> DimensionResult + Send + 'static,
    ) -> DimensionResult {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let _ = tx.send(check());
        });
        match rx.recv_timeout(self.dimension_budget) {
            Ok(result) => result,
            Err(_) => {
                warn!(?dimension, "health dimension check exceeded budget");
                // Detach; the thread may still be running against a slow
                // collaborator, but we don't block the report on it.
                drop(handle);
                DimensionResult {
                    dimension,
                    score: 50.0,
                    issues: vec![format!("{dimension:?} check did not complete within budget")],
                }
            }
        }
    }
}

fn clamp01_100(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

fn check_pipeline(metrics: &dyn MetricsSource, repository: &Repository, thresholds: &HealthThresholds) -> DimensionResult {
    let now = Utc::now();
    let seven_days_ago = now - chrono::Duration::days(7);
    let runs = metrics.pipeline_runs(repository, seven_days_ago, 10_000);

    if runs.is_empty() {
        return DimensionResult {
            dimension: Dimension::Pipeline,
            score: Dimension::Pipeline.default_score(),
            issues: vec!["no pipeline runs in the last 7 days".to_string()],
        };
    }

    use pipelinectl_types::pipeline_run::Conclusion;
    let finished: Vec<_> = runs
        .iter()
        .filter(|r| matches!(r.conclusion, Conclusion::Success | Conclusion::Failure | Conclusion::Cancelled))
        .collect();
    let success_rate = if finished.is_empty() {
        1.0
    } else {
        finished.iter().filter(|r| matches!(r.conclusion, Conclusion::Success)).count() as f64 / finished.len() as f64
    };

    let one_day_ago = now - chrono::Duration::hours(24);
    let failures_24h = runs
        .iter()
        .filter(|r| r.created_at >= one_day_ago && matches!(r.conclusion, Conclusion::Failure))
        .count() as u32;

    let queue_times: Vec<f64> = runs.iter().filter_map(|r| r.queue_time_s).collect();
    let mean_queue_time = if queue_times.is_empty() { 0.0 } else { queue_times.iter().sum::<f64>() / queue_times.len() as f64 };

    let mut issues = Vec::new();

    let success_rate_score = clamp01_100(success_rate / thresholds.min_success_rate * 100.0);
    if success_rate < thresholds.min_success_rate {
        issues.push(format!(
            "success rate {:.1}% below minimum {:.1}%",
            success_rate * 100.0,
            thresholds.min_success_rate * 100.0
        ));
    }

    let failures_score = if failures_24h as f64 <= thresholds.max_daily_failures as f64 {
        100.0
    } else {
        clamp01_100(100.0 - (failures_24h - thresholds.max_daily_failures) as f64 * 20.0)
    };
    if failures_24h > thresholds.max_daily_failures {
        issues.push(format!("{failures_24h} failures in the last 24h exceeds max {}", thresholds.max_daily_failures));
    }

    let queue_score = if mean_queue_time <= thresholds.max_queue_time_s as f64 {
        100.0
    } else {
        clamp01_100(100.0 - (mean_queue_time - thresholds.max_queue_time_s as f64) / thresholds.max_queue_time_s as f64 * 100.0)
    };
    if mean_queue_time > thresholds.max_queue_time_s as f64 {
        issues.push(format!("mean queue time {mean_queue_time:.0}s exceeds max {}s", thresholds.max_queue_time_s));
    }

    DimensionResult {
        dimension: Dimension::Pipeline,
        score: (success_rate_score + failures_score + queue_score) / 3.0,
        issues,
    }
}

fn check_performance(
    metrics: &dyn MetricsSource,
    degradation: &dyn DegradationTrendSource,
    resource_usage: Option<&dyn ResourceUsageSource>,
    repository: &Repository,
    thresholds: &HealthThresholds,
) -> DimensionResult {
    let now = Utc::now();
    let seven_days_ago = now - chrono::Duration::days(7);
    let runs = metrics.pipeline_runs(repository, seven_days_ago, 10_000);
    let durations: Vec<f64> = runs.iter().filter_map(|r| r.duration_s).collect();

    if durations.is_empty() {
        return DimensionResult {
            dimension: Dimension::Performance,
            score: Dimension::Performance.default_score(),
            issues: vec!["no run durations available".to_string()],
        };
    }

    let mean_duration = durations.iter().sum::<f64>() / durations.len() as f64;
    let mut issues = Vec::new();

    let duration_score = if mean_duration <= thresholds.max_avg_duration_s as f64 {
        100.0
    } else {
        clamp01_100(100.0 - (mean_duration - thresholds.max_avg_duration_s as f64) / thresholds.max_avg_duration_s as f64 * 100.0)
    };
    if mean_duration > thresholds.max_avg_duration_s as f64 {
        issues.push(format!("mean duration {mean_duration:.0}s exceeds max {}s", thresholds.max_avg_duration_s));
    }

    let (degradation_score, degradation_issue) = match degradation.degradation_trend(repository) {
        Some(rate) if rate > thresholds.max_degradation_rate => (
            clamp01_100(100.0 - (rate - thresholds.max_degradation_rate) / thresholds.max_degradation_rate * 100.0),
            Some(format!("degradation rate {:.1}% exceeds max {:.1}%", rate * 100.0, thresholds.max_degradation_rate * 100.0)),
        ),
        Some(_) => (100.0, None),
        None => (Dimension::Performance.default_score(), None),
    };
    issues.extend(degradation_issue);

    let (cpu_score, cpu_issue) = match resource_usage.and_then(|source| source.cpu_percent(repository)) {
        Some(cpu) if cpu > thresholds.max_cpu_percent => (
            clamp01_100(100.0 - (cpu - thresholds.max_cpu_percent) / thresholds.max_cpu_percent * 100.0),
            Some(format!("cpu {cpu:.1}% exceeds max {:.1}%", thresholds.max_cpu_percent)),
        ),
        Some(_) => (100.0, None),
        None => (100.0, None),
    };
    issues.extend(cpu_issue);

    DimensionResult {
        dimension: Dimension::Performance,
        score: (duration_score + degradation_score + cpu_score) / 3.0,
        issues,
    }
}

fn check_quality(metrics: &dyn MetricsSource, repository: &Repository, thresholds: &HealthThresholds) -> DimensionResult {
    let Some(quality) = metrics.quality_metrics(repository) else {
        return DimensionResult {
            dimension: Dimension::Quality,
            score: Dimension::Quality.default_score(),
            issues: vec!["no quality metrics available".to_string()],
        };
    };

    const MISSING_METRIC_SCORE: f64 = 70.0;
    let mut issues = Vec::new();

    let coverage_score = match quality.test_coverage_percent {
        Some(pct) if pct < thresholds.min_test_coverage_percent => {
            issues.push(format!("test coverage {pct:.1}% below minimum {:.1}%", thresholds.min_test_coverage_percent));
            clamp01_100(pct / thresholds.min_test_coverage_percent * 100.0)
        }
        Some(_) => 100.0,
        None => MISSING_METRIC_SCORE,
    };

    let code_quality_score = match quality.code_quality_score {
        Some(score) if score < thresholds.min_code_quality_score => {
            issues.push(format!("code quality score {score:.1} below minimum {:.1}", thresholds.min_code_quality_score));
            clamp01_100(score / thresholds.min_code_quality_score * 100.0)
        }
        Some(_) => 100.0,
        None => MISSING_METRIC_SCORE,
    };

    let vuln_score = match quality.security_vulnerabilities {
        Some(count) if count > thresholds.max_security_vulns => {
            issues.push(format!("{count} security vulnerabilities exceeds max {}", thresholds.max_security_vulns));
            clamp01_100(100.0 - (count - thresholds.max_security_vulns) as f64 * 25.0)
        }
        Some(_) => 100.0,
        None => MISSING_METRIC_SCORE,
    };

    let tech_debt_score = match quality.technical_debt_hours {
        Some(_) => 100.0,
        None => MISSING_METRIC_SCORE,
    };

    DimensionResult {
        dimension: Dimension::Quality,
        score: (coverage_score + code_quality_score + vuln_score + tech_debt_score) / 4.0,
        issues,
    }
}

fn check_reliability(metrics: &dyn MetricsSource, repository: &Repository, thresholds: &HealthThresholds) -> DimensionResult {
    let Some(reliability) = metrics.reliability_metrics(repository) else {
        return DimensionResult {
            dimension: Dimension::Reliability,
            score: Dimension::Reliability.default_score(),
            issues: vec!["no reliability metrics available".to_string()],
        };
    };

    const MISSING_METRIC_SCORE: f64 = 80.0;
    let mut issues = Vec::new();

    let flaky_score = match reliability.flaky_test_count {
        Some(count) if count > thresholds.max_flaky_tests => {
            issues.push(format!("{count} flaky tests exceeds max {}", thresholds.max_flaky_tests));
            clamp01_100(100.0 - (count - thresholds.max_flaky_tests) as f64 * 15.0)
        }
        Some(_) => 100.0,
        None => MISSING_METRIC_SCORE,
    };

    let mttr_score = match reliability.mttr_hours {
        Some(hours) if hours > thresholds.max_mttr_hours => {
            issues.push(format!("MTTR {hours:.1}h exceeds max {:.1}h", thresholds.max_mttr_hours));
            clamp01_100(100.0 - (hours - thresholds.max_mttr_hours) / thresholds.max_mttr_hours * 100.0)
        }
        Some(_) => 100.0,
        None => MISSING_METRIC_SCORE,
    };

    let deploy_freq_score = match reliability.deploy_frequency_per_week {
        Some(freq) if freq < thresholds.min_deploy_freq_per_week => {
            issues.push(format!("deploy frequency {freq:.2}/week below minimum {:.2}/week", thresholds.min_deploy_freq_per_week));
            clamp01_100(freq / thresholds.min_deploy_freq_per_week * 100.0)
        }
        Some(_) => 100.0,
        None => MISSING_METRIC_SCORE,
    };

    let change_failure_score = match reliability.change_failure_percent {
        Some(pct) if pct > thresholds.max_change_failure_percent => {
            issues.push(format!("change failure rate {pct:.1}% exceeds max {:.1}%", thresholds.max_change_failure_percent));
            clamp01_100(100.0 - (pct - thresholds.max_change_failure_percent) / thresholds.max_change_failure_percent * 100.0)
        }
        Some(_) => 100.0,
        None => MISSING_METRIC_SCORE,
    };

    DimensionResult {
        dimension: Dimension::Reliability,
        score: (flaky_score + mttr_score + deploy_freq_score + change_failure_score) / 4.0,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinectl_metrics::StaticMetricsSource;
    use pipelinectl_types::pipeline_run::{Conclusion, PipelineRun, QualityMetrics, ReliabilityMetrics};

    struct NoTrend;
    impl DegradationTrendSource for NoTrend {
        fn degradation_trend(&self, _repository: &Repository) -> Option<f64> {
            None
        }
    }

    struct FixedTrend(f64);
    impl DegradationTrendSource for FixedTrend {
        fn degradation_trend(&self, _repository: &Repository) -> Option<f64> {
            Some(self.0)
        }
    }

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
            queue_time_s: Some(1.0),
            concurrent_runs: 1,
            actor: "test".into(),
        }
    }

    #[test]
    fn missing_metrics_source_data_degrades_to_defaults_not_errors() {
        let repo = Repository::new("owner/r");
        let metrics = Arc::new(StaticMetricsSource::new().with_runs(repo.clone(), vec![]));
        let checker = HealthChecker::new(metrics, Arc::new(NoTrend), HealthThresholds::default());
        let report = checker.evaluate(&repo);
        assert!(report.score > 0.0);
        assert!(!report.dimensions.is_empty());
    }

    #[test]
    fn healthy_repository_scores_above_warning_boundary() {
        let repo = Repository::new("owner/r");
        let now = Utc::now();
        let runs: Vec<_> = (0..20)
            .map(|i| run(&repo, now - chrono::Duration::hours(i), Conclusion::Success, 60.0))
            .collect();
        let metrics = Arc::new(
            StaticMetricsSource::new()
                .with_runs(repo.clone(), runs)
                .with_quality(
                    repo.clone(),
                    QualityMetrics {
                        test_coverage_percent: Some(90.0),
                        code_quality_score: Some(9.0),
                        security_vulnerabilities: Some(0),
                        technical_debt_hours: Some(2.0),
                    },
                )
                .with_reliability(
                    repo.clone(),
                    ReliabilityMetrics {
                        flaky_test_count: Some(0),
                        mttr_hours: Some(1.0),
                        deploy_frequency_per_week: Some(5.0),
                        change_failure_percent: Some(2.0),
                    },
                ),
        );
        let checker = HealthChecker::new(metrics, Arc::new(NoTrend), HealthThresholds::default());
        let report = checker.evaluate(&repo);
        assert!(report.score >= 90.0, "expected healthy score, got {}", report.score);
    }

    #[test]
    fn degrading_trend_lowers_performance_dimension() {
        let repo = Repository::new("owner/r");
        let now = Utc::now();
        let runs: Vec<_> = (0..5).map(|i| run(&repo, now - chrono::Duration::hours(i), Conclusion::Success, 60.0)).collect();
        let metrics = Arc::new(StaticMetricsSource::new().with_runs(repo.clone(), runs));
        let checker = HealthChecker::new(metrics, Arc::new(FixedTrend(0.5)), HealthThresholds::default());
        let report = checker.evaluate(&repo);
        let perf = report.dimensions.iter().find(|d| d.dimension == Dimension::Performance).unwrap();
        assert!(perf.score < 100.0);
        assert!(perf.issues.iter().any(|i| i.contains("degradation")));
    }
}
