//! # pipelinectl-monitor
//!
//! The Pipeline Monitor (C9, §4.9): three independently-scheduled ticks
//! (health, trend, prediction) that fan out across monitored repositories
//! with bounded concurrency, using the same `thread::spawn` + `chunks`
//! idiom the orchestration layer uses elsewhere. Each tick is
//! drop-if-overlap per repository (§4.9): if the previous run for that
//! repository hasn't finished, this interval's run is skipped and logged.

mod tick;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::warn;

use pipelinectl_anomaly::AnomalyDetector;
use pipelinectl_config::Intervals;
use pipelinectl_events::Bus;
use pipelinectl_health::HealthChecker;
use pipelinectl_metrics::MetricsSource;
use pipelinectl_store::Store;
use pipelinectl_trend::{AnalyzeOptions, TrendAnalyzer};
use pipelinectl_types::collaborators::{AlertLevel as SinkAlertLevel, NotificationSink};
use pipelinectl_types::event::{AlertEvent, AlertLevel, HealthEvent};
use pipelinectl_types::health::HealthStatus;
use pipelinectl_types::trend::{TrendReport, Window};
use pipelinectl_types::Repository;

use tick::{OverlapGuard, TickKind};

/// Trend degradation, as a relative fraction, above which a trend tick
/// raises an alert (§4.9 "trend degradation > 20%").
const TREND_ALERT_THRESHOLD: f64 = 0.20;
/// Failure probability above which a prediction tick raises an alert
/// (§4.9 "prediction probability > 0.70").
const PREDICTION_ALERT_THRESHOLD: f64 = 0.70;
/// Health score below which a `warning`-status report still raises an
/// alert (§4.9 "score < 75 with status = warning").
const HEALTH_WARNING_ALERT_SCORE: f64 = 75.0;

pub struct Monitor {
    metrics: Arc<dyn MetricsSource>,
    health: Arc<HealthChecker>,
    trend: Arc<TrendAnalyzer>,
    anomaly: Arc<AnomalyDetector>,
    store: Arc<dyn Store>,
    health_bus: Bus<HealthEvent>,
    alert_bus: Bus<AlertEvent>,
    notifications: Option<Arc<dyn NotificationSink>>,
    intervals: Intervals,
    max_concurrent: usize,
    overlap: Arc<OverlapGuard>,
}

pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Signal all three tickers to stop and wait for the in-flight tick
    /// (if any) to finish.
    pub fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.threads {
            let _ = handle.join();
        }
    }
}

impl Monitor {
    pub fn new(
        metrics: Arc<dyn MetricsSource>,
        health: Arc<HealthChecker>,
        trend: Arc<TrendAnalyzer>,
        anomaly: Arc<AnomalyDetector>,
        store: Arc<dyn Store>,
        health_bus: Bus<HealthEvent>,
        alert_bus: Bus<AlertEvent>,
        intervals: Intervals,
    ) -> Self {
        Self {
            metrics,
            health,
            trend,
            anomaly,
            store,
            health_bus,
            alert_bus,
            notifications: None,
            intervals,
            max_concurrent: 8,
            overlap: Arc::new(OverlapGuard::new()),
        }
    }

    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = Some(sink);
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// `start()` registers the three ticks (§4.9) and returns a handle the
    /// caller uses to stop them.
    pub fn start(self: Arc<Self>) -> MonitorHandle {
        let stop = Arc::new(AtomicBool::new(false));

        let health_thread = self.spawn_ticker(TickKind::Health, self.intervals.health_check_tick, Arc::clone(&stop), {
            let this = Arc::clone(&self);
            move |repository| this.run_health_tick(repository)
        });
        let trend_thread = self.spawn_ticker(TickKind::Trend, self.intervals.trend_tick, Arc::clone(&stop), {
            let this = Arc::clone(&self);
            move |repository| this.run_trend_tick(repository)
        });
        let prediction_thread = self.spawn_ticker(TickKind::Prediction, self.intervals.prediction_tick, Arc::clone(&stop), {
            let this = Arc::clone(&self);
            move |repository| this.run_prediction_tick(repository)
        });

        MonitorHandle { stop, threads: vec![health_thread, trend_thread, prediction_thread] }
    }

    fn spawn_ticker(
        &self,
        kind: TickKind,
        interval: std::time::Duration,
        stop: Arc<AtomicBool>,
        run_one: impl Fn(&Repository) + Send + Sync + 'static,
    ) -> JoinHandle<()> {
        let metrics = Arc::clone(&self.metrics);
        let overlap = Arc::clone(&self.overlap);
        let max_concurrent = self.max_concurrent;
        let run_one = Arc::new(run_one);

        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                let repositories = metrics.monitored_repositories();
                for chunk in repositories.chunks(max_concurrent) {
                    let mut handles: Vec<JoinHandle<()>> = Vec::new();
                    for repository in chunk {
                        if !overlap.try_claim(kind, repository.as_str()) {
                            warn!(tick = kind.as_str(), %repository, "previous tick still running, skipping this interval");
                            continue;
                        }
                        let repository = repository.clone();
                        let overlap = Arc::clone(&overlap);
                        let run_one = Arc::clone(&run_one);
                        handles.push(thread::spawn(move || {
                            run_one(&repository);
                            overlap.release(kind, repository.as_str());
                        }));
                    }
                    for handle in handles {
                        let _ = handle.join();
                    }
                }
                sleep_in_slices(interval, &stop);
            }
        })
    }

    fn run_health_tick(&self, repository: &Repository) {
        let report = self.health.evaluate(repository);
        if let Err(e) = self.store.put_health_report(report.clone()) {
            warn!(%repository, error = %e, "failed to persist health report");
        }
        self.health_bus.publish(HealthEvent::Update { repository: repository.clone(), status: report.status, score: report.score });

        let breached = matches!(report.status, HealthStatus::Critical)
            || (matches!(report.status, HealthStatus::Warning) && report.score < HEALTH_WARNING_ALERT_SCORE);
        if breached {
            self.health_bus.publish(HealthEvent::ThresholdBreach { repository: repository.clone(), status: report.status, score: report.score });
            let level = if matches!(report.status, HealthStatus::Critical) { AlertLevel::Critical } else { AlertLevel::Warning };
            self.raise_alert(level, "health threshold breached", &format!("{repository}: score {:.1} ({:?})", report.score, report.status), Some(repository));
        }
    }

    fn run_trend_tick(&self, repository: &Repository) {
        let report = self.trend.analyze(repository, Window::Short, AnalyzeOptions { include_seasonality: false, include_forecast: false, include_anomalies: true });
        if let TrendReport::Computed(computed) = &report {
            let rate = computed.duration_trend.relative_slope;
            if rate > TREND_ALERT_THRESHOLD {
                self.raise_alert(
                    AlertLevel::Warning,
                    "pipeline trend degrading",
                    &format!("{repository}: duration trend +{:.1}%", rate * 100.0),
                    Some(repository),
                );
            }
        }
    }

    fn run_prediction_tick(&self, repository: &Repository) {
        let prediction = self.anomaly.predict_failure(repository);
        if let Err(e) = self.store.put_prediction(prediction.clone()) {
            warn!(%repository, error = %e, "failed to persist failure prediction");
        }
        if prediction.probability > PREDICTION_ALERT_THRESHOLD {
            self.raise_alert(
                AlertLevel::Critical,
                "elevated failure probability",
                &format!("{repository}: predicted failure probability {:.2}", prediction.probability),
                Some(repository),
            );
        }
    }

    fn raise_alert(&self, level: AlertLevel, title: &str, message: &str, repository: Option<&Repository>) {
        self.alert_bus.publish(AlertEvent::New { level, title: title.to_string(), message: message.to_string(), repository: repository.cloned() });
        match &self.notifications {
            Some(sink) => {
                let sink_level = match level {
                    AlertLevel::Info => SinkAlertLevel::Info,
                    AlertLevel::Warning => SinkAlertLevel::Warning,
                    AlertLevel::Critical => SinkAlertLevel::Critical,
                };
                sink.alert(sink_level, title, message, serde_json::json!({ "repository": repository.map(|r| r.as_str()) }));
            }
            None => warn!(title, message, "alert (no notification sink configured)"),
        }
    }
}

/// Sleep up to `total`, checking `stop` every 200ms so a stop request is
/// honored promptly even with a long tick interval.
fn sleep_in_slices(total: std::time::Duration, stop: &AtomicBool) {
    const SLICE: std::time::Duration = std::time::Duration::from_millis(200);
    let mut remaining = total;
    while remaining > std::time::Duration::ZERO {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let slice = remaining.min(SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinectl_config::{AnomalyConfig, HealthThresholds};
    use pipelinectl_health::DegradationTrendSource;
    use pipelinectl_metrics::StaticMetricsSource;
    use pipelinectl_store::InMemoryStore;
    use pipelinectl_types::pipeline_run::{Conclusion, PipelineRun};
    use std::time::Duration;

    struct NoTrend;
    impl DegradationTrendSource for NoTrend {
        fn degradation_trend(&self, _repository: &Repository) -> Option<f64> {
            None
        }
    }

    fn run(repo: &Repository, created_at: chrono::DateTime<chrono::Utc>, conclusion: Conclusion) -> PipelineRun {
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

    fn test_monitor(repo: &Repository, runs: Vec<PipelineRun>) -> (Arc<Monitor>, Arc<InMemoryStore>) {
        let metrics: Arc<dyn MetricsSource> = Arc::new(StaticMetricsSource::new().with_runs(repo.clone(), runs));
        let health = Arc::new(HealthChecker::new(Arc::clone(&metrics), Arc::new(NoTrend), HealthThresholds::default()));
        let trend = Arc::new(TrendAnalyzer::new(Arc::clone(&metrics), AnomalyConfig::default(), Duration::from_secs(1800)));
        let anomaly = Arc::new(AnomalyDetector::new(Arc::clone(&metrics), Arc::clone(&trend), AnomalyConfig::default(), Duration::from_secs(86_400)));
        let store = Arc::new(InMemoryStore::new());
        let monitor = Arc::new(Monitor::new(
            metrics,
            health,
            trend,
            anomaly,
            Arc::clone(&store) as Arc<dyn Store>,
            Bus::new(64),
            Bus::new(64),
            Intervals::default(),
        ));
        (monitor, store)
    }

    #[test]
    fn health_tick_persists_a_report() {
        let repo = Repository::new("owner/r");
        let now = chrono::Utc::now();
        let runs = (0..5).map(|i| run(&repo, now - chrono::Duration::hours(i), Conclusion::Success)).collect();
        let (monitor, store) = test_monitor(&repo, runs);
        monitor.run_health_tick(&repo);
        assert!(store.latest_health_report(&repo).unwrap().is_some());
    }

    #[test]
    fn prediction_tick_persists_a_prediction() {
        let repo = Repository::new("owner/r");
        let now = chrono::Utc::now();
        let runs = (0..5).map(|i| run(&repo, now - chrono::Duration::hours(i), Conclusion::Success)).collect();
        let (monitor, store) = test_monitor(&repo, runs);
        monitor.run_prediction_tick(&repo);
        assert!(store.latest_prediction(&repo).unwrap().is_some());
    }

    #[test]
    fn overlap_guard_skips_a_repository_already_in_flight() {
        let guard = OverlapGuard::new();
        assert!(guard.try_claim(TickKind::Health, "owner/r"));
        assert!(!guard.try_claim(TickKind::Health, "owner/r"));
    }
}
