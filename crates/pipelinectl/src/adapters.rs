//! Bridges between a component's narrow capability trait and the real
//! crate that implements it, wired only here in the facade so that
//! `pipelinectl-health` never depends on `pipelinectl-trend` directly
//! (§9 "cyclic references ... broken by narrow capability interfaces").

use std::sync::Arc;

use pipelinectl_health::DegradationTrendSource;
use pipelinectl_trend::TrendAnalyzer;
use pipelinectl_types::Repository;

pub struct TrendDegradationAdapter(pub Arc<TrendAnalyzer>);

impl DegradationTrendSource for TrendDegradationAdapter {
    fn degradation_trend(&self, repository: &Repository) -> Option<f64> {
        self.0.degradation_trend(repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinectl_config::AnomalyConfig;
    use pipelinectl_metrics::{MetricsSource, StaticMetricsSource};
    use std::time::Duration;

    #[test]
    fn adapter_delegates_to_the_real_analyzer() {
        let repo = Repository::new("owner/r");
        let metrics: Arc<dyn MetricsSource> = Arc::new(StaticMetricsSource::new());
        let analyzer = Arc::new(TrendAnalyzer::new(metrics, AnomalyConfig::default(), Duration::from_secs(1800)));
        let adapter = TrendDegradationAdapter(analyzer);
        assert_eq!(adapter.degradation_trend(&repo), None);
    }
}
