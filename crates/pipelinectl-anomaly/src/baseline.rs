//! Per-repository `{mean, stdev}` baseline over 30-day history, refreshed
//! on the `baseline refresh` interval (§4.8). Separate from the trend
//! analyzer's cache: a baseline only changes on its own refresh cadence,
//! not on every `predict_failure` call.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use pipelinectl_types::prediction::{Baseline, MeanStdev};
use pipelinectl_types::Repository;

struct Entry {
    baseline: Baseline,
    computed_at: Instant,
}

pub struct BaselineCache {
    refresh_interval: Duration,
    entries: Mutex<HashMap<Repository, Entry>>,
}

impl BaselineCache {
    pub fn new(refresh_interval: Duration) -> Self {
        Self { refresh_interval, entries: Mutex::new(HashMap::new()) }
    }

    /// Return the cached baseline if it is still fresh, recomputing it via
    /// `compute` otherwise.
    pub fn get_or_refresh(&self, repository: &Repository, compute: impl FnOnce() -> Baseline) -> Baseline {
        let mut entries = self.entries.lock().expect("baseline cache mutex poisoned");
        if let Some(entry) = entries.get(repository) {
            if entry.computed_at.elapsed() < self.refresh_interval {
                return entry.baseline.clone();
            }
        }
        let baseline = compute();
        entries.insert(repository.clone(), Entry { baseline: baseline.clone(), computed_at: Instant::now() });
        baseline
    }
}

/// Compute `{mean, stdev}` for a named metric over a sample set.
pub fn mean_stdev(samples: &[f64]) -> MeanStdev {
    if samples.is_empty() {
        return MeanStdev::default();
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let stdev = (samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    MeanStdev { mean, stdev }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_within_interval_returns_cached_value() {
        let cache = BaselineCache::new(Duration::from_secs(3600));
        let repo = Repository::new("owner/r");
        let mut calls = 0;
        let first = cache.get_or_refresh(&repo, || {
            calls += 1;
            Baseline::default()
        });
        let second = cache.get_or_refresh(&repo, || {
            calls += 1;
            Baseline::default()
        });
        assert_eq!(calls, 1);
        assert_eq!(first.metrics.len(), second.metrics.len());
    }

    #[test]
    fn mean_stdev_of_constant_series_has_zero_stdev() {
        let ms = mean_stdev(&[5.0, 5.0, 5.0]);
        assert_eq!(ms.mean, 5.0);
        assert_eq!(ms.stdev, 0.0);
    }
}
