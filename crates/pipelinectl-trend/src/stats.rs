//! Pure statistical primitives behind the Trend Analyzer's algorithms
//! (§4.7). No I/O, no caching — just numbers in, numbers out, so they can
//! be unit tested independently of the sample-fetching plumbing in
//! `lib.rs`.

use pipelinectl_types::anomaly::{self, Anomaly};
use pipelinectl_types::trend::{ChangePoint, Correlation, Direction, ForecastPoint, SummaryStats, TrendCoefficient};

/// Mean, median, p95, stdev, coefficient of variation (§4.7).
pub fn summary_stats(samples: &[f64]) -> SummaryStats {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let stdev = population_stdev(samples, mean);

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = percentile(&sorted, 0.50);
    let p95 = percentile(&sorted, 0.95);

    let coefficient_of_variation = if mean.abs() > f64::EPSILON { stdev / mean } else { 0.0 };

    SummaryStats { mean, median, p95, stdev, coefficient_of_variation }
}

fn population_stdev(samples: &[f64], mean: f64) -> f64 {
    let n = samples.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    (samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// OLS slope on equally-spaced samples, normalized by the mean; direction
/// per `outlier_significance` (§4.7).
pub fn trend_coefficient(samples: &[f64], outlier_significance: f64) -> TrendCoefficient {
    let n = samples.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = samples.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in samples.iter().enumerate() {
        let x = i as f64 - mean_x;
        numerator += x * (y - mean_y);
        denominator += x * x;
    }
    let slope = if denominator.abs() > f64::EPSILON { numerator / denominator } else { 0.0 };
    let relative_slope = if mean_y.abs() > f64::EPSILON { slope / mean_y } else { 0.0 };

    let direction = if relative_slope > outlier_significance {
        Direction::Increasing
    } else if relative_slope < -outlier_significance {
        Direction::Decreasing
    } else {
        Direction::Stable
    };

    TrendCoefficient { relative_slope, direction }
}

/// Trailing moving average of window size `w`, emitted from index `w-1` (§4.7).
pub fn moving_average(samples: &[f64], w: usize) -> Vec<f64> {
    if w == 0 || samples.len() < w {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(samples.len() - w + 1);
    let mut window_sum: f64 = samples[..w].iter().sum();
    out.push(window_sum / w as f64);
    for i in w..samples.len() {
        window_sum += samples[i] - samples[i - w];
        out.push(window_sum / w as f64);
    }
    out
}

/// Sliding-window change-point detection (§4.7): windows of size
/// `max(5, N/10)` on either side of each interior index; reported when
/// the means differ by more than `2 * pooled_stdev`.
pub fn change_points(samples: &[f64]) -> Vec<ChangePoint> {
    let n = samples.len();
    let w = (n / 10).max(5);
    if n < 2 * w {
        return Vec::new();
    }

    let mut out = Vec::new();
    for idx in w..(n - w) {
        let before = &samples[idx - w..idx];
        let after = &samples[idx..idx + w];
        let before_mean = before.iter().sum::<f64>() / before.len() as f64;
        let after_mean = after.iter().sum::<f64>() / after.len() as f64;
        let before_stdev = population_stdev(before, before_mean);
        let after_stdev = population_stdev(after, after_mean);
        let pooled_stdev = ((before_stdev.powi(2) + after_stdev.powi(2)) / 2.0).sqrt();

        if pooled_stdev > f64::EPSILON && (after_mean - before_mean).abs() > 2.0 * pooled_stdev {
            out.push(ChangePoint { index: idx, before_mean, after_mean, pooled_stdev });
        }
    }
    out
}

/// Z-score anomalies against the series' own global mean/stdev (§4.7).
pub fn anomalies(metric: &str, samples: &[f64], z_threshold: f64) -> Vec<Anomaly> {
    let stats = summary_stats(samples);
    samples
        .iter()
        .filter_map(|&value| anomaly::detect(metric, value, stats.mean, stats.stdev, z_threshold))
        .collect()
}

/// Pearson correlation coefficient; `|r| > 0.7` is flagged "strong" (§4.7).
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> Correlation {
    let n = a.len().min(b.len()) as f64;
    if n < 2.0 {
        return Correlation { strong: false, r: 0.0 };
    }
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    let denom = (var_a * var_b).sqrt();
    let r = if denom > f64::EPSILON { cov / denom } else { 0.0 };
    Correlation { strong: r.abs() > 0.7, r }
}

/// Linear extrapolation from the last 30 points over a 7-step horizon;
/// confidence decays as `1 / (1 + k*h)` (§4.7).
pub fn forecast(samples: &[f64], horizon: u32, decay_k: f64) -> Vec<ForecastPoint> {
    let tail: Vec<f64> = samples.iter().rev().take(30).rev().copied().collect();
    if tail.len() < 2 {
        return Vec::new();
    }
    let coeff = trend_coefficient(&tail, 0.0);
    let mean = tail.iter().sum::<f64>() / tail.len() as f64;
    let slope = coeff.relative_slope * mean;
    let last_value = *tail.last().unwrap();

    (1..=horizon)
        .map(|h| {
            let steps = h as f64;
            let value = last_value + slope * steps;
            let confidence = 1.0 / (1.0 + decay_k * steps);
            ForecastPoint { horizon_step: h, value, confidence }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfectly_increasing_series_has_positive_relative_slope() {
        let samples: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * 5.0).collect();
        let coeff = trend_coefficient(&samples, 0.05);
        assert!(coeff.relative_slope > 0.0);
        assert_eq!(coeff.direction, Direction::Increasing);
    }

    #[test]
    fn flat_series_is_stable() {
        let samples = vec![100.0; 20];
        let coeff = trend_coefficient(&samples, 0.05);
        assert_eq!(coeff.direction, Direction::Stable);
    }

    #[test]
    fn moving_average_starts_at_window_minus_one() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ma = moving_average(&samples, 3);
        assert_eq!(ma.len(), 3);
        assert!((ma[0] - 2.0).abs() < 1e-9); // mean(1,2,3)
        assert!((ma[2] - 4.0).abs() < 1e-9); // mean(3,4,5)
    }

    #[test]
    fn change_point_detected_at_step_shift() {
        let mut samples = vec![100.0; 30];
        samples.extend(vec![400.0; 30]);
        let points = change_points(&samples);
        assert!(!points.is_empty(), "expected a change point at the step shift");
    }

    #[test]
    fn no_change_point_in_flat_series() {
        let samples = vec![100.0; 60];
        assert!(change_points(&samples).is_empty());
    }

    #[test]
    fn perfectly_correlated_series_is_strong() {
        let a: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..10).map(|i| i as f64 * 2.0 + 1.0).collect();
        let corr = pearson_correlation(&a, &b);
        assert!(corr.strong);
        assert!((corr.r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn forecast_confidence_decays_with_horizon() {
        let samples: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let points = forecast(&samples, 7, 0.1);
        assert_eq!(points.len(), 7);
        for w in points.windows(2) {
            assert!(w[1].confidence < w[0].confidence);
        }
    }
}
