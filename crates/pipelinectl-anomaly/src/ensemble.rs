//! The three fixed-weight submodels that make up `predict_failure`'s
//! ensemble (§4.8), plus the consolidation and confidence math that
//! combines them.

use pipelinectl_types::prediction::{consolidate_factors, Factor, FeatureSnapshot};

pub const WEIGHT_STATISTICAL: f64 = 0.40;
pub const WEIGHT_TREND: f64 = 0.30;
pub const WEIGHT_PATTERN: f64 = 0.30;

pub struct SubmodelResult {
    pub probability: f64,
    pub factors: Vec<Factor>,
}

/// Baseline failure rate, bumped for temporal and duration-increase
/// signals (§4.8 "Statistical").
pub fn statistical_submodel(features: &FeatureSnapshot) -> SubmodelResult {
    let mut probability = features.baseline_failure_rate;
    let mut factors = Vec::new();

    if let Some(current_hour_rate) = features.current_hour_failure_rate {
        if features.baseline_failure_rate > 0.0 && current_hour_rate > 1.5 * features.baseline_failure_rate {
            probability *= 1.3;
            factors.push(Factor { kind: "temporal-pattern".to_string(), impact: 0.30 });
        }
    }

    if let (Some(recent), Some(historical)) = (features.recent_avg_duration_s, features.historical_success_duration_s) {
        if historical > 0.0 && recent / historical > 1.5 {
            probability *= 1.2;
            factors.push(Factor { kind: "duration-increase".to_string(), impact: 0.20 });
        }
    }

    SubmodelResult { probability: probability.clamp(0.0, 1.0), factors }
}

/// Starts at 0.10; bumped for a degrading duration trend or a declining
/// success-rate trend over the 30-day window (§4.8 "Trend").
pub fn trend_submodel(features: &FeatureSnapshot) -> SubmodelResult {
    let mut probability = 0.10;
    let mut factors = Vec::new();

    if let Some(duration_trend) = features.duration_trend_relative {
        if duration_trend > 0.10 {
            probability += 0.20;
            factors.push(Factor { kind: "duration-increase".to_string(), impact: 0.20 });
        }
    }

    if let Some(success_trend) = features.success_rate_trend_relative {
        if success_trend < -0.10 {
            probability += 0.30;
            factors.push(Factor { kind: "success-rate-decline".to_string(), impact: 0.30 });
        }
    }

    SubmodelResult { probability: probability.clamp(0.0, 1.0), factors }
}

/// Starts at 0.05; bumped when the training window's longest
/// consecutive-failure streak exceeds 2 (§4.8 "Pattern").
pub fn pattern_submodel(features: &FeatureSnapshot) -> SubmodelResult {
    let mut probability: f64 = 0.05;
    let mut factors = Vec::new();

    if features.max_consecutive_failures > 2 {
        probability += 0.25;
        factors.push(Factor { kind: "consecutive-failures".to_string(), impact: 0.25 });
    }

    SubmodelResult { probability: probability.clamp(0.0, 1.0), factors }
}

pub struct Ensemble {
    pub probability: f64,
    pub confidence: f64,
    pub factors: Vec<Factor>,
}

/// Combine the three submodels: weighted mean probability, consolidated
/// factors, and `confidence = max(0, 1 - var(submodel_probabilities))` (§4.8).
pub fn combine(statistical: SubmodelResult, trend: SubmodelResult, pattern: SubmodelResult) -> Ensemble {
    let probabilities = [statistical.probability, trend.probability, pattern.probability];
    let weights = [WEIGHT_STATISTICAL, WEIGHT_TREND, WEIGHT_PATTERN];

    let weighted_sum: f64 = probabilities.iter().zip(weights.iter()).map(|(p, w)| p * w).sum();
    let total_weight: f64 = weights.iter().sum();
    let probability = (weighted_sum / total_weight).clamp(0.0, 1.0);

    let mean = probabilities.iter().sum::<f64>() / probabilities.len() as f64;
    let variance = probabilities.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / probabilities.len() as f64;
    let confidence = (1.0 - variance).max(0.0);

    let mut all_factors = statistical.factors;
    all_factors.extend(trend.factors);
    all_factors.extend(pattern.factors);

    Ensemble { probability, confidence, factors: consolidate_factors(all_factors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_features() -> FeatureSnapshot {
        FeatureSnapshot {
            baseline_failure_rate: 0.05,
            current_hour_failure_rate: None,
            recent_avg_duration_s: None,
            historical_success_duration_s: None,
            duration_trend_relative: None,
            success_rate_trend_relative: None,
            max_consecutive_failures: 0,
            recent_repository_changes: None,
        }
    }

    #[test]
    fn statistical_submodel_bumps_on_temporal_pattern() {
        let mut features = baseline_features();
        features.current_hour_failure_rate = Some(0.20); // > 1.5 * 0.05
        let result = statistical_submodel(&features);
        assert!(result.probability > features.baseline_failure_rate);
        assert!(result.factors.iter().any(|f| f.kind == "temporal-pattern"));
    }

    #[test]
    fn trend_submodel_starts_at_point_one() {
        let features = baseline_features();
        let result = trend_submodel(&features);
        assert!((result.probability - 0.10).abs() < 1e-9);
    }

    #[test]
    fn pattern_submodel_bumps_past_two_consecutive_failures() {
        let mut features = baseline_features();
        features.max_consecutive_failures = 3;
        let result = pattern_submodel(&features);
        assert!((result.probability - 0.30).abs() < 1e-9);
    }

    #[test]
    fn combine_matches_fixed_weighted_mean() {
        let statistical = SubmodelResult { probability: 0.8, factors: vec![] };
        let trend = SubmodelResult { probability: 0.2, factors: vec![] };
        let pattern = SubmodelResult { probability: 0.2, factors: vec![] };
        let ensemble = combine(statistical, trend, pattern);
        let expected = 0.8 * 0.40 + 0.2 * 0.30 + 0.2 * 0.30;
        assert!((ensemble.probability - expected).abs() < 1e-9);
    }

    #[test]
    fn identical_submodel_probabilities_give_full_confidence() {
        let a = SubmodelResult { probability: 0.5, factors: vec![] };
        let b = SubmodelResult { probability: 0.5, factors: vec![] };
        let c = SubmodelResult { probability: 0.5, factors: vec![] };
        let ensemble = combine(a, b, c);
        assert!((ensemble.confidence - 1.0).abs() < 1e-9);
    }
}
