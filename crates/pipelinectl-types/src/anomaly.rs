//! Shared z-score anomaly representation used by both the Trend Analyzer
//! (§4.7) and the Anomaly Detector's baseline check (§4.8).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// |z|>4 critical, >3.5 high, >=3 medium, else low (§4.7). The medium
    /// band's lower edge is inclusive so that z == 3.0 reads as medium,
    /// matching the worked example in §8 scenario 6 (z=3 => medium); every
    /// other band edge in that example (z=4 => high, not critical) is
    /// already consistent with a strict upper/inclusive-lower convention.
    /// Only called once the caller has already established `|z| > z_threshold`.
    pub fn from_abs_z(abs_z: f64) -> Self {
        if abs_z > 4.0 {
            Severity::Critical
        } else if abs_z > 3.5 {
            Severity::High
        } else if abs_z >= 3.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Above,
    Below,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric: String,
    pub value: f64,
    pub z_score: f64,
    pub direction: Direction,
    pub severity: Severity,
}

/// Evaluate a sample against a `{mean, stdev}` baseline. Returns `None`
/// when `|z| <= z_threshold` (boundary is strict `>`, never `>=`, per §8
/// "Anomaly z-scores at exactly 2.5 are not anomalies").
pub fn detect(metric: &str, value: f64, mean: f64, stdev: f64, z_threshold: f64) -> Option<Anomaly> {
    if stdev <= 0.0 {
        return None;
    }
    let z = (value - mean) / stdev;
    if z.abs() <= z_threshold {
        return None;
    }
    Some(Anomaly {
        metric: metric.to_string(),
        value,
        z_score: z,
        direction: if z > 0.0 { Direction::Above } else { Direction::Below },
        severity: Severity::from_abs_z(z.abs()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_exactly_at_threshold_is_not_anomalous() {
        // mean=300, stdev=20, value=350 => z = 2.5 exactly.
        assert!(detect("duration", 350.0, 300.0, 20.0, 2.5).is_none());
    }

    #[test]
    fn z_of_exactly_4_is_high_not_critical() {
        // Worked example (§8 scenario 6): z=4 => severity high, since the
        // critical band's lower edge (>4) is strict.
        let a = detect("duration", 380.0, 300.0, 20.0, 2.5).expect("anomaly");
        assert!((a.z_score - 4.0).abs() < 1e-9);
        assert_eq!(a.severity, Severity::High);
    }

    #[test]
    fn z_of_3_6_is_high_severity() {
        let a = detect("duration", 372.0, 300.0, 20.0, 2.5).expect("anomaly");
        assert!((a.z_score - 3.6).abs() < 1e-9);
        assert_eq!(a.severity, Severity::High);
    }

    #[test]
    fn z_of_exactly_3_is_medium() {
        let a = detect("duration", 360.0, 300.0, 20.0, 2.5).expect("anomaly");
        assert!((a.z_score - 3.0).abs() < 1e-9);
        assert_eq!(a.severity, Severity::Medium);
    }

    #[test]
    fn negative_z_is_below_direction() {
        let a = detect("duration", 220.0, 300.0, 20.0, 2.5).expect("anomaly");
        assert_eq!(a.direction, Direction::Below);
    }
}
