//! Output of the Trend Analyzer (§4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anomaly::Anomaly;
use crate::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    /// 7 days
    Short,
    /// 30 days
    Medium,
    /// 90 days
    Long,
}

impl Window {
    pub fn days(self) -> i64 {
        match self {
            Window::Short => 7,
            Window::Medium => 30,
            Window::Long => 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SummaryStats {
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub stdev: f64,
    pub coefficient_of_variation: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendCoefficient {
    /// OLS slope normalized by the mean.
    pub relative_slope: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePoint {
    pub index: usize,
    pub before_mean: f64,
    pub after_mean: f64,
    pub pooled_stdev: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Correlation {
    pub strong: bool,
    pub r: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedCorrelation {
    pub feature_a: String,
    pub feature_b: String,
    pub correlation: Correlation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub horizon_step: u32,
    pub value: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalityReport {
    /// Mean value bucketed by hour-of-week (0..168), fixed-size array per
    /// the design note against string-keyed maps in hot paths.
    pub hour_of_week_means: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrendReport {
    InsufficientData {
        repository: Repository,
        window: Window,
        have: usize,
        required: usize,
    },
    Computed(Box<ComputedTrendReport>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedTrendReport {
    pub repository: Repository,
    pub window: Window,
    pub generated_at: DateTime<Utc>,
    pub sample_count: usize,
    pub duration_trend: TrendCoefficient,
    pub success_rate_trend: TrendCoefficient,
    pub stats: SummaryStats,
    pub moving_average: Vec<f64>,
    pub change_points: Vec<ChangePoint>,
    pub anomalies: Vec<Anomaly>,
    pub correlations: Vec<NamedCorrelation>,
    pub forecast: Option<Vec<ForecastPoint>>,
    pub seasonality: Option<SeasonalityReport>,
}

/// Minimum sample count the Trend Analyzer requires before it will compute
/// anything (§4.7 "Data policy").
pub const MIN_TREND_SAMPLES: usize = 5;
