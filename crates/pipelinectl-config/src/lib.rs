//! # pipelinectl-config
//!
//! Layered configuration for the whole control plane (§3, §6
//! "Configuration surface"): built-in defaults, overridden by a
//! `pipelinectl.toml` file, overridden by `PIPELINECTL_*` environment
//! variables. Loaded once at startup; nothing here supports hot reload,
//! matching "changes require restart" (§6).

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use pipelinectl_types::deployment::StageName;

pub const CONFIG_FILE: &str = "pipelinectl.toml";
pub const ENV_PREFIX: &str = "PIPELINECTL_";

/// Complete control-plane configuration (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub health: HealthThresholds,
    #[serde(default)]
    pub intervals: Intervals,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub deployment: DeploymentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            health: HealthThresholds::default(),
            intervals: Intervals::default(),
            anomaly: AnomalyConfig::default(),
            deployment: DeploymentConfig::default(),
        }
    }
}

/// Health-dimension thresholds (§3 "Thresholds").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthThresholds {
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    #[serde(default = "default_max_daily_failures")]
    pub max_daily_failures: u32,
    #[serde(default = "default_max_queue_time_s")]
    pub max_queue_time_s: u64,
    #[serde(default = "default_max_avg_duration_s")]
    pub max_avg_duration_s: u64,
    #[serde(default = "default_max_degradation_rate")]
    pub max_degradation_rate: f64,
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: f64,
    #[serde(default = "default_min_test_coverage_percent")]
    pub min_test_coverage_percent: f64,
    #[serde(default = "default_min_code_quality_score")]
    pub min_code_quality_score: f64,
    #[serde(default = "default_max_security_vulns")]
    pub max_security_vulns: u32,
    #[serde(default = "default_max_flaky_tests")]
    pub max_flaky_tests: u32,
    #[serde(default = "default_max_mttr_hours")]
    pub max_mttr_hours: f64,
    #[serde(default = "default_min_deploy_freq_per_week")]
    pub min_deploy_freq_per_week: f64,
    #[serde(default = "default_max_change_failure_percent")]
    pub max_change_failure_percent: f64,
}

fn default_min_success_rate() -> f64 { 0.85 }
fn default_max_daily_failures() -> u32 { 3 }
fn default_max_queue_time_s() -> u64 { 300 }
fn default_max_avg_duration_s() -> u64 { 600 }
fn default_max_degradation_rate() -> f64 { 0.10 }
fn default_max_cpu_percent() -> f64 { 80.0 }
fn default_min_test_coverage_percent() -> f64 { 70.0 }
fn default_min_code_quality_score() -> f64 { 8.0 }
fn default_max_security_vulns() -> u32 { 0 }
fn default_max_flaky_tests() -> u32 { 2 }
fn default_max_mttr_hours() -> f64 { 4.0 }
fn default_min_deploy_freq_per_week() -> f64 { 1.0 }
fn default_max_change_failure_percent() -> f64 { 15.0 }

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_success_rate: default_min_success_rate(),
            max_daily_failures: default_max_daily_failures(),
            max_queue_time_s: default_max_queue_time_s(),
            max_avg_duration_s: default_max_avg_duration_s(),
            max_degradation_rate: default_max_degradation_rate(),
            max_cpu_percent: default_max_cpu_percent(),
            min_test_coverage_percent: default_min_test_coverage_percent(),
            min_code_quality_score: default_min_code_quality_score(),
            max_security_vulns: default_max_security_vulns(),
            max_flaky_tests: default_max_flaky_tests(),
            max_mttr_hours: default_max_mttr_hours(),
            min_deploy_freq_per_week: default_min_deploy_freq_per_week(),
            max_change_failure_percent: default_max_change_failure_percent(),
        }
    }
}

/// Periodic tick and cache-ttl intervals (§3 "Intervals").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intervals {
    #[serde(with = "humantime_serde", default = "default_health_check_tick")]
    pub health_check_tick: Duration,
    #[serde(with = "humantime_serde", default = "default_trend_tick")]
    pub trend_tick: Duration,
    #[serde(with = "humantime_serde", default = "default_prediction_tick")]
    pub prediction_tick: Duration,
    #[serde(with = "humantime_serde", default = "default_baseline_refresh")]
    pub baseline_refresh: Duration,
    #[serde(with = "humantime_serde", default = "default_trend_cache_ttl")]
    pub trend_cache_ttl: Duration,
    #[serde(with = "humantime_serde", default = "default_model_ttl")]
    pub model_ttl: Duration,
}

fn default_health_check_tick() -> Duration { Duration::from_secs(5 * 60) }
fn default_trend_tick() -> Duration { Duration::from_secs(30 * 60) }
fn default_prediction_tick() -> Duration { Duration::from_secs(60 * 60) }
fn default_baseline_refresh() -> Duration { Duration::from_secs(24 * 60 * 60) }
fn default_trend_cache_ttl() -> Duration { Duration::from_secs(30 * 60) }
fn default_model_ttl() -> Duration { Duration::from_secs(60 * 60) }

impl Default for Intervals {
    fn default() -> Self {
        Self {
            health_check_tick: default_health_check_tick(),
            trend_tick: default_trend_tick(),
            prediction_tick: default_prediction_tick(),
            baseline_refresh: default_baseline_refresh(),
            trend_cache_ttl: default_trend_cache_ttl(),
            model_ttl: default_model_ttl(),
        }
    }
}

/// Anomaly-detection tunables (§3 "Anomaly").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    #[serde(default = "default_outlier_significance")]
    pub outlier_significance: f64,
}

fn default_z_threshold() -> f64 { 2.5 }
fn default_outlier_significance() -> f64 { 0.05 }

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            z_threshold: default_z_threshold(),
            outlier_significance: default_outlier_significance(),
        }
    }
}

/// Deployment orchestration tunables (§3 "Deployment").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "default_per_repo_concurrency")]
    pub per_repo_concurrency: u32,
    #[serde(with = "humantime_serde", default = "default_webhook_dedup_window")]
    pub webhook_dedup_window: Duration,
    #[serde(default = "default_stage_timeouts")]
    pub stage_timeouts_s: HashMap<String, u64>,
    #[serde(default)]
    pub retry_policy: RetryPolicyConfig,
    #[serde(with = "humantime_serde", default = "default_rollback_budget")]
    pub rollback_budget: Duration,
    /// Health-check sub-request timeout (§5 "Cancellation and timeouts").
    #[serde(with = "humantime_serde", default = "default_health_check_request_timeout")]
    pub health_check_request_timeout: Duration,
    /// Webhook payload size cap in bytes (§4.11).
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
}

fn default_per_repo_concurrency() -> u32 { 1 }
fn default_webhook_dedup_window() -> Duration { Duration::from_secs(600) }
fn default_rollback_budget() -> Duration { Duration::from_secs(180) }
fn default_health_check_request_timeout() -> Duration { Duration::from_secs(10) }
fn default_max_payload_bytes() -> u64 { 1024 * 1024 }

fn default_stage_timeouts() -> HashMap<String, u64> {
    let mut m = HashMap::new();
    m.insert(StageName::Validate.as_str().to_string(), 60);
    m.insert(StageName::Backup.as_str().to_string(), 120);
    m.insert(StageName::Apply.as_str().to_string(), 300);
    m.insert(StageName::Verify.as_str().to_string(), 120);
    m.insert(StageName::Rollback.as_str().to_string(), 180);
    m
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            per_repo_concurrency: default_per_repo_concurrency(),
            webhook_dedup_window: default_webhook_dedup_window(),
            stage_timeouts_s: default_stage_timeouts(),
            retry_policy: RetryPolicyConfig::default(),
            rollback_budget: default_rollback_budget(),
            health_check_request_timeout: default_health_check_request_timeout(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl DeploymentConfig {
    /// Timeout for `stage`, falling back to the apply timeout if a caller's
    /// config map omits an entry (keeps partial TOML overrides safe).
    pub fn stage_timeout(&self, stage: StageName) -> Duration {
        self.stage_timeouts_s
            .get(stage.as_str())
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or_else(|| Duration::from_secs(300))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(with = "humantime_serde", default = "default_base_backoff")]
    pub base_backoff: Duration,
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    pub max_backoff: Duration,
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_base_backoff() -> Duration { Duration::from_secs(2) }
fn default_max_backoff() -> Duration { Duration::from_secs(60) }
fn default_jitter_fraction() -> f64 { 0.2 }

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff: default_base_backoff(),
            max_backoff: default_max_backoff(),
            jitter_fraction: default_jitter_fraction(),
        }
    }
}

/// Load configuration: defaults, then `path/pipelinectl.toml` if present,
/// then `PIPELINECTL_*` environment overrides (§6).
pub fn load_config(dir: &Path) -> Result<Config> {
    let mut config = load_config_from_file_or_default(&dir.join(CONFIG_FILE))?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

pub fn load_config_from_file_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    Ok(config)
}

/// Apply a fixed set of scalar env overrides. Only the most commonly tuned
/// knobs are exposed this way; structural overrides (e.g. per-stage
/// timeouts) require the TOML file.
fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(v) = env_f64("ANOMALY_Z_THRESHOLD")? {
        config.anomaly.z_threshold = v;
    }
    if let Some(v) = env_f64("HEALTH_MIN_SUCCESS_RATE")? {
        config.health.min_success_rate = v;
    }
    if let Some(v) = env_u32("DEPLOYMENT_PER_REPO_CONCURRENCY")? {
        config.deployment.per_repo_concurrency = v;
    }
    if let Some(v) = env_u64_secs("DEPLOYMENT_WEBHOOK_DEDUP_WINDOW_S")? {
        config.deployment.webhook_dedup_window = v;
    }
    if let Some(v) = env_u64_secs("DEPLOYMENT_ROLLBACK_BUDGET_S")? {
        config.deployment.rollback_budget = v;
    }
    Ok(())
}

fn env_var(suffix: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{suffix}")).ok()
}

fn env_f64(suffix: &str) -> Result<Option<f64>> {
    env_var(suffix)
        .map(|v| v.parse::<f64>().with_context(|| format!("invalid {ENV_PREFIX}{suffix}: {v}")))
        .transpose()
}

fn env_u32(suffix: &str) -> Result<Option<u32>> {
    env_var(suffix)
        .map(|v| v.parse::<u32>().with_context(|| format!("invalid {ENV_PREFIX}{suffix}: {v}")))
        .transpose()
}

fn env_u64_secs(suffix: &str) -> Result<Option<Duration>> {
    env_var(suffix)
        .map(|v| {
            v.parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("invalid {ENV_PREFIX}{suffix}: {v}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let c = Config::default();
        assert_eq!(c.health.min_success_rate, 0.85);
        assert_eq!(c.health.max_daily_failures, 3);
        assert_eq!(c.anomaly.z_threshold, 2.5);
        assert_eq!(c.deployment.per_repo_concurrency, 1);
        assert_eq!(c.deployment.webhook_dedup_window, Duration::from_secs(600));
        assert_eq!(c.deployment.rollback_budget, Duration::from_secs(180));
        assert_eq!(c.intervals.health_check_tick, Duration::from_secs(300));
        assert_eq!(c.intervals.baseline_refresh, Duration::from_secs(86_400));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let td = tempfile::tempdir().expect("tempdir");
        let config = load_config_from_file_or_default(&td.path().join(CONFIG_FILE)).expect("load");
        assert_eq!(config.anomaly.z_threshold, 2.5);
    }

    #[test]
    fn partial_toml_overrides_fall_back_to_defaults() {
        let td = tempfile::tempdir().expect("tempdir");
        let path = td.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
[anomaly]
z_threshold = 3.0
"#,
        )
        .expect("write");
        let config = load_config_from_file_or_default(&path).expect("load");
        assert_eq!(config.anomaly.z_threshold, 3.0);
        assert_eq!(config.anomaly.outlier_significance, 0.05);
        assert_eq!(config.health.min_success_rate, 0.85);
    }

    #[test]
    fn stage_timeout_falls_back_when_entry_missing() {
        let mut config = DeploymentConfig::default();
        config.stage_timeouts_s.remove(StageName::Apply.as_str());
        assert_eq!(config.stage_timeout(StageName::Apply), Duration::from_secs(300));
        assert_eq!(config.stage_timeout(StageName::Backup), Duration::from_secs(120));
    }
}
