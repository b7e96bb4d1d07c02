mod exec_config;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use pipelinectl::adapters::TrendDegradationAdapter;
use pipelinectl::requests::{ManualDeploymentRequest, RollbackRequest};
use pipelinectl::{Deps, Orchestrator};
use pipelinectl_anomaly::AnomalyDetector;
use pipelinectl_config::Config;
use pipelinectl_events::Bus;
use pipelinectl_exec::{ShellApplier, ShellBackup, ShellNotificationSink, ShellTargetHealth};
use pipelinectl_health::HealthChecker;
use pipelinectl_metrics::{MetricsSource, StaticMetricsSource};
use pipelinectl_monitor::Monitor;
use pipelinectl_store::{AuditFilters, HistoryFilters, InMemoryStore, Store};
use pipelinectl_trend::{AnalyzeOptions, TrendAnalyzer};
use pipelinectl_types::collaborators::NotificationSink;
use pipelinectl_types::deployment::DeploymentState;
use pipelinectl_types::ids::DeploymentId;
use pipelinectl_types::Repository;
use pipelinectl_webhook::{handle_webhook, WebhookDeps};

use exec_config::ExecConfig;

#[derive(Parser, Debug)]
#[command(name = "pipelinectl", version)]
#[command(about = "GitOps deployment orchestration and pipeline-health control plane")]
struct Cli {
    /// Directory containing pipelinectl.toml (defaults applied if absent).
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// HMAC secret for verifying inbound webhooks. Falls back to an
    /// insecure development default if unset — never use that in
    /// production (§4.1).
    #[arg(long, env = "PIPELINECTL_WEBHOOK_SECRET", default_value = "dev-secret-change-me")]
    webhook_secret: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a manually-triggered deployment (§6 "Inbound: manual deployment").
    Deploy {
        repository: String,
        branch: String,
        /// Commit sha; omit to deploy the latest commit on `branch`.
        #[arg(long)]
        commit: Option<String>,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        triggered_by: String,
        #[arg(long)]
        no_backup: bool,
        #[arg(long)]
        skip_health_check: bool,
    },
    /// Roll a terminal deployment back to its backup (§6 "Inbound: rollback").
    Rollback {
        deployment_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Process one webhook delivery and trigger its deployment (C11, §4.11).
    Webhook {
        /// Path to the raw request body; reads stdin when omitted.
        #[arg(long)]
        body_file: Option<PathBuf>,
        #[arg(long)]
        signature: Option<String>,
        #[arg(long, default_value = "127.0.0.1")]
        source_ip: IpAddr,
    },
    /// List deployment history (§4.2, §4.4).
    History {
        #[arg(long)]
        repository: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Query the audit log (§4.2).
    Audit {
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Evaluate and print a repository's current health report (C5, §4.5).
    Health { repository: String },
    /// Run the trend analyzer for a repository over a window (C7, §4.7).
    Trend {
        repository: String,
        #[arg(long, default_value = "short")]
        window: String,
    },
    /// Run the failure-prediction model for a repository (C8, §4.8).
    Predict { repository: String },
    /// Start the three background ticks (health/trend/prediction, C9 §4.9)
    /// and block until stdin is closed.
    Monitor,
}

/// Everything the subcommands share: the config, the in-memory store, and
/// the component instances built from it. A fresh process gets a fresh
/// store (§1 "thin CLI"); a durable `Store` backend is a pluggable
/// integration point outside this crate, matching `pipelinectl-store`'s
/// own module doc.
struct App {
    config: Config,
    store: Arc<InMemoryStore>,
    metrics: Arc<dyn MetricsSource>,
    health_checker: Arc<HealthChecker>,
    trend: Arc<TrendAnalyzer>,
    anomaly: Arc<AnomalyDetector>,
    deployment_bus: Bus<pipelinectl_types::event::DeploymentEvent>,
    health_bus: Bus<pipelinectl_types::event::HealthEvent>,
    alert_bus: Bus<pipelinectl_types::event::AlertEvent>,
    notifications: Option<Arc<dyn NotificationSink>>,
}

impl App {
    fn new(config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        // No real CI/CD integration is wired in by default (§4.6 "a real
        // integration implements MetricsSource outside this crate"); an
        // empty fixture keeps every dimension scorable at its default.
        let metrics: Arc<dyn MetricsSource> = Arc::new(StaticMetricsSource::new());

        let trend = Arc::new(TrendAnalyzer::new(Arc::clone(&metrics), config.anomaly.clone(), config.intervals.trend_cache_ttl));
        let anomaly = Arc::new(AnomalyDetector::new(Arc::clone(&metrics), Arc::clone(&trend), config.anomaly.clone(), config.intervals.model_ttl));
        let degradation = Arc::new(TrendDegradationAdapter(Arc::clone(&trend)));
        let health_checker = Arc::new(HealthChecker::new(Arc::clone(&metrics), degradation, config.health.clone()));

        let exec = ExecConfig::from_env();
        let notifications: Option<Arc<dyn NotificationSink>> = exec
            .notify_command
            .clone()
            .map(|cmd| Arc::new(ShellNotificationSink::new(cmd, exec.command_timeout)) as Arc<dyn NotificationSink>);

        Self {
            config,
            store,
            metrics,
            health_checker,
            trend,
            anomaly,
            deployment_bus: Bus::with_default_capacity(),
            health_bus: Bus::new(64),
            alert_bus: Bus::new(64),
            notifications,
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        let exec = ExecConfig::from_env();
        let mut deps = Deps::new(
            Arc::clone(&self.store) as Arc<dyn Store>,
            Arc::new(ShellBackup::new(exec.backup_create_command.clone(), exec.backup_restore_command.clone(), exec.command_timeout)),
            Arc::new(ShellApplier::new(exec.apply_command.clone(), exec.command_timeout)),
            Arc::new(ShellTargetHealth::new(exec.health_check_command.clone(), exec.command_timeout)),
            Arc::clone(&self.health_checker),
            self.config.deployment.clone(),
        );
        deps.deployment_bus = self.deployment_bus.clone();
        if let Some(sink) = &self.notifications {
            deps = deps.with_notifications(Arc::clone(sink));
        }
        Orchestrator::new(Arc::new(deps))
    }

    fn monitor(&self) -> Arc<Monitor> {
        let mut monitor = Monitor::new(
            Arc::clone(&self.metrics),
            Arc::clone(&self.health_checker),
            Arc::clone(&self.trend),
            Arc::clone(&self.anomaly),
            Arc::clone(&self.store) as Arc<dyn Store>,
            self.health_bus.clone(),
            self.alert_bus.clone(),
            self.config.intervals.clone(),
        );
        if let Some(sink) = &self.notifications {
            monitor = monitor.with_notifications(Arc::clone(sink));
        }
        Arc::new(monitor)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = pipelinectl_config::load_config(&cli.config_dir).context("loading pipelinectl.toml")?;
    let app = App::new(config);

    match cli.cmd {
        Commands::Deploy { repository, branch, commit, reason, triggered_by, no_backup, skip_health_check } => {
            let request = ManualDeploymentRequest {
                repository,
                commit,
                branch,
                reason,
                create_backup: !no_backup,
                skip_health_check,
                triggered_by,
            };
            let orchestrator = app.orchestrator();
            let id = orchestrator.submit_manual_deployment(&request)?;
            print_deployment(&app, &id)?;
        }
        Commands::Rollback { deployment_id, reason } => {
            let request = RollbackRequest { deployment_id, reason };
            let orchestrator = app.orchestrator();
            let id = orchestrator.submit_rollback(&request)?;
            print_deployment(&app, &id)?;
        }
        Commands::Webhook { body_file, signature, source_ip } => {
            let body = match body_file {
                Some(path) => std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
                None => {
                    use std::io::Read;
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf).context("reading webhook body from stdin")?;
                    buf
                }
            };
            let webhook_deps = WebhookDeps::new(app.webhook_secret_bytes(&cli.webhook_secret), Arc::clone(&app.store) as Arc<dyn Store>, app.config.deployment.clone());
            let accepted = handle_webhook(&body, signature.as_deref(), source_ip, &webhook_deps)?;
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "deployment_id": accepted.deployment_id.as_str(),
                "deduplicated": accepted.deduplicated,
            }))?);
            if !accepted.deduplicated {
                let orchestrator = app.orchestrator();
                orchestrator.trigger_deployment(accepted.deployment_id.clone())?;
            }
            print_deployment(&app, &accepted.deployment_id)?;
        }
        Commands::History { repository, state, limit } => {
            let filters = HistoryFilters {
                repository: repository.map(Repository::new),
                state: state.as_deref().map(parse_state).transpose()?,
                since: None,
            };
            let history = app.store.query_history(&filters, limit, 0)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Commands::Audit { actor, action, limit } => {
            let filters = AuditFilters { actor, action, resource_kind: None, since: None, until: None };
            let events = app.store.query_audit(&filters, limit, 0)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        Commands::Health { repository } => {
            let report = app.health_checker.evaluate(&Repository::new(repository));
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Trend { repository, window } => {
            let window = parse_window(&window)?;
            let report = app.trend.analyze(&Repository::new(repository), window, AnalyzeOptions { include_seasonality: true, include_forecast: true, include_anomalies: true });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Predict { repository } => {
            let prediction = app.anomaly.predict_failure(&Repository::new(repository));
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        Commands::Monitor => {
            let monitor = app.monitor();
            let handle = monitor.start();
            eprintln!("monitor running (health/trend/prediction ticks); press enter to stop");
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).context("reading stdin")?;
            handle.stop();
        }
    }

    Ok(())
}

impl App {
    fn webhook_secret_bytes(&self, secret: &str) -> Vec<u8> {
        secret.as_bytes().to_vec()
    }
}

fn print_deployment(app: &App, id: &DeploymentId) -> Result<()> {
    let deployment = app.store.lookup_deployment_by_id(id)?;
    println!("{}", serde_json::to_string_pretty(&deployment)?);
    Ok(())
}

fn parse_state(s: &str) -> Result<DeploymentState> {
    Ok(match s {
        "pending" => DeploymentState::Pending,
        "validating" => DeploymentState::Validating,
        "backing_up" => DeploymentState::BackingUp,
        "applying" => DeploymentState::Applying,
        "verifying" => DeploymentState::Verifying,
        "rolling_back" => DeploymentState::RollingBack,
        "completed" => DeploymentState::Completed,
        "failed" => DeploymentState::Failed,
        "cancelled" => DeploymentState::Cancelled,
        other => anyhow::bail!("unknown deployment state: {other}"),
    })
}

fn parse_window(s: &str) -> Result<pipelinectl_types::trend::Window> {
    use pipelinectl_types::trend::Window;
    Ok(match s {
        "short" => Window::Short,
        "medium" => Window::Medium,
        "long" => Window::Long,
        other => anyhow::bail!("unknown trend window: {other} (expected short|medium|long)"),
    })
}
