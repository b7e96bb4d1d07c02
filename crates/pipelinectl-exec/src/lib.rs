//! # pipelinectl-exec
//!
//! Reference, sub-process-backed implementations of the four collaborator
//! traits in `pipelinectl_types::collaborators` (`Backup`, `Applier`,
//! `TargetHealth`, `NotificationSink`). The orchestrator (§4.10) and the
//! webhook/manual intake paths never invoke a concrete template engine or
//! target API directly — "template/config application, invoked as an
//! opaque sub-process" (§1, §6) — so every adapter here shells out to an
//! operator-configured command and interprets its exit code and stdout.
//! Wiring a real CI/CD or GitOps integration means swapping these for a
//! crate that talks to that system's own API; nothing above this crate
//! depends on it directly.
//!
//! Grounded on the same spawn/capture/timeout idiom the rest of the
//! workspace uses for subprocess execution.

mod command;

use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

use pipelinectl_types::collaborators::{
    AlertLevel, ApplyOutcome, Applier, Backup, NotificationSink, RestoreOutcome, TargetHealth,
    TargetHealthSnapshot, VerifyOutcome,
};
use pipelinectl_types::ids::BackupRef;
use pipelinectl_types::{Error, Repository, Result};

pub use command::{run_command_with_timeout, CommandOutput, CommandSpec};

/// Substitute `{repository}`, `{commit}`, and `{backup_ref}` tokens in each
/// argument of `spec` before running it.
fn render(spec: &CommandSpec, repository: &str, commit: &str, backup_ref: &str) -> CommandSpec {
    let substitute = |s: &str| {
        s.replace("{repository}", repository)
            .replace("{commit}", commit)
            .replace("{backup_ref}", backup_ref)
    };
    CommandSpec {
        program: substitute(&spec.program),
        args: spec.args.iter().map(|a| substitute(a)).collect(),
        env: spec.env.clone(),
    }
}

/// Invokes a configured command to apply a deployment (§6 "opaque
/// sub-process"). Exit code 0 is success; any other exit code is an
/// `ApplyOutcome::Failed`, not an `Err` (a non-retriable application
/// failure, distinct from the command failing to run at all); exceeding
/// `timeout` surfaces as `Error::Timeout`, which the stage retry policy
/// treats as retriable (§7).
pub struct ShellApplier {
    command: CommandSpec,
    timeout: Duration,
}

impl ShellApplier {
    pub fn new(command: CommandSpec, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

impl Applier for ShellApplier {
    fn apply(&self, repository: &Repository, commit: &str) -> Result<ApplyOutcome> {
        let spec = render(&self.command, repository.as_str(), commit, "");
        let output = run_command_with_timeout(&spec, self.timeout)
            .map_err(|e| Error::ApplyFailed(format!("failed to spawn {}: {e}", spec.program)))?;
        if output.timed_out {
            return Err(Error::Timeout);
        }
        if output.success {
            Ok(ApplyOutcome::Ok)
        } else {
            Ok(ApplyOutcome::Failed { kind: "nonzero_exit".to_string(), message: output.stderr.trim().to_string() })
        }
    }
}

/// Backup artifact lifecycle (§6) implemented as three independently
/// configured commands. `create`'s stdout, trimmed, becomes the
/// `BackupRef`; when it prints nothing a ref is derived from the
/// repository and commit instead.
pub struct ShellBackup {
    create: CommandSpec,
    restore: CommandSpec,
    verify: Option<CommandSpec>,
    timeout: Duration,
}

impl ShellBackup {
    pub fn new(create: CommandSpec, restore: CommandSpec, timeout: Duration) -> Self {
        Self { create, restore, verify: None, timeout }
    }

    pub fn with_verify(mut self, verify: CommandSpec) -> Self {
        self.verify = Some(verify);
        self
    }
}

impl Backup for ShellBackup {
    fn create(&self, repository: &Repository, commit: &str) -> Result<BackupRef> {
        let spec = render(&self.create, repository.as_str(), commit, "");
        let output = run_command_with_timeout(&spec, self.timeout)
            .map_err(|e| Error::BackupFailed(format!("failed to spawn {}: {e}", spec.program)))?;
        if output.timed_out {
            return Err(Error::Timeout);
        }
        if !output.success {
            return Err(Error::BackupFailed(output.stderr.trim().to_string()));
        }
        let printed = output.stdout.trim();
        let reference = if printed.is_empty() {
            format!("backup_{}_{commit}", repository.as_str().replace('/', "_"))
        } else {
            printed.to_string()
        };
        Ok(BackupRef::new(reference))
    }

    fn restore(&self, backup_ref: &BackupRef) -> Result<RestoreOutcome> {
        let spec = render(&self.restore, "", "", backup_ref.as_str());
        let output = run_command_with_timeout(&spec, self.timeout)
            .map_err(|e| Error::RollbackFailed(format!("failed to spawn {}: {e}", spec.program)))?;
        if output.timed_out {
            return Err(Error::Timeout);
        }
        if output.success {
            return Ok(RestoreOutcome::Ok);
        }
        let failed_services: Vec<String> =
            output.stderr.lines().filter(|l| !l.trim().is_empty()).map(|l| l.trim().to_string()).collect();
        let failed_services = if failed_services.is_empty() { vec!["restore command".to_string()] } else { failed_services };
        if output.stdout.contains("PARTIAL") {
            Ok(RestoreOutcome::Partial { failed_services })
        } else {
            Ok(RestoreOutcome::Failed { failed_services })
        }
    }

    fn verify(&self, backup_ref: &BackupRef) -> Result<VerifyOutcome> {
        let Some(verify) = &self.verify else {
            return Ok(VerifyOutcome::Ok);
        };
        let spec = render(verify, "", "", backup_ref.as_str());
        let output = run_command_with_timeout(&spec, self.timeout)
            .map_err(|e| Error::BackupFailed(format!("failed to spawn {}: {e}", spec.program)))?;
        if output.timed_out || !output.success {
            Ok(VerifyOutcome::Corrupt)
        } else {
            Ok(VerifyOutcome::Ok)
        }
    }
}

/// Target-service health check (§6), run as a configured probe command.
/// Exit 0 means healthy; stdout (trimmed) becomes the reported version.
pub struct ShellTargetHealth {
    command: CommandSpec,
    timeout: Duration,
}

impl ShellTargetHealth {
    pub fn new(command: CommandSpec, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

impl TargetHealth for ShellTargetHealth {
    fn check(&self, repository: &Repository) -> Result<TargetHealthSnapshot> {
        let spec = render(&self.command, repository.as_str(), "", "");
        let output = run_command_with_timeout(&spec, self.timeout)
            .map_err(|e| Error::HealthCheckFailed(format!("failed to spawn {}: {e}", spec.program)))?;
        if output.timed_out {
            return Err(Error::Timeout);
        }
        let version = output.stdout.trim();
        let version = if version.is_empty() { None } else { Some(version.to_string()) };
        if output.success {
            Ok(TargetHealthSnapshot { healthy: true, version, states: Vec::new() })
        } else {
            Ok(TargetHealthSnapshot { healthy: false, version, states: vec![("probe".to_string(), "unhealthy".to_string())] })
        }
    }
}

/// Alerting sink (§6) that shells out once per alert. Best-effort: a
/// command failure is logged and swallowed rather than propagated, since
/// `NotificationSink::alert` has no `Result` to report it through.
pub struct ShellNotificationSink {
    command: CommandSpec,
    timeout: Duration,
    /// Serializes alert delivery so concurrent callers don't interleave
    /// sub-process spawns for the same sink.
    lock: Mutex<()>,
}

impl ShellNotificationSink {
    pub fn new(command: CommandSpec, timeout: Duration) -> Self {
        Self { command, timeout, lock: Mutex::new(()) }
    }
}

impl NotificationSink for ShellNotificationSink {
    fn alert(&self, level: AlertLevel, title: &str, message: &str, context: serde_json::Value) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let level_str = match level {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        };
        let mut spec = self.command.clone();
        spec.env.push(("PIPELINECTL_ALERT_LEVEL".to_string(), level_str.to_string()));
        spec.env.push(("PIPELINECTL_ALERT_TITLE".to_string(), title.to_string()));
        spec.env.push(("PIPELINECTL_ALERT_MESSAGE".to_string(), message.to_string()));
        spec.env.push(("PIPELINECTL_ALERT_CONTEXT".to_string(), context.to_string()));
        match run_command_with_timeout(&spec, self.timeout) {
            Ok(output) if !output.success || output.timed_out => {
                warn!(level = level_str, title, "alert command exited non-zero or timed out");
            }
            Err(e) => warn!(level = level_str, title, error = %e, "failed to spawn alert command"),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(arg: &str) -> CommandSpec {
        CommandSpec::new("echo", vec![arg.to_string()])
    }

    fn failing() -> CommandSpec {
        CommandSpec::new("sh", vec!["-c".to_string(), "exit 1".to_string()])
    }

    #[test]
    fn applier_reports_ok_on_zero_exit() {
        let applier = ShellApplier::new(echo("ok"), Duration::from_secs(5));
        let outcome = applier.apply(&Repository::new("owner/r"), "abc123").unwrap();
        assert_eq!(outcome, ApplyOutcome::Ok);
    }

    #[test]
    fn applier_reports_failed_outcome_not_err_on_nonzero_exit() {
        let applier = ShellApplier::new(failing(), Duration::from_secs(5));
        let outcome = applier.apply(&Repository::new("owner/r"), "abc123").unwrap();
        assert!(matches!(outcome, ApplyOutcome::Failed { .. }));
    }

    #[test]
    fn backup_create_uses_printed_stdout_as_the_reference() {
        let backup = ShellBackup::new(echo("ref-123"), echo("restored"), Duration::from_secs(5));
        let r = backup.create(&Repository::new("owner/r"), "abc123").unwrap();
        assert_eq!(r.as_str(), "ref-123");
    }

    #[test]
    fn backup_restore_failure_lists_stderr_lines_as_failed_services() {
        let backup = ShellBackup::new(
            echo("ref"),
            CommandSpec::new("sh", vec!["-c".to_string(), "echo svc-a 1>&2; exit 1".to_string()]),
            Duration::from_secs(5),
        );
        match backup.restore(&BackupRef::new("ref-123")).unwrap() {
            RestoreOutcome::Failed { failed_services } => assert_eq!(failed_services, vec!["svc-a".to_string()]),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn target_health_unhealthy_on_nonzero_exit() {
        let health = ShellTargetHealth::new(failing(), Duration::from_secs(5));
        let snapshot = health.check(&Repository::new("owner/r")).unwrap();
        assert!(!snapshot.healthy);
    }

    #[test]
    fn slow_command_times_out() {
        let applier = ShellApplier::new(
            CommandSpec::new("sh", vec!["-c".to_string(), "sleep 5".to_string()]),
            Duration::from_millis(50),
        );
        let err = applier.apply(&Repository::new("owner/r"), "abc123").unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }
}
