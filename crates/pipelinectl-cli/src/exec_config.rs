//! Which sub-process to shell out to for each collaborator capability
//! (§6). Not part of `pipelinectl_config::Config`: these are CLI-operator
//! wiring decisions (what to run), not control-plane tuning knobs (how
//! long to wait, how many times to retry), so they load from their own
//! `PIPELINECTL_*_COMMAND` environment variables rather than the TOML
//! config file.
//!
//! A command is whitespace-split into `program` + `args`; this does not
//! support quoting, matching the scope of a reference CLI (an operator
//! who needs shell quoting wraps their own script and points a
//! `*_COMMAND` variable at it instead).

use std::time::Duration;

use pipelinectl_exec::CommandSpec;

/// A command that always exits 0 and prints nothing, used as the default
/// so the CLI is runnable out of the box against no real integration.
const NOOP: &str = "true";

pub struct ExecConfig {
    pub apply_command: CommandSpec,
    pub backup_create_command: CommandSpec,
    pub backup_restore_command: CommandSpec,
    pub health_check_command: CommandSpec,
    pub notify_command: Option<CommandSpec>,
    pub command_timeout: Duration,
}

impl ExecConfig {
    pub fn from_env() -> Self {
        Self {
            apply_command: command_from_env("PIPELINECTL_APPLY_COMMAND", NOOP),
            backup_create_command: command_from_env("PIPELINECTL_BACKUP_CREATE_COMMAND", NOOP),
            backup_restore_command: command_from_env("PIPELINECTL_BACKUP_RESTORE_COMMAND", NOOP),
            health_check_command: command_from_env("PIPELINECTL_HEALTH_CHECK_COMMAND", NOOP),
            notify_command: std::env::var("PIPELINECTL_NOTIFY_COMMAND").ok().map(|v| parse(&v)),
            command_timeout: Duration::from_secs(30),
        }
    }
}

fn command_from_env(var: &str, default: &str) -> CommandSpec {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    parse(&raw)
}

fn parse(raw: &str) -> CommandSpec {
    let mut words = raw.split_whitespace().map(str::to_string);
    let program = words.next().unwrap_or_else(|| NOOP.to_string());
    CommandSpec::new(program, words.collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_falls_back_to_noop() {
        let spec = command_from_env("PIPELINECTL_APPLY_COMMAND_TEST_UNSET_UNIQUE", NOOP);
        assert_eq!(spec.program, "true");
        assert!(spec.args.is_empty());
    }

    #[test]
    fn multi_word_command_splits_program_and_args() {
        let spec = parse("kubectl apply -f manifest.yaml");
        assert_eq!(spec.program, "kubectl");
        assert_eq!(spec.args, vec!["apply", "-f", "manifest.yaml"]);
    }
}
