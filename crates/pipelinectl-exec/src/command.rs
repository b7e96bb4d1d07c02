//! Sub-process spawn/capture/timeout primitive shared by every adapter in
//! this crate. Adapted from the workspace's own process-execution helper:
//! poll `try_wait` against a deadline, kill and report `timed_out` instead
//! of blocking forever.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// A command plus the environment variables it should run with.
/// `{repository}`/`{commit}`/`{backup_ref}` tokens in `program`/`args` are
/// substituted by the caller before running (see `render` in `lib.rs`).
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args, env: Vec::new() }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

/// Run `spec`, killing and reporting `timed_out: true` if it exceeds
/// `timeout` rather than blocking indefinitely.
pub fn run_command_with_timeout(spec: &CommandSpec, timeout: Duration) -> std::io::Result<CommandOutput> {
    let start = Instant::now();

    let mut command = Command::new(&spec.program);
    command.args(&spec.args).stdout(Stdio::piped()).stderr(Stdio::piped());
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    let mut child = command.spawn()?;
    let deadline = start + timeout;

    loop {
        match child.try_wait()? {
            Some(status) => {
                return Ok(CommandOutput {
                    success: status.success(),
                    exit_code: status.code(),
                    stdout: read_pipe(child.stdout.take()),
                    stderr: read_pipe(child.stderr.take()),
                    timed_out: false,
                    duration: start.elapsed(),
                });
            }
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(CommandOutput {
                        success: false,
                        exit_code: None,
                        stdout: read_pipe(child.stdout.take()),
                        stderr: read_pipe(child.stderr.take()),
                        timed_out: true,
                        duration: start.elapsed(),
                    });
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    }
}

fn read_pipe<R: Read>(stream: Option<R>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut s) = stream {
        let _ = s.read_to_end(&mut buffer);
    }
    String::from_utf8_lossy(&buffer).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_command_is_not_timed_out() {
        let spec = CommandSpec::new("echo", vec!["hi".to_string()]);
        let out = run_command_with_timeout(&spec, Duration::from_secs(5)).unwrap();
        assert!(out.success);
        assert!(!out.timed_out);
        assert_eq!(out.stdout.trim(), "hi");
    }

    #[test]
    fn env_vars_are_visible_to_the_child() {
        let spec = CommandSpec::new("sh", vec!["-c".to_string(), "echo $FOO".to_string()]).with_env("FOO", "bar");
        let out = run_command_with_timeout(&spec, Duration::from_secs(5)).unwrap();
        assert_eq!(out.stdout.trim(), "bar");
    }

    #[test]
    fn exceeding_the_timeout_kills_the_child_and_reports_timed_out() {
        let spec = CommandSpec::new("sh", vec!["-c".to_string(), "sleep 5".to_string()]);
        let out = run_command_with_timeout(&spec, Duration::from_millis(50)).unwrap();
        assert!(out.timed_out);
        assert!(!out.success);
    }
}
