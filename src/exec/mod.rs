/*!
 * Command Execution Module
 *
 * Runs argument-vector commands on a target host, either as a local child
 * process or over an SSH session.
 */

pub mod ssh;

pub use ssh::{Auth, Credentials, KeyMaterial, RemoteSession, SessionOptions};

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExecError;

/// Default upper bound on a single command's runtime.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// A program plus its arguments. Arguments are never interpreted by a shell
/// locally, and are individually quoted when rendered for a remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Renders the command as one POSIX shell line with every word quoted.
    pub fn to_shell_line(&self) -> Result<String, ExecError> {
        let words = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str));
        shlex::try_join(words).map_err(|_| ExecError::Quote(self.to_string()))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the target never reported an exit status.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code.map_or(true, |code| code == 0)
    }

    /// Returns stdout, or a `NonZeroExit` error if the command failed.
    pub fn into_stdout(self, command: &CommandSpec) -> Result<String, ExecError> {
        match self.exit_code {
            Some(code) if code != 0 => Err(ExecError::NonZeroExit {
                command: command.to_string(),
                code,
                stderr: self.stderr.trim().to_string(),
            }),
            _ => Ok(self.stdout),
        }
    }
}

/// Anything that can execute commands on a host.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs one command to completion and captures its output.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ExecError>;

    /// Releases any connection held by the runner.
    async fn close(&self) {}

    /// Human-readable label for the target, used in reports and logs.
    fn describe(&self) -> String;
}

/// Runs commands as child processes of the agent.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    timeout: Duration,
}

impl LocalRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ExecError> {
        debug!(command = %command, "Running local command");

        let child = Command::new(command.program())
            .args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: command.program().to_string(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout {
                command: command.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| ExecError::Spawn {
                program: command.program().to_string(),
                source,
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn describe(&self) -> String {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_line_quotes_hostile_arguments() {
        let spec = CommandSpec::new("journalctl")
            .arg("-u")
            .arg("nginx.service; rm -rf /")
            .args(["-n", "20"]);
        let line = spec.to_shell_line().unwrap();
        let words = shlex::split(&line).unwrap();
        assert_eq!(
            words,
            vec!["journalctl", "-u", "nginx.service; rm -rf /", "-n", "20"]
        );
    }

    #[test]
    fn shell_line_rejects_nul_bytes() {
        let spec = CommandSpec::new("journalctl").arg("bad\0unit");
        assert!(matches!(spec.to_shell_line(), Err(ExecError::Quote(_))));
    }

    #[test]
    fn missing_exit_status_counts_as_success() {
        let spec = CommandSpec::new("free");
        let output = CommandOutput {
            exit_code: None,
            stdout: "ok".to_string(),
            stderr: String::new(),
        };
        assert!(output.success());
        assert_eq!(output.into_stdout(&spec).unwrap(), "ok");
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let spec = CommandSpec::new("systemctl").arg("--failed");
        let output = CommandOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "Failed to connect to bus\n".to_string(),
        };
        match output.into_stdout(&spec) {
            Err(ExecError::NonZeroExit { code, stderr, .. }) => {
                assert_eq!(code, 1);
                assert_eq!(stderr, "Failed to connect to bus");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn local_runner_captures_stdout() {
        let runner = LocalRunner::default();
        let output = runner
            .run(&CommandSpec::new("echo").arg("hello world"))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello world");
    }

    #[tokio::test]
    async fn local_runner_reports_missing_program() {
        let runner = LocalRunner::default();
        let err = runner
            .run(&CommandSpec::new("definitely-not-a-real-binary-rca"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[tokio::test]
    async fn local_runner_enforces_timeout() {
        let runner = LocalRunner::new(Duration::from_millis(100));
        let err = runner
            .run(&CommandSpec::new("sleep").arg("5"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
    }
}
