//! Error types for command execution, metric probes, and remote sessions.
//!
//! Probe errors never leave the collector: it logs them and substitutes the
//! documented default. Session errors are fatal to a remote collection.

use std::time::Duration;

use thiserror::Error;

/// Failure to run a single command on a target.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` exited with status {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("argument cannot be shell-quoted: {0:?}")]
    Quote(String),

    #[error("ssh channel error: {0}")]
    Channel(#[from] russh::Error),
}

/// Failure of one metric probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("unparseable {metric} output: {detail}")]
    Parse {
        metric: &'static str,
        detail: String,
    },

    #[error("{metric} system call failed: {source}")]
    Os {
        metric: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    pub(crate) fn parse(metric: &'static str, detail: impl Into<String>) -> Self {
        ProbeError::Parse {
            metric,
            detail: detail.into(),
        }
    }
}

/// Failure to establish or authenticate a remote session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: russh::Error,
    },

    #[error("failed to load private key: {0}")]
    Key(#[from] russh_keys::Error),

    #[error("no usable private key found for {user}@{addr}")]
    NoKey { user: String, addr: String },

    #[error("authentication rejected for {user}@{addr}")]
    AuthRejected { user: String, addr: String },

    #[error("ssh protocol error: {0}")]
    Protocol(#[from] russh::Error),
}
