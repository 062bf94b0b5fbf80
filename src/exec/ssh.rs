//! SSH-backed command execution.
//!
//! A `RemoteSession` is opened once per collection, runs commands one at a time
//! over fresh exec channels, and is closed when the collection finishes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{CommandOutput, CommandRunner, CommandSpec, DEFAULT_COMMAND_TIMEOUT};
use crate::error::{ExecError, SessionError};

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Key files tried, in order, when no password or key is configured.
const DEFAULT_KEY_FILES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

/// Private key supplied either as a path on disk or as PEM/OpenSSH text.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Path(PathBuf),
    Inline(String),
}

impl KeyMaterial {
    /// Interprets a configured value: anything carrying a PEM armor line is
    /// key content, everything else is a path.
    pub fn from_config(value: &str) -> Self {
        if value.contains("-----BEGIN") {
            KeyMaterial::Inline(value.to_string())
        } else {
            KeyMaterial::Path(PathBuf::from(value))
        }
    }

    fn load(&self) -> Result<key::KeyPair, SessionError> {
        let pair = match self {
            KeyMaterial::Path(path) => russh_keys::load_secret_key(path, None)?,
            KeyMaterial::Inline(content) => russh_keys::decode_secret_key(content, None)?,
        };
        Ok(pair)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Path(path) => f.debug_tuple("Path").field(path).finish(),
            KeyMaterial::Inline(_) => f.write_str("Inline(<redacted>)"),
        }
    }
}

/// How to authenticate the remote user.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Password(String),
    Key(KeyMaterial),
    /// Try the key first and fall back to the password if it is rejected or
    /// cannot be loaded.
    KeyWithPasswordFallback { key: KeyMaterial, password: String },
    /// Try the user's default key files under `~/.ssh`.
    DefaultKeys,
}

impl Auth {
    pub fn from_parts(password: Option<String>, key: Option<&str>) -> Self {
        match (key.map(KeyMaterial::from_config), password) {
            (Some(key), Some(password)) => Auth::KeyWithPasswordFallback { key, password },
            (Some(key), None) => Auth::Key(key),
            (None, Some(password)) => Auth::Password(password),
            (None, None) => Auth::DefaultKeys,
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Password(_) => f.write_str("Password(<redacted>)"),
            Auth::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Auth::KeyWithPasswordFallback { key, .. } => f
                .debug_struct("KeyWithPasswordFallback")
                .field("key", key)
                .field("password", &"<redacted>")
                .finish(),
            Auth::DefaultKeys => f.write_str("DefaultKeys"),
        }
    }
}

/// Target and credentials for one remote collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: Auth,
}

impl Credentials {
    pub fn new(host: impl Into<String>, auth: Auth) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: DEFAULT_SSH_USER.to_string(),
            auth,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn label(&self) -> String {
        format!("{}@{}", self.user, self.addr())
    }
}

/// Timeouts applied to a remote session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Client-side handler. Host keys are accepted and logged.
struct HostKeyLogger {
    addr: String,
}

#[async_trait]
impl client::Handler for HostKeyLogger {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            addr = %self.addr,
            fingerprint = %server_public_key.fingerprint(),
            "Accepting server host key"
        );
        Ok(true)
    }
}

/// An authenticated SSH connection.
pub struct RemoteSession {
    handle: Mutex<client::Handle<HostKeyLogger>>,
    label: String,
    command_timeout: Duration,
}

impl RemoteSession {
    /// Connects and authenticates. Any failure here is returned to the caller.
    pub async fn connect(
        credentials: &Credentials,
        options: &SessionOptions,
    ) -> Result<Self, SessionError> {
        let addr = credentials.addr();
        info!(addr = %addr, user = %credentials.user, "Opening SSH session");

        let config = Arc::new(client::Config::default());
        let handler = HostKeyLogger { addr: addr.clone() };
        let connecting = client::connect(
            config,
            (credentials.host.as_str(), credentials.port),
            handler,
        );

        let mut handle = tokio::time::timeout(options.connect_timeout, connecting)
            .await
            .map_err(|_| SessionError::ConnectTimeout {
                addr: addr.clone(),
                timeout: options.connect_timeout,
            })?
            .map_err(|source| SessionError::Connect {
                addr: addr.clone(),
                source,
            })?;

        if !authenticate(&mut handle, credentials).await? {
            return Err(SessionError::AuthRejected {
                user: credentials.user.clone(),
                addr,
            });
        }

        info!(target_host = %credentials.label(), "SSH session established");

        Ok(Self {
            handle: Mutex::new(handle),
            label: credentials.label(),
            command_timeout: options.command_timeout,
        })
    }

    async fn exec(&self, line: &str) -> Result<CommandOutput, ExecError> {
        let handle = self.handle.lock().await;
        let mut channel = handle.channel_open_session().await?;
        channel.exec(true, line).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                // Extended data type 1 is stderr.
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status as i32),
                _ => {}
            }
        }

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }
}

#[async_trait]
impl CommandRunner for RemoteSession {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let line = command.to_shell_line()?;
        debug!(target_host = %self.label, command = %line, "Running remote command");

        tokio::time::timeout(self.command_timeout, self.exec(&line))
            .await
            .map_err(|_| ExecError::Timeout {
                command: line.clone(),
                timeout: self.command_timeout,
            })?
    }

    async fn close(&self) {
        let handle = self.handle.lock().await;
        match handle
            .disconnect(Disconnect::ByApplication, "collection finished", "en")
            .await
        {
            Ok(()) => info!(target_host = %self.label, "SSH session closed"),
            Err(e) => warn!(target_host = %self.label, error = %e, "SSH disconnect failed"),
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

async fn authenticate(
    handle: &mut client::Handle<HostKeyLogger>,
    credentials: &Credentials,
) -> Result<bool, SessionError> {
    let user = credentials.user.as_str();
    match &credentials.auth {
        Auth::Password(password) => Ok(handle
            .authenticate_password(user, password.as_str())
            .await?),
        Auth::Key(key) => authenticate_key(handle, user, key).await,
        Auth::KeyWithPasswordFallback { key, password } => {
            match authenticate_key(handle, user, key).await {
                Ok(true) => return Ok(true),
                Ok(false) => debug!(user, "Key rejected, falling back to password"),
                Err(SessionError::Key(e)) => {
                    warn!(user, error = %e, "Key unusable, falling back to password")
                }
                Err(e) => return Err(e),
            }
            Ok(handle
                .authenticate_password(user, password.as_str())
                .await?)
        }
        Auth::DefaultKeys => {
            let candidates = default_key_files();
            if candidates.is_empty() {
                return Err(SessionError::NoKey {
                    user: user.to_string(),
                    addr: credentials.addr(),
                });
            }
            for path in candidates {
                let material = KeyMaterial::Path(path.clone());
                match authenticate_key(handle, user, &material).await {
                    Ok(true) => return Ok(true),
                    Ok(false) => debug!(key = %path.display(), "Default key rejected"),
                    Err(SessionError::Key(e)) => {
                        warn!(key = %path.display(), error = %e, "Skipping unreadable key")
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(false)
        }
    }
}

async fn authenticate_key(
    handle: &mut client::Handle<HostKeyLogger>,
    user: &str,
    key: &KeyMaterial,
) -> Result<bool, SessionError> {
    let pair = key.load()?;
    Ok(handle.authenticate_publickey(user, Arc::new(pair)).await?)
}

fn default_key_files() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| existing_key_files(&home.join(".ssh")))
        .unwrap_or_default()
}

fn existing_key_files(ssh_dir: &Path) -> Vec<PathBuf> {
    DEFAULT_KEY_FILES
        .iter()
        .map(|name| ssh_dir.join(name))
        .filter(|path| path.is_file())
        .collect()
}
