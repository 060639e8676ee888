//! Launching the remote agent process.
//!
//! The sync session only needs three byte streams and a way to tear the
//! process down, so launching is behind the [`AgentLauncher`] trait: the
//! real implementation spawns the configured command with piped stdio,
//! and tests substitute in-process duplex pipes.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
  io::{AsyncRead, AsyncWrite},
  process::{Child, Command},
};
use tracing::debug;

#[derive(Debug, Error)]
pub enum LaunchError {
  #[error("failed to spawn agent `{command}`: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },
  #[error("agent stdio was not piped")]
  MissingStdio,
}

/// Keeps the agent process alive for the duration of a session and kills
/// it on teardown. Launchers that have no real process hand out an empty
/// guard.
pub struct AgentGuard(Option<Child>);

impl AgentGuard {
  pub fn none() -> Self {
    Self(None)
  }

  pub fn child(child: Child) -> Self {
    Self(Some(child))
  }

  /// Best-effort teardown; failures are swallowed.
  pub fn destroy(&mut self) {
    if let Some(child) = self.0.as_mut() {
      let _ = child.start_kill();
    }
    self.0 = None;
  }
}

/// The byte streams of one agent incarnation.
pub struct AgentIo {
  pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
  pub stdout: Box<dyn AsyncRead + Send + Unpin>,
  pub stderr: Box<dyn AsyncRead + Send + Unpin>,
  pub guard: AgentGuard,
}

/// Starts a fresh agent. Each call must produce a new incarnation; the
/// previous one is destroyed before the next start is attempted.
#[async_trait]
pub trait AgentLauncher: Send + Sync + 'static {
  async fn start(&self) -> Result<AgentIo, LaunchError>;
}

/// Spawns the configured agent command with piped stdio.
pub struct CommandLauncher {
  command: String,
  args: Vec<String>,
}

impl CommandLauncher {
  pub fn new(command: String, args: Vec<String>) -> Self {
    Self { command, args }
  }
}

#[async_trait]
impl AgentLauncher for CommandLauncher {
  async fn start(&self) -> Result<AgentIo, LaunchError> {
    let mut child = Command::new(&self.command)
      .args(&self.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|source| LaunchError::Spawn {
        command: self.command.clone(),
        source,
      })?;

    debug!(command = %self.command, pid = ?child.id(), "Spawned agent process");

    let stdin = child.stdin.take().ok_or(LaunchError::MissingStdio)?;
    let stdout = child.stdout.take().ok_or(LaunchError::MissingStdio)?;
    let stderr = child.stderr.take().ok_or(LaunchError::MissingStdio)?;

    Ok(AgentIo {
      stdin: Box::new(stdin),
      stdout: Box::new(stdout),
      stderr: Box::new(stderr),
      guard: AgentGuard::child(child),
    })
  }
}
