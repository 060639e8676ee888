//! AgentActor - owns the agent process and the resumable RPC session.
//!
//! The actor is the only writer to the agent's stdin. Each remote-bound
//! unit is appended to the replay buffer just before its write and popped
//! on the matching in-order ack, so the buffer always holds exactly the
//! in-flight work. On any transport failure the buffer survives, the
//! agent is relaunched with exponential backoff, and the whole buffer is
//! replayed; the agent applies requests idempotently so a replayed
//! operation is observable at most once.
//!
//! # States
//!
//! - `Active`: agent alive, writer healthy.
//! - `RestartSleeping`: backoff pending; remote units buffer up.
//! - `GivenUp`: five consecutive reconnects failed; only `ForceRestart`
//!   leaves this state.
//! - `Closed`: terminal teardown.
//!
//! # Reader tasks
//!
//! Each successful start spawns one stdout demux task (framed responses,
//! posted back as `Receive`) and one stderr logger task (each line JSON-
//! decoded as a quoted string and forwarded to the log). Readers carry
//! their incarnation's generation; messages from a dead incarnation are
//! dropped, so a stale read-failure can never restart a healthy agent.

use std::{collections::VecDeque, ops::ControlFlow, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, error, info, trace, warn};

use super::{
  Actor, Handle, Scheduler,
  message::{AgentMsg, StatusMsg, SyncMsg, SyncUnit},
};
use crate::{
  fs,
  launch::{AgentGuard, AgentLauncher},
};
use tether_core::{BLOCK_SIZE, remote_path};
use tether_proto::{Response, Rpc, write_frame};

/// Consecutive failed reconnect attempts before giving up.
const MAX_RETRIES: u32 = 5;

const GIVE_UP_TOOLTIP: &str = "Could not reach the agent; restart to try again";

#[derive(Debug, Clone, Copy, PartialEq)]
enum AgentState {
  Active,
  RestartSleeping { retry_count: u32 },
  GivenUp,
  Closed,
}

type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct AgentActor {
  launcher: Arc<dyn AgentLauncher>,
  sync: Handle<SyncMsg>,
  status: Handle<StatusMsg>,
  self_handle: Handle<AgentMsg>,
  scheduler: Arc<Scheduler>,
  state: AgentState,
  /// In-flight remote units, oldest first. The only state that survives
  /// a reconnect.
  buffer: VecDeque<SyncUnit>,
  writer: Option<BoxWriter>,
  guard: AgentGuard,
  /// Bumped on every successful agent start; tags reader tasks.
  generation: u64,
}

impl AgentActor {
  /// The actor starts disconnected; the supervisor queues an immediate
  /// `AttemptReconnect` to bring the first agent up.
  pub fn new(
    launcher: Arc<dyn AgentLauncher>,
    sync: Handle<SyncMsg>,
    status: Handle<StatusMsg>,
    self_handle: Handle<AgentMsg>,
  ) -> Self {
    let scheduler = self_handle.scheduler().clone();
    Self {
      launcher,
      sync,
      status,
      self_handle,
      scheduler,
      state: AgentState::RestartSleeping { retry_count: 0 },
      buffer: VecDeque::new(),
      writer: None,
      guard: AgentGuard::none(),
      generation: 0,
    }
  }

  // ==========================================================================
  // Sending
  // ==========================================================================

  async fn send_active(&mut self, unit: SyncUnit) {
    match &unit {
      SyncUnit::StartFile(path) => {
        info!(file = %path.display(), "Sending file");
        let _ = self.status.send(StatusMsg::Syncing);
        return;
      }
      SyncUnit::FileTotals { total, example } => {
        let _ = self.status.send(StatusMsg::FileTotals {
          total: *total,
          example: example.clone(),
        });
        return;
      }
      _ => {}
    }

    let rpc = match resolve(&unit) {
      Ok(Some(rpc)) => rpc,
      // The source file vanished between stat and read; the next event
      // cycle observes the deletion authoritatively.
      Ok(None) => return,
      Err(e) => {
        error!(error = %e, "Failed to resolve outbound unit; dropping it");
        return;
      }
    };

    let bytes = chunk_len(&rpc);
    self.buffer.push_back(unit);
    match self.write(&rpc).await {
      Ok(()) => {
        if bytes > 0 {
          let _ = self.status.send(StatusMsg::FilesAndBytes { files: 0, bytes });
        }
      }
      Err(e) => {
        warn!(error = %e, "Write to agent failed");
        self.restart(0);
      }
    }
  }

  async fn write(&mut self, rpc: &Rpc) -> Result<(), tether_proto::ProtoError> {
    match self.writer.as_mut() {
      Some(writer) => write_frame(writer, rpc).await,
      None => Err(tether_proto::ProtoError::Io(std::io::Error::other(
        "agent stdin is not open",
      ))),
    }
  }

  // ==========================================================================
  // Receiving
  // ==========================================================================

  fn on_response(&mut self, response: Response) {
    match response {
      Response::Ack => match self.buffer.pop_front() {
        Some(SyncUnit::Complete) if self.buffer.is_empty() => {
          debug!("Session drained");
          let _ = self.status.send(StatusMsg::Done);
        }
        Some(SyncUnit::Complete) => {
          debug!(queued = self.buffer.len(), "Barrier acked with work still queued");
        }
        Some(SyncUnit::RemoteScan(_)) => {
          debug!("Remote scan acked");
          let _ = self.sync.send(SyncMsg::RemoteScanComplete);
        }
        Some(unit) => trace!(unit = ?unit, "Acked"),
        None => warn!("Ack received with an empty buffer"),
      },
      Response::Scanned { base, sub, sig, index } => {
        if index % 5000 == 0 {
          debug!(base = %base, scanned = index, "Remote scan progress");
        }
        let _ = self.sync.send(SyncMsg::RemoteScanned {
          base,
          sub: sub.into(),
          sig,
        });
      }
    }
  }

  // ==========================================================================
  // Restart and reconnect
  // ==========================================================================

  /// Tear down the agent and either schedule a reconnect attempt after
  /// `2^retry_count` seconds or give up after [`MAX_RETRIES`] failures.
  fn restart(&mut self, retry_count: u32) {
    self.destroy();

    if retry_count < MAX_RETRIES {
      let delay = Duration::from_secs(1 << retry_count);
      info!(attempt = retry_count + 1, delay_secs = delay.as_secs(), "Agent restart scheduled");
      let _ = self.status.send(StatusMsg::Error {
        tooltip: format!("Agent connection lost; reconnecting (attempt {})", retry_count + 1),
      });
      self
        .scheduler
        .schedule(self.self_handle.clone(), AgentMsg::AttemptReconnect, delay);
      self.state = AgentState::RestartSleeping {
        retry_count: retry_count + 1,
      };
    } else {
      error!("Giving up on the agent after {MAX_RETRIES} failed restarts");
      let _ = self.status.send(StatusMsg::Greyed {
        tooltip: GIVE_UP_TOOLTIP.to_string(),
      });
      self.state = AgentState::GivenUp;
    }
  }

  async fn attempt_reconnect(&mut self, retry_count: u32) {
    let io = match self.launcher.start().await {
      Ok(io) => io,
      Err(e) => {
        warn!(error = %e, "Agent launch failed");
        self.restart(retry_count);
        return;
      }
    };

    self.generation += 1;
    self.writer = Some(io.stdin);
    self.guard = io.guard;
    spawn_readers(io.stdout, io.stderr, self.self_handle.clone(), self.generation);
    info!(generation = self.generation, "Agent started");

    // An empty buffer still needs a barrier so the reconnect is
    // observable end-to-end.
    if self.buffer.is_empty() {
      self.buffer.push_back(SyncUnit::Complete);
    }

    // Replay the whole buffer in order. Chunks are re-read from disk;
    // a source that vanished since the original send is dropped from
    // the buffer (its ack will never come).
    let pending = std::mem::take(&mut self.buffer);
    let mut write_failed = false;
    for unit in pending {
      if write_failed {
        self.buffer.push_back(unit);
        continue;
      }
      let rpc = match resolve(&unit) {
        Ok(Some(rpc)) => rpc,
        Ok(None) => continue,
        Err(e) => {
          error!(error = %e, "Failed to resolve buffered unit during replay; dropping it");
          continue;
        }
      };
      self.buffer.push_back(unit);
      if let Err(e) = self.write(&rpc).await {
        warn!(error = %e, "Write failed during replay");
        write_failed = true;
      }
    }

    if write_failed {
      self.restart(retry_count);
    } else {
      debug!(replayed = self.buffer.len(), "Replay complete");
      self.state = AgentState::Active;
      if self.buffer.len() > 1 {
        let _ = self.status.send(StatusMsg::Syncing);
      }
    }
  }

  fn destroy(&mut self) {
    self.writer = None;
    self.guard.destroy();
  }
}

#[async_trait]
impl Actor for AgentActor {
  type Msg = AgentMsg;

  fn name(&self) -> &'static str {
    "agent"
  }

  async fn handle(&mut self, msg: AgentMsg) -> ControlFlow<()> {
    match (self.state, msg) {
      (_, AgentMsg::Close) => {
        info!("Closing agent session");
        self.destroy();
        self.state = AgentState::Closed;
        return ControlFlow::Break(());
      }
      (AgentState::Closed, _) => {}

      (AgentState::Active, AgentMsg::Send(unit)) => self.send_active(unit).await,
      (AgentState::Active, AgentMsg::Receive { generation, response }) => {
        if generation == self.generation {
          self.on_response(response);
        } else {
          trace!(generation, "Dropping response from a dead agent incarnation");
        }
      }
      (AgentState::Active, AgentMsg::ReadFailed { generation }) => {
        if generation == self.generation {
          warn!("Agent read failed");
          self.restart(0);
        }
      }
      (AgentState::Active, AgentMsg::ForceRestart) => self.restart(0),
      // A reconnect timer that fired after the session already recovered.
      (AgentState::Active, AgentMsg::AttemptReconnect) => {}

      (AgentState::RestartSleeping { .. }, AgentMsg::Send(unit)) => {
        if unit.is_remote() {
          self.buffer.push_back(unit);
        }
      }
      (AgentState::RestartSleeping { retry_count }, AgentMsg::AttemptReconnect) => {
        self.attempt_reconnect(retry_count).await;
      }
      (AgentState::RestartSleeping { .. }, AgentMsg::ForceRestart) => self.restart(0),
      (AgentState::RestartSleeping { .. }, AgentMsg::Receive { .. })
      | (AgentState::RestartSleeping { .. }, AgentMsg::ReadFailed { .. }) => {}

      (AgentState::GivenUp, AgentMsg::Send(unit)) => {
        let _ = self.status.send(StatusMsg::Greyed {
          tooltip: GIVE_UP_TOOLTIP.to_string(),
        });
        if unit.is_remote() {
          self.buffer.push_back(unit);
        }
      }
      (AgentState::GivenUp, AgentMsg::ForceRestart) => self.restart(0),
      (AgentState::GivenUp, _) => {}
    }

    ControlFlow::Continue(())
  }
}

// ============================================================================
// Unit resolution
// ============================================================================

/// Resolve a remote-bound unit to its concrete RPC. Chunk units re-read
/// the file at resolution time; `Ok(None)` means the source vanished.
fn resolve(unit: &SyncUnit) -> std::io::Result<Option<Rpc>> {
  match unit {
    SyncUnit::Complete => Ok(Some(Rpc::Complete)),
    SyncUnit::RemoteScan(paths) => Ok(Some(Rpc::FullScan { paths: paths.clone() })),
    SyncUnit::Rpc(rpc) => Ok(Some(rpc.clone())),
    SyncUnit::SendChunk {
      local_src,
      remote_dest,
      sub_path,
      index,
      count,
    } => {
      let path = local_src.join(sub_path);
      match fs::read_block(&path, *index) {
        Ok(data) => {
          trace!(
            file = %path.display(),
            block = index,
            of = count,
            bytes = data.len(),
            "Resolved chunk"
          );
          Ok(Some(Rpc::WriteChunk {
            dest: remote_dest.clone(),
            sub_path: remote_path("", sub_path),
            offset: index * BLOCK_SIZE as u64,
            data,
          }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
          debug!(file = %path.display(), "Chunk source vanished; dropping");
          Ok(None)
        }
        Err(e) => Err(e),
      }
    }
    SyncUnit::StartFile(_) | SyncUnit::FileTotals { .. } => Ok(None),
  }
}

fn chunk_len(rpc: &Rpc) -> u64 {
  match rpc {
    Rpc::WriteChunk { data, .. } => data.len() as u64,
    _ => 0,
  }
}

// ============================================================================
// Reader tasks
// ============================================================================

/// Spawn the stdout demux and stderr logger for one agent incarnation.
///
/// Both tasks only ever talk to the actor through its handle; neither
/// touches actor state directly, and each exits permanently on its first
/// error.
fn spawn_readers(
  stdout: impl AsyncRead + Send + Unpin + 'static,
  stderr: impl AsyncRead + Send + Unpin + 'static,
  handle: Handle<AgentMsg>,
  generation: u64,
) {
  let demux_handle = handle.clone();
  tokio::spawn(async move {
    let mut reader = BufReader::new(stdout);
    loop {
      match tether_proto::read_frame::<_, Response>(&mut reader).await {
        Ok(Some(response)) => {
          if demux_handle.send(AgentMsg::Receive { generation, response }).is_err() {
            break;
          }
        }
        Ok(None) => {
          debug!(generation, "Agent stdout closed");
          let _ = demux_handle.send(AgentMsg::ReadFailed { generation });
          break;
        }
        Err(e) => {
          warn!(generation, error = %e, "Agent stdout read failed");
          let _ = demux_handle.send(AgentMsg::ReadFailed { generation });
          break;
        }
      }
    }
  });

  tokio::spawn(async move {
    let mut lines = BufReader::new(stderr).lines();
    loop {
      match lines.next_line().await {
        // The agent writes each log line as a JSON-quoted string.
        Ok(Some(line)) => match serde_json::from_str::<String>(&line) {
          Ok(text) => info!(target: "tether::agent", "{text}"),
          Err(_) => {
            warn!(generation, raw = %line, "Malformed agent stderr line; stopping stderr logger");
            break;
          }
        },
        Ok(None) => break,
        Err(e) => {
          debug!(generation, error = %e, "Agent stderr read failed");
          break;
        }
      }
    }
  });
}
