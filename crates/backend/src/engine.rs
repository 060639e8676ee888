//! Engine - wires the actor ensemble and owns its lifecycle.
//!
//! ```text
//! Engine (supervisor)
//!   ├── notify watcher per local root  → DebounceActor
//!   ├── DebounceActor → SkipActor → SyncActor → AgentActor ⇄ agent
//!   └── StatusActor (fed by SyncActor and AgentActor)
//! ```
//!
//! The `SyncActor`/`AgentActor` cycle is resolved by creating every
//! mailbox pair up front and handing each actor its peers' handles at
//! construction; nothing holds a reference into another actor's state.

use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tether_core::{Config, Mapping, MappingError};

use crate::{
  actor::{
    self, AgentActor, DebounceActor, Handle, Scheduler, SkipActor, StatusActor, StatusSink, SyncActor,
    message::{AgentMsg, DebounceMsg, SkipMsg, StatusMsg, SyncMsg, SyncUnit},
  },
  launch::AgentLauncher,
};

#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Mapping(#[from] MappingError),
  #[error("failed to compile ignore rules: {0}")]
  Skip(#[from] ignore::Error),
  #[error("failed to watch {root}: {source}")]
  Watch {
    root: std::path::PathBuf,
    #[source]
    source: notify::Error,
  },
}

/// The running sync system. Dropping the engine does not stop it; call
/// [`Engine::shutdown`].
pub struct Engine {
  scheduler: Arc<Scheduler>,
  cancel: CancellationToken,
  tasks: Vec<JoinHandle<()>>,
  // Held so the OS watches stay registered.
  _watchers: Vec<RecommendedWatcher>,
  debounce: Handle<DebounceMsg>,
  skip: Handle<SkipMsg>,
  sync: Handle<SyncMsg>,
  agent: Handle<AgentMsg>,
  status: Handle<StatusMsg>,
}

impl Engine {
  /// Wire and start everything: actors, filesystem watchers, the first
  /// agent launch, and the bootstrap scans.
  pub fn start(
    config: &Config,
    launcher: Arc<dyn AgentLauncher>,
    sink: Arc<dyn StatusSink>,
  ) -> Result<Self, EngineError> {
    let mapping = Arc::new(config.mapping()?);
    let scheduler = Scheduler::new();
    let cancel = CancellationToken::new();

    let (status_h, status_rx) = Handle::channel(&scheduler);
    let (agent_h, agent_rx) = Handle::channel(&scheduler);
    let (sync_h, sync_rx) = Handle::channel(&scheduler);
    let (skip_h, skip_rx) = Handle::channel(&scheduler);
    let (debounce_h, debounce_rx) = Handle::channel(&scheduler);

    let status = StatusActor::new(
      sink,
      std::time::Duration::from_millis(config.sync.status_debounce_ms),
      status_h.clone(),
    );
    let agent = AgentActor::new(launcher, sync_h.clone(), status_h.clone(), agent_h.clone());
    let sync = SyncActor::new(mapping.clone(), agent_h.clone(), status_h.clone(), sync_h.clone());
    let skip = SkipActor::new(&mapping, &config.sync.skip, sync_h.clone())?;
    let debounce = DebounceActor::new(
      std::time::Duration::from_millis(config.sync.debounce_ms),
      skip_h.clone(),
      debounce_h.clone(),
    );

    let tasks = vec![
      actor::spawn(status, status_rx, scheduler.clone(), cancel.child_token()),
      actor::spawn(agent, agent_rx, scheduler.clone(), cancel.child_token()),
      actor::spawn(sync, sync_rx, scheduler.clone(), cancel.child_token()),
      actor::spawn(skip, skip_rx, scheduler.clone(), cancel.child_token()),
      actor::spawn(debounce, debounce_rx, scheduler.clone(), cancel.child_token()),
    ];

    let watchers = start_watchers(&mapping, &debounce_h)?;

    // Bootstrap: bring the agent up, then run both scans in parallel.
    let _ = agent_h.send(AgentMsg::AttemptReconnect);
    let _ = agent_h.send(AgentMsg::Send(SyncUnit::RemoteScan(mapping.remote_roots())));
    let _ = skip_h.send(SkipMsg::Scan);

    info!(roots = mapping.len(), "Sync engine started");

    Ok(Self {
      scheduler,
      cancel,
      tasks,
      _watchers: watchers,
      debounce: debounce_h,
      skip: skip_h,
      sync: sync_h,
      agent: agent_h,
      status: status_h,
    })
  }

  /// Counters for quiescence detection.
  pub fn scheduler(&self) -> &Arc<Scheduler> {
    &self.scheduler
  }

  pub fn debounce_handle(&self) -> &Handle<DebounceMsg> {
    &self.debounce
  }

  pub fn skip_handle(&self) -> &Handle<SkipMsg> {
    &self.skip
  }

  pub fn sync_handle(&self) -> &Handle<SyncMsg> {
    &self.sync
  }

  pub fn agent_handle(&self) -> &Handle<AgentMsg> {
    &self.agent
  }

  pub fn status_handle(&self) -> &Handle<StatusMsg> {
    &self.status
  }

  /// Ask the session to restart the agent now, resetting the backoff.
  pub fn force_restart(&self) {
    let _ = self.agent.send(AgentMsg::ForceRestart);
  }

  /// Tear down the agent and stop every actor.
  ///
  /// A pending reconnect backoff can hold the counters open for up to the
  /// full backoff delay, so the drain is bounded before cancellation.
  pub async fn shutdown(self) {
    info!("Sync engine shutting down");
    let _ = self.agent.send(AgentMsg::Close);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), self.scheduler.quiesce()).await;
    self.cancel.cancel();
    for task in self.tasks {
      let _ = task.await;
    }
  }
}

fn start_watchers(
  mapping: &Mapping,
  debounce: &Handle<DebounceMsg>,
) -> Result<Vec<RecommendedWatcher>, EngineError> {
  let mut watchers = Vec::with_capacity(mapping.len());

  for entry in mapping.entries() {
    let handle = debounce.clone();
    let root = entry.local_root.clone();
    let mut watcher = RecommendedWatcher::new(
      move |result: Result<notify::Event, notify::Error>| match result {
        // Runs on notify's thread; handle sends never block.
        Ok(event) => {
          use notify::EventKind;
          match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
              let _ = handle.send(DebounceMsg::Paths(event.paths.into_iter().collect()));
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
          }
        }
        Err(e) => warn!(error = %e, "Filesystem watcher error"),
      },
      notify::Config::default(),
    )
    .map_err(|source| EngineError::Watch {
      root: entry.local_root.clone(),
      source,
    })?;

    watcher
      .watch(&entry.local_root, RecursiveMode::Recursive)
      .map_err(|source| EngineError::Watch {
        root: entry.local_root.clone(),
        source,
      })?;

    info!(root = %entry.local_root.display(), "Watching local root");
    watchers.push(watcher);
  }

  Ok(watchers)
}
