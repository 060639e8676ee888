//! Test helpers for actor integration tests.
//!
//! Provides a scripted in-process agent speaking the wire protocol over
//! duplex pipes, a probe status sink, a message collector, and `TestRig`
//! which wires the full actor ensemble the way the engine does - minus
//! the OS filesystem watchers, so tests inject events directly.

use std::{
  collections::VecDeque,
  fmt::Debug,
  ops::ControlFlow,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
use tokio_util::sync::CancellationToken;

use tether_core::{Mapping, Signature};
use tether_proto::{Response, Rpc, read_frame, write_frame};

use crate::{
  actor::{
    Actor, AgentActor, DebounceActor, Handle, Icon, Scheduler, SkipActor, StatusActor, StatusSink, SyncActor,
    message::{AgentMsg, DebounceMsg, SkipMsg, StatusMsg, SyncMsg, SyncUnit},
    spawn,
  },
  launch::{AgentGuard, AgentIo, AgentLauncher, LaunchError},
};

// ============================================================================
// Waiting
// ============================================================================

/// Poll `check` until it holds or `timeout` elapses. Under a paused
/// runtime the sleeps auto-advance virtual time, so this is deterministic.
pub async fn wait_for<F: FnMut() -> bool>(timeout: Duration, mut check: F) -> bool {
  let start = tokio::time::Instant::now();
  while start.elapsed() < timeout {
    if check() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(25)).await;
  }
  false
}

// ============================================================================
// Message collector
// ============================================================================

struct Collector<M> {
  store: Arc<Mutex<Vec<M>>>,
}

#[async_trait]
impl<M: Send + Debug + 'static> Actor for Collector<M> {
  type Msg = M;

  fn name(&self) -> &'static str {
    "collector"
  }

  async fn handle(&mut self, msg: M) -> ControlFlow<()> {
    self.store.lock().unwrap().push(msg);
    ControlFlow::Continue(())
  }
}

/// Spawn an actor that records every message it receives.
pub fn spawn_collector<M: Send + Debug + 'static>(
  scheduler: &Arc<Scheduler>,
  cancel: CancellationToken,
) -> (Handle<M>, Arc<Mutex<Vec<M>>>) {
  let store = Arc::new(Mutex::new(Vec::new()));
  let (handle, rx) = Handle::channel(scheduler);
  spawn(Collector { store: store.clone() }, rx, scheduler.clone(), cancel);
  (handle, store)
}

// ============================================================================
// Probe status sink
// ============================================================================

#[derive(Default)]
pub struct ProbeSink {
  icons: Mutex<Vec<Icon>>,
  tooltips: Mutex<Vec<String>>,
}

impl ProbeSink {
  pub fn icons(&self) -> Vec<Icon> {
    self.icons.lock().unwrap().clone()
  }

  pub fn tooltips(&self) -> Vec<String> {
    self.tooltips.lock().unwrap().clone()
  }
}

impl StatusSink for ProbeSink {
  fn set_image(&self, icon: Icon) {
    self.icons.lock().unwrap().push(icon);
  }

  fn set_tooltip(&self, text: &str) {
    self.tooltips.lock().unwrap().push(text.to_string());
  }
}

// ============================================================================
// Scripted agent
// ============================================================================

/// Behavior of one scripted agent incarnation.
#[derive(Clone)]
pub struct AgentBehavior {
  /// `(base, sub, sig)` entries reported when a matching root is scanned.
  pub scan_entries: Vec<(String, String, Signature)>,
  /// Die (close both pipes without acking) once this many requests have
  /// been acked. `None` runs forever.
  pub die_after_acks: Option<usize>,
  /// Every request received, in order.
  pub received: Arc<Mutex<Vec<Rpc>>>,
}

impl AgentBehavior {
  pub fn new() -> Self {
    Self {
      scan_entries: Vec::new(),
      die_after_acks: None,
      received: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn with_scan(mut self, entries: Vec<(String, String, Signature)>) -> Self {
    self.scan_entries = entries;
    self
  }

  pub fn die_after_acks(mut self, acks: usize) -> Self {
    self.die_after_acks = Some(acks);
    self
  }

  pub fn received(&self) -> Vec<Rpc> {
    self.received.lock().unwrap().clone()
  }
}

/// One planned `start()` outcome.
pub enum StartPlan {
  /// The launch itself fails.
  Fail,
  /// The launch succeeds and this behavior runs the agent side.
  Agent(AgentBehavior),
}

/// Launcher whose start attempts consume a fixed plan list; once the list
/// is exhausted every further attempt fails.
pub struct ScriptedLauncher {
  plans: Mutex<VecDeque<StartPlan>>,
  attempts: AtomicUsize,
}

impl ScriptedLauncher {
  pub fn new(plans: Vec<StartPlan>) -> Arc<Self> {
    Arc::new(Self {
      plans: Mutex::new(plans.into()),
      attempts: AtomicUsize::new(0),
    })
  }

  pub fn attempts(&self) -> usize {
    self.attempts.load(Ordering::SeqCst)
  }

  pub fn remaining_plans(&self) -> usize {
    self.plans.lock().unwrap().len()
  }
}

#[async_trait]
impl AgentLauncher for ScriptedLauncher {
  async fn start(&self) -> Result<AgentIo, LaunchError> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    let plan = self.plans.lock().unwrap().pop_front();
    match plan {
      None | Some(StartPlan::Fail) => Err(LaunchError::Spawn {
        command: "scripted-agent".into(),
        source: std::io::Error::other("scripted launch failure"),
      }),
      Some(StartPlan::Agent(behavior)) => {
        let (stdin_local, stdin_remote) = tokio::io::duplex(1 << 20);
        let (stdout_remote, stdout_local) = tokio::io::duplex(1 << 20);
        let (stderr_remote, stderr_local) = tokio::io::duplex(1 << 12);

        tokio::spawn(run_agent(stdin_remote, stdout_remote, stderr_remote, behavior));

        Ok(AgentIo {
          stdin: Box::new(stdin_local),
          stdout: Box::new(stdout_local),
          stderr: Box::new(stderr_local),
          guard: AgentGuard::none(),
        })
      }
    }
  }
}

/// The agent side: read requests, stream scan results, ack in order.
async fn run_agent(reader: DuplexStream, mut writer: DuplexStream, mut stderr: DuplexStream, behavior: AgentBehavior) {
  let _ = stderr.write_all(b"\"agent ready\"\n").await;
  drop(stderr);

  let mut reader = BufReader::new(reader);
  let mut acked = 0usize;

  loop {
    let rpc: Rpc = match read_frame(&mut reader).await {
      Ok(Some(rpc)) => rpc,
      _ => break,
    };
    behavior.received.lock().unwrap().push(rpc.clone());

    if behavior.die_after_acks.is_some_and(|limit| acked >= limit) {
      // Drop the pipes without acking; the engine sees a read failure.
      break;
    }

    if let Rpc::FullScan { paths } = &rpc {
      let mut index = 0u64;
      for (base, sub, sig) in &behavior.scan_entries {
        if paths.iter().any(|p| p == base) {
          let scanned = Response::Scanned {
            base: base.clone(),
            sub: sub.clone(),
            sig: sig.clone(),
            index,
          };
          if write_frame(&mut writer, &scanned).await.is_err() {
            return;
          }
          index += 1;
        }
      }
    }

    if write_frame(&mut writer, &Response::Ack).await.is_err() {
      break;
    }
    acked += 1;
  }
}

// ============================================================================
// Full-ensemble rig
// ============================================================================

/// The full actor ensemble wired the way the engine wires it, with the OS
/// watchers replaced by direct sends to the debounce handle.
#[allow(dead_code)] // Not every test exercises every handle.
pub struct TestRig {
  pub scheduler: Arc<Scheduler>,
  pub cancel: CancellationToken,
  pub sink: Arc<ProbeSink>,
  pub debounce: Handle<DebounceMsg>,
  pub skip: Handle<SkipMsg>,
  pub sync: Handle<SyncMsg>,
  pub agent: Handle<AgentMsg>,
  pub status: Handle<StatusMsg>,
}

pub const RIG_DEBOUNCE: Duration = Duration::from_millis(50);
pub const RIG_STATUS_WINDOW: Duration = Duration::from_millis(100);

impl TestRig {
  /// Wire, spawn, and bootstrap the ensemble.
  pub fn start(mapping: Mapping, strategy: &str, launcher: Arc<ScriptedLauncher>) -> Self {
    let mapping = Arc::new(mapping);
    let scheduler = Scheduler::new();
    let cancel = CancellationToken::new();
    let sink = Arc::new(ProbeSink::default());

    let (status_h, status_rx) = Handle::channel(&scheduler);
    let (agent_h, agent_rx) = Handle::channel(&scheduler);
    let (sync_h, sync_rx) = Handle::channel(&scheduler);
    let (skip_h, skip_rx) = Handle::channel(&scheduler);
    let (debounce_h, debounce_rx) = Handle::channel(&scheduler);

    let status = StatusActor::new(sink.clone(), RIG_STATUS_WINDOW, status_h.clone());
    let agent = AgentActor::new(launcher, sync_h.clone(), status_h.clone(), agent_h.clone());
    let sync = SyncActor::new(mapping.clone(), agent_h.clone(), status_h.clone(), sync_h.clone());
    let skip = SkipActor::new(&mapping, strategy, sync_h.clone()).expect("compile skipper");
    let debounce = DebounceActor::new(RIG_DEBOUNCE, skip_h.clone(), debounce_h.clone());

    spawn(status, status_rx, scheduler.clone(), cancel.child_token());
    spawn(agent, agent_rx, scheduler.clone(), cancel.child_token());
    spawn(sync, sync_rx, scheduler.clone(), cancel.child_token());
    spawn(skip, skip_rx, scheduler.clone(), cancel.child_token());
    spawn(debounce, debounce_rx, scheduler.clone(), cancel.child_token());

    agent_h.send(AgentMsg::AttemptReconnect).unwrap();
    agent_h
      .send(AgentMsg::Send(SyncUnit::RemoteScan(mapping.remote_roots())))
      .unwrap();
    skip_h.send(SkipMsg::Scan).unwrap();

    Self {
      scheduler,
      cancel,
      sink,
      debounce: debounce_h,
      skip: skip_h,
      sync: sync_h,
      agent: agent_h,
      status: status_h,
    }
  }
}
