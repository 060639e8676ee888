//! StatusActor - aggregates progress into a debounced icon/tooltip pair.
//!
//! State changes arrive much faster than a human can read, so the actor
//! suppresses flicker: a proposal is applied immediately when no window is
//! open, and iff that actually changed the icon a 100 ms window opens
//! during which later proposals only overwrite the pending next view.

use std::{ops::ControlFlow, path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::info;

use super::{Actor, Handle, Scheduler, message::StatusMsg};

/// Symbolic icon tokens; the sink maps them to real images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
  /// Starting up.
  BlueTick,
  /// Work is flowing.
  BlueSync,
  /// Everything applied.
  GreenTick,
  /// Transport trouble, recovering.
  RedCross,
  /// Gave up; needs user action.
  GreyDash,
}

impl Icon {
  pub fn token(&self) -> &'static str {
    match self {
      Icon::BlueTick => "blue-tick",
      Icon::BlueSync => "blue-sync",
      Icon::GreenTick => "green-tick",
      Icon::RedCross => "red-cross",
      Icon::GreyDash => "grey-dash",
    }
  }
}

/// Where the `(icon, tooltip)` view lands: a tray UI, a test probe.
pub trait StatusSink: Send + Sync {
  fn set_image(&self, icon: Icon);
  fn set_tooltip(&self, text: &str);
}

/// Logs view changes; the default sink for headless runs.
#[derive(Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
  fn set_image(&self, icon: Icon) {
    info!(target: "tether::status", icon = icon.token(), "Status icon");
  }

  fn set_tooltip(&self, text: &str) {
    info!(target: "tether::status", tooltip = %text, "Status tooltip");
  }
}

#[derive(Debug, Clone, PartialEq)]
struct IconState {
  icon: Icon,
  tooltip: String,
}

pub struct StatusActor {
  sink: Arc<dyn StatusSink>,
  self_handle: Handle<StatusMsg>,
  scheduler: Arc<Scheduler>,
  window: Duration,
  current: IconState,
  /// Set while a flicker window is open.
  debounce_pending: bool,
  /// The latest proposal made while the window was open.
  debounced_next: Option<IconState>,
  files: u64,
  bytes: u64,
  total_files: u64,
  example: Option<PathBuf>,
}

impl StatusActor {
  pub fn new(sink: Arc<dyn StatusSink>, window: Duration, self_handle: Handle<StatusMsg>) -> Self {
    let scheduler = self_handle.scheduler().clone();
    let current = IconState {
      icon: Icon::BlueTick,
      tooltip: "tether starting".to_string(),
    };
    sink.set_image(current.icon);
    sink.set_tooltip(&current.tooltip);
    Self {
      sink,
      self_handle,
      scheduler,
      window,
      current,
      debounce_pending: false,
      debounced_next: None,
      files: 0,
      bytes: 0,
      total_files: 0,
      example: None,
    }
  }

  fn syncing_tooltip(&self) -> String {
    match &self.example {
      Some(example) if self.total_files > 0 => {
        format!("Syncing {} files e.g. {}", self.total_files, example.display())
      }
      _ => "Syncing...".to_string(),
    }
  }

  fn propose(&mut self, icon: Icon, tooltip: String) {
    let next = IconState { icon, tooltip };
    if self.debounce_pending {
      self.debounced_next = Some(next);
    } else {
      self.apply(next);
    }
  }

  fn apply(&mut self, next: IconState) {
    let changed = next.icon != self.current.icon;
    self.sink.set_image(next.icon);
    self.sink.set_tooltip(&next.tooltip);
    self.current = next;
    if changed {
      self.debounce_pending = true;
      self
        .scheduler
        .schedule(self.self_handle.clone(), StatusMsg::Debounce, self.window);
    }
  }
}

#[async_trait]
impl Actor for StatusActor {
  type Msg = StatusMsg;

  fn name(&self) -> &'static str {
    "status"
  }

  async fn handle(&mut self, msg: StatusMsg) -> ControlFlow<()> {
    match msg {
      StatusMsg::Syncing => {
        let tooltip = self.syncing_tooltip();
        self.propose(Icon::BlueSync, tooltip);
      }
      StatusMsg::Done => {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let tooltip = format!(
          "Syncing Complete\n{} files {} bytes\n{}",
          self.files, self.bytes, timestamp
        );
        self.files = 0;
        self.bytes = 0;
        self.total_files = 0;
        self.example = None;
        self.propose(Icon::GreenTick, tooltip);
      }
      StatusMsg::Error { tooltip } => self.propose(Icon::RedCross, tooltip),
      StatusMsg::Greyed { tooltip } => self.propose(Icon::GreyDash, tooltip),
      StatusMsg::FilesAndBytes { files, bytes } => {
        self.files += files;
        self.bytes += bytes;
      }
      StatusMsg::FileTotals { total, example } => {
        self.total_files += total;
        self.example = Some(example);
        self.files += total;
      }
      StatusMsg::Debounce => {
        self.debounce_pending = false;
        if let Some(next) = self.debounced_next.take() {
          self.apply(next);
        }
      }
    }
    ControlFlow::Continue(())
  }
}
