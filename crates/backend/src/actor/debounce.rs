//! DebounceActor - coalesces bursts of raw filesystem events.
//!
//! Editors and VCS tools produce thousands of events per save. The
//! debouncer accumulates paths until the stream has been quiet for the
//! configured window, then hands the whole batch downstream at once.
//!
//! Timers are never cancelled. Each `Paths` arrival re-arms a delayed
//! `Trigger` carrying the accumulator size at arming time; a trigger whose
//! count disagrees with the current size was superseded by a later arrival
//! and is simply ignored.

use std::{collections::HashSet, ops::ControlFlow, path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{
  Actor, Handle, Scheduler,
  message::{DebounceMsg, SkipMsg},
};

/// VCS lockfile churn that would otherwise wake the pipeline on every
/// `git status`.
const LOCKFILE_NAME: &str = "index.lock";

enum DebounceState {
  Idle,
  Debouncing { accum: HashSet<PathBuf> },
}

pub struct DebounceActor {
  state: DebounceState,
  window: Duration,
  downstream: Handle<SkipMsg>,
  self_handle: Handle<DebounceMsg>,
  scheduler: Arc<Scheduler>,
}

impl DebounceActor {
  pub fn new(window: Duration, downstream: Handle<SkipMsg>, self_handle: Handle<DebounceMsg>) -> Self {
    let scheduler = self_handle.scheduler().clone();
    Self {
      state: DebounceState::Idle,
      window,
      downstream,
      self_handle,
      scheduler,
    }
  }

  fn arm(&self, count: usize) {
    self
      .scheduler
      .schedule(self.self_handle.clone(), DebounceMsg::Trigger(count), self.window);
  }

  fn only_lockfiles(paths: &HashSet<PathBuf>) -> bool {
    paths
      .iter()
      .all(|p| p.file_name().is_some_and(|name| name == std::ffi::OsStr::new(LOCKFILE_NAME)))
  }
}

#[async_trait]
impl Actor for DebounceActor {
  type Msg = DebounceMsg;

  fn name(&self) -> &'static str {
    "debounce"
  }

  async fn handle(&mut self, msg: DebounceMsg) -> ControlFlow<()> {
    self.state = match (std::mem::replace(&mut self.state, DebounceState::Idle), msg) {
      (DebounceState::Idle, DebounceMsg::Paths(paths)) => {
        if Self::only_lockfiles(&paths) {
          trace!(count = paths.len(), "Ignoring lockfile-only event burst");
          DebounceState::Idle
        } else {
          self.arm(paths.len());
          DebounceState::Debouncing { accum: paths }
        }
      }

      (DebounceState::Debouncing { mut accum }, DebounceMsg::Paths(paths)) => {
        accum.extend(paths);
        self.arm(accum.len());
        DebounceState::Debouncing { accum }
      }

      // A trigger in Idle is left over from a batch already flushed.
      (DebounceState::Idle, DebounceMsg::Trigger(_)) => DebounceState::Idle,

      (DebounceState::Debouncing { accum }, DebounceMsg::Trigger(count)) => {
        if count != accum.len() {
          // A newer paths-event superseded this timer.
          trace!(stale = count, current = accum.len(), "Ignoring stale trigger");
          DebounceState::Debouncing { accum }
        } else {
          debug!(count = accum.len(), "Event burst settled");
          let _ = self.downstream.send(SkipMsg::Paths(accum));
          DebounceState::Idle
        }
      }
    };

    ControlFlow::Continue(())
  }
}
