//! Deferred sends and quiescence accounting.
//!
//! The scheduler does two jobs for the actor system:
//!
//! 1. **Deferred sends**: [`Scheduler::schedule`] delivers a message to a
//!    handle after a delay. There is no cancellation; stale deliveries are
//!    disambiguated by their payload (the debounce count token, the agent
//!    reconnect state), never by revoking a timer.
//! 2. **Quiescence**: every enqueue (immediate or deferred) bumps a
//!    schedule counter and every handled message bumps a completion
//!    counter. [`Scheduler::quiesce`] waits until the two agree, which is
//!    how tests observe "the system has gone idle" without sleeping for
//!    arbitrary durations.

use std::sync::{
  Arc,
  atomic::{AtomicU64, Ordering},
};

use std::time::Duration;

use super::handle::Handle;

pub struct Scheduler {
  scheduled: AtomicU64,
  completed: AtomicU64,
}

impl Scheduler {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      scheduled: AtomicU64::new(0),
      completed: AtomicU64::new(0),
    })
  }

  pub(crate) fn note_schedule(&self) {
    self.scheduled.fetch_add(1, Ordering::SeqCst);
  }

  pub(crate) fn note_complete(&self) {
    self.completed.fetch_add(1, Ordering::SeqCst);
  }

  /// Deliver `msg` to `handle` after `delay`.
  ///
  /// The pending timer itself counts as scheduled work, so `quiesce`
  /// will not report idle while a delivery is still in flight.
  pub fn schedule<M: Send + 'static>(self: &Arc<Self>, handle: Handle<M>, msg: M, delay: Duration) {
    self.note_schedule();
    let scheduler = self.clone();
    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      let _ = handle.send(msg);
      scheduler.note_complete();
    });
  }

  pub fn scheduled(&self) -> u64 {
    self.scheduled.load(Ordering::SeqCst)
  }

  pub fn completed(&self) -> u64 {
    self.completed.load(Ordering::SeqCst)
  }

  /// Wait until every scheduled message has been handled.
  ///
  /// Requires two consecutive idle readings so a handler that fans out new
  /// messages between the counters' updates is not mistaken for idle.
  pub async fn quiesce(&self) {
    let mut idle_streak = 0;
    loop {
      if self.scheduled() == self.completed() {
        idle_streak += 1;
        if idle_streak >= 2 {
          return;
        }
      } else {
        idle_streak = 0;
      }
      tokio::time::sleep(Duration::from_millis(1)).await;
    }
  }
}
