//! Actor-based sync engine.
//!
//! Every long-lived component is an actor: it owns its state, drains a
//! private mailbox strictly sequentially, and talks to the rest of the
//! system only by sending messages through [`Handle`]s. There is no shared
//! mutable state between actors.
//!
//! # Architecture
//!
//! ```text
//! fs watcher → DebounceActor → SkipActor → SyncActor → AgentActor ⇄ agent
//!                                             │            │
//!                                             └──────┬─────┘
//!                                                StatusActor
//! ```
//!
//! - [`DebounceActor`]: coalesces bursts of raw filesystem events
//! - [`SkipActor`]: routes paths to their root and applies ignore rules
//! - [`SyncActor`]: diffs the local tree against the remote mirror
//! - [`AgentActor`]: owns the agent process and the resumable RPC session
//! - [`StatusActor`]: aggregates progress into a debounced icon/tooltip
//!
//! Message handlers run to completion; anything slow enough to matter
//! (block hashing, chunk reads) is bounded work, and the agent pipe is the
//! only place the engine ever waits on a peer.

pub mod handle;
pub mod message;
pub mod scheduler;

mod agent;
mod debounce;
mod skip;
mod status;
mod sync;

#[cfg(test)]
mod __tests__;

use std::{ops::ControlFlow, sync::Arc};

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use agent::AgentActor;
pub use debounce::DebounceActor;
pub use handle::{Handle, SendError};
pub use scheduler::Scheduler;
pub use skip::SkipActor;
pub use status::{Icon, StatusActor, StatusSink, TracingStatusSink};
pub use sync::SyncActor;

/// One message-driven state machine.
///
/// `handle` is invoked for each mailbox message in arrival order;
/// returning `ControlFlow::Break` stops the actor.
#[async_trait]
pub trait Actor: Send + 'static {
  type Msg: Send + 'static;

  fn name(&self) -> &'static str;

  async fn handle(&mut self, msg: Self::Msg) -> ControlFlow<()>;
}

/// Run an actor over its mailbox until it stops, the token is cancelled,
/// or every handle is dropped. Completion of each handled message is
/// reported to the scheduler so tests can wait for quiescence.
pub fn spawn<A: Actor>(
  mut actor: A,
  mut rx: mpsc::UnboundedReceiver<A::Msg>,
  scheduler: Arc<Scheduler>,
  cancel: CancellationToken,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    debug!(actor = actor.name(), "Actor started");
    loop {
      tokio::select! {
        biased;

        _ = cancel.cancelled() => {
          debug!(actor = actor.name(), "Actor shutting down (cancelled)");
          break;
        }

        msg = rx.recv() => {
          match msg {
            Some(msg) => {
              let flow = actor.handle(msg).await;
              scheduler.note_complete();
              if flow.is_break() {
                debug!(actor = actor.name(), "Actor shutting down (requested)");
                break;
              }
            }
            None => {
              debug!(actor = actor.name(), "Actor shutting down (mailbox closed)");
              break;
            }
          }
        }
      }
    }
    debug!(actor = actor.name(), "Actor stopped");
  })
}
