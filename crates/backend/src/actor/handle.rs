//! Actor handles.
//!
//! A [`Handle`] is the only way to reach an actor. Sends are fire-and-
//! forget and never block the sender beyond the enqueue, which makes them
//! safe to call from sync contexts (the notify callback, reader tasks).
//! Every enqueue is reported to the scheduler so its counters can detect
//! system quiescence.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::scheduler::Scheduler;

/// Error when sending to an actor.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
  #[error("actor has shut down")]
  ActorGone,
}

/// Cheap-to-clone sender for one actor's mailbox.
pub struct Handle<M> {
  tx: mpsc::UnboundedSender<M>,
  scheduler: Arc<Scheduler>,
}

impl<M> Clone for Handle<M> {
  fn clone(&self) -> Self {
    Self {
      tx: self.tx.clone(),
      scheduler: self.scheduler.clone(),
    }
  }
}

impl<M: Send + 'static> Handle<M> {
  /// Create a mailbox pair. Handles can exist before the actor is
  /// spawned, which is how the mutually-referencing actors are wired.
  pub fn channel(scheduler: &Arc<Scheduler>) -> (Self, mpsc::UnboundedReceiver<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
      Self {
        tx,
        scheduler: scheduler.clone(),
      },
      rx,
    )
  }

  /// Enqueue a message. Never blocks.
  pub fn send(&self, msg: M) -> Result<(), SendError> {
    self.scheduler.note_schedule();
    self.tx.send(msg).map_err(|_| {
      // Balance the counter for a message that will never be handled.
      self.scheduler.note_complete();
      SendError::ActorGone
    })
  }

  pub(crate) fn scheduler(&self) -> &Arc<Scheduler> {
    &self.scheduler
  }
}
