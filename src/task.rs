use std::any::Any;
use std::sync::Arc;

use tracing::error;

/// The error type a submitted closure may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A unit of work on the pool queue: either a submitted closure wrapped with
/// the promise it settles, or a redispatched continuation.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cheaply-cloneable sender into a pool's job queue. Pool-backed promises
/// carry one so that continuations registered before settlement are
/// redispatched to the pool instead of running on the settling thread.
#[derive(Clone)]
pub(crate) struct JobDispatcher {
  pool_name: Arc<String>,
  queue_tx: kanal::Sender<Job>,
}

impl JobDispatcher {
  pub(crate) fn new(pool_name: Arc<String>, queue_tx: kanal::Sender<Job>) -> Self {
    Self { pool_name, queue_tx }
  }

  pub(crate) fn dispatch(&self, job: Job) {
    // The queue only closes once every sender is gone, and this dispatcher
    // holds one, so a send failure is not expected while the pool is alive.
    if let Err(send_error) = self.queue_tx.send(job) {
      error!(
        pool_name = %*self.pool_name,
        "Failed to enqueue job, queue closed ({}). Job dropped.",
        send_error
      );
    }
  }

  pub(crate) fn queue_len(&self) -> usize {
    self.queue_tx.len()
  }
}

/// Best-effort extraction of a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "opaque panic payload".to_string()
  }
}
