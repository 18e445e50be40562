use crate::task::BoxError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by promises created through the `promise_pool` crate.
///
/// Cloneable so one failure can propagate through any number of downstream
/// combinators and be observed by any number of joiners.
#[derive(Error, Debug, Clone)]
pub enum PoolError {
  /// A submitted closure returned an error. The original cause is preserved
  /// and shared.
  #[error("task failed: {0}")]
  TaskFailed(Arc<dyn std::error::Error + Send + Sync + 'static>),

  /// A submitted closure or a combinator function panicked during execution.
  #[error("task panicked: {0}")]
  TaskPanicked(String),

  /// Returned by `Promise::join_timeout` when the deadline elapses before the
  /// promise settles. Never stored as a promise outcome; the underlying work
  /// keeps running and a later join can still observe it.
  #[error("join timed out after {0:?}")]
  JoinTimeout(Duration),
}

impl PoolError {
  /// Wraps an arbitrary error as a task failure.
  pub fn failed(cause: impl Into<BoxError>) -> Self {
    PoolError::TaskFailed(Arc::from(cause.into()))
  }
}
