use crate::error::PoolError;
use crate::promise::Promise;
use crate::task::{panic_message, BoxError, Job, JobDispatcher};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, trace};

/// A fixed set of worker threads consuming a shared job queue.
///
/// `submit` enqueues a closure and immediately returns a pending
/// [`Promise`]; a worker later executes the closure and settles the promise
/// with its result. The queue is an unbounded MPMC channel: any thread may
/// enqueue (including combinator glue redispatching continuations) and every
/// worker dequeues, with each job taken by exactly one worker. Pickup order is
/// unordered with respect to submission.
///
/// There is no shutdown or draining; workers exit once every queue sender
/// (the pool and all pool-backed promises) has been dropped.
#[derive(Clone)]
pub struct WorkerPool {
  pool_name: Arc<String>,
  dispatcher: JobDispatcher,
  worker_count: usize,
}

impl WorkerPool {
  /// Creates a pool sized to the available hardware parallelism.
  pub fn new(pool_name: &str) -> Self {
    let worker_count = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    Self::with_workers(worker_count, pool_name)
  }

  /// Creates a pool with an explicit worker count (minimum 1).
  pub fn with_workers(worker_count: usize, pool_name: &str) -> Self {
    let worker_count = worker_count.max(1);
    let (queue_tx, queue_rx) = kanal::unbounded::<Job>();
    let pool_name = Arc::new(pool_name.to_string());

    for worker_index in 0..worker_count {
      let worker_pool_name = pool_name.clone();
      let worker_queue_rx = queue_rx.clone();
      let builder = thread::Builder::new().name(format!("{pool_name}-worker-{worker_index}"));
      if let Err(spawn_error) = builder.spawn(move || {
        Self::run_worker_loop(worker_pool_name, worker_index, worker_queue_rx);
      }) {
        error!(
          pool_name = %*pool_name,
          worker_index,
          "Failed to spawn worker thread: {}",
          spawn_error
        );
      }
    }

    debug!(pool_name = %*pool_name, worker_count, "Worker pool started.");
    Self {
      dispatcher: JobDispatcher::new(pool_name.clone(), queue_tx),
      pool_name,
      worker_count,
    }
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn worker_count(&self) -> usize {
    self.worker_count
  }

  /// Returns the current number of jobs waiting in the queue.
  pub fn queued_job_count(&self) -> usize {
    self.dispatcher.queue_len()
  }

  /// Enqueues `task` and returns a pending promise for its outcome. Never
  /// blocks the caller.
  ///
  /// A worker runs the closure under `catch_unwind`: an `Ok` return completes
  /// the promise, an `Err` return fails it with [`PoolError::TaskFailed`], and
  /// a panic fails it with [`PoolError::TaskPanicked`]. Errors never escape to
  /// the worker thread.
  pub fn submit<T, F>(&self, task: F) -> Promise<T>
  where
    T: Clone + Send + 'static,
    F: FnOnce() -> Result<T, BoxError> + Send + 'static,
  {
    let promise = Promise::with_dispatcher(Some(self.dispatcher.clone()));
    let promise_id = promise.id();
    trace!(pool_name = %*self.pool_name, promise_id, "Submitting task to queue.");

    let settle_target = promise.clone();
    let job_pool_name = self.pool_name.clone();
    let job: Job = Box::new(move || {
      match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => {
          trace!(pool_name = %*job_pool_name, promise_id, "Task executed successfully.");
          settle_target.complete(value);
        }
        Ok(Err(cause)) => {
          debug!(pool_name = %*job_pool_name, promise_id, "Task returned an error: {}", cause);
          settle_target.fail(PoolError::TaskFailed(Arc::from(cause)));
        }
        Err(payload) => {
          error!(pool_name = %*job_pool_name, promise_id, "Task panicked during execution.");
          settle_target.fail(PoolError::TaskPanicked(panic_message(&*payload)));
        }
      }
    });

    self.dispatcher.dispatch(job);
    promise
  }

  fn run_worker_loop(pool_name: Arc<String>, worker_index: usize, queue_rx: kanal::Receiver<Job>) {
    debug!(pool_name = %*pool_name, worker_index, "Worker started.");
    while let Ok(job) = queue_rx.recv() {
      // Submitted tasks and combinator glue catch their own panics; this
      // guard keeps the worker alive if a raw continuation still unwinds.
      if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!(pool_name = %*pool_name, worker_index, "Job panicked; worker continues.");
      }
    }
    debug!(pool_name = %*pool_name, worker_index, "Job queue closed. Worker exiting.");
  }
}
