use crate::error::PoolError;
use crate::task::{Job, JobDispatcher};

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

lazy_static::lazy_static! {
  static ref NEXT_PROMISE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// The terminal outcome of a promise: the task's value or the error that
/// settled it.
pub type Outcome<T> = Result<T, PoolError>;

type Continuation<T> = Box<dyn FnOnce(&Outcome<T>) + Send + 'static>;

enum State<T> {
  /// Not yet settled; holds the continuations to run at settlement, in
  /// registration order.
  Pending(Vec<Continuation<T>>),
  Settled(Outcome<T>),
}

struct Shared<T> {
  promise_id: u64,
  state: Mutex<State<T>>,
  settled: Condvar,
  dispatcher: Option<JobDispatcher>,
}

/// A single-assignment handle to the eventual outcome of one asynchronous
/// computation.
///
/// A promise transitions exactly once from pending to either completed or
/// failed; the first `complete`/`fail` call wins and later attempts are silent
/// no-ops. Continuations registered with [`Promise::on_settle`] run exactly
/// once: either when the promise settles, or inline during registration if it
/// has already settled. Each promise owns its own mutex and condvar, so
/// unrelated promises never contend.
///
/// Cloning a `Promise` clones the handle, not the computation; all clones
/// observe the same outcome. Values are `Clone` because one outcome may be
/// read by many continuations and joiners.
pub struct Promise<T> {
  shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<T> fmt::Debug for Promise<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let settled = matches!(&*self.shared.state.lock(), State::Settled(_));
    f.debug_struct("Promise")
      .field("promise_id", &self.shared.promise_id)
      .field("settled", &settled)
      .finish()
  }
}

impl<T> Promise<T> {
  /// Returns the unique ID of this promise.
  pub fn id(&self) -> u64 {
    self.shared.promise_id
  }

  /// Whether the promise has reached a terminal state.
  pub fn is_settled(&self) -> bool {
    matches!(&*self.shared.state.lock(), State::Settled(_))
  }

  pub(crate) fn dispatcher(&self) -> Option<JobDispatcher> {
    self.shared.dispatcher.clone()
  }
}

impl<T: Clone + Send + 'static> Promise<T> {
  pub(crate) fn with_dispatcher(dispatcher: Option<JobDispatcher>) -> Self {
    let promise_id = NEXT_PROMISE_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    Self {
      shared: Arc::new(Shared {
        promise_id,
        state: Mutex::new(State::Pending(Vec::new())),
        settled: Condvar::new(),
        dispatcher,
      }),
    }
  }

  /// Creates a detached pending promise. Continuations on a detached promise
  /// run inline on the settling thread.
  pub fn pending() -> Self {
    Self::with_dispatcher(None)
  }

  /// Creates a promise already completed with `value`.
  pub fn completed(value: T) -> Self {
    let promise = Self::pending();
    promise.complete(value);
    promise
  }

  /// Creates a promise already failed with `error`.
  pub fn failed(error: PoolError) -> Self {
    let promise = Self::pending();
    promise.fail(error);
    promise
  }

  /// Completes the promise with `value`. Returns `true` if this call performed
  /// the pending-to-completed transition, `false` if the promise had already
  /// settled (a silent no-op, never an error).
  pub fn complete(&self, value: T) -> bool {
    self.settle(Ok(value))
  }

  /// Fails the promise with `error`. Same first-caller-wins semantics as
  /// [`Promise::complete`].
  pub fn fail(&self, error: PoolError) -> bool {
    self.settle(Err(error))
  }

  /// Registers a continuation to run exactly once with the promise's outcome.
  ///
  /// While the promise is pending the continuation is stored and later run by
  /// whichever thread settles the promise (redispatched to the pool for
  /// pool-backed promises, inline on the settling thread otherwise). If the
  /// promise has already settled, the continuation runs inline with the stored
  /// outcome before `on_settle` returns.
  ///
  /// The state mutex is the single synchronization point shared with
  /// settlement: a continuation registered concurrently with a `complete` or
  /// `fail` is never lost and never run twice, and always observes the fully
  /// written outcome.
  pub fn on_settle<F>(&self, continuation: F)
  where
    F: FnOnce(&Outcome<T>) + Send + 'static,
  {
    let mut slot: Option<Continuation<T>> = Some(Box::new(continuation));
    let already_settled = {
      let mut state = self.shared.state.lock();
      match &mut *state {
        State::Pending(continuations) => {
          if let Some(stored) = slot.take() {
            continuations.push(stored);
          }
          None
        }
        State::Settled(outcome) => Some(outcome.clone()),
      }
    };
    if let (Some(outcome), Some(run_now)) = (already_settled, slot) {
      run_now(&outcome);
    }
  }

  /// Blocks the calling thread until the promise settles, then returns a clone
  /// of the outcome. A failed promise yields the error that settled it.
  pub fn join(&self) -> Outcome<T> {
    let mut state = self.shared.state.lock();
    loop {
      if let State::Settled(outcome) = &*state {
        return outcome.clone();
      }
      self.shared.settled.wait(&mut state);
    }
  }

  /// As [`Promise::join`], but waits at most `timeout` and then returns
  /// [`PoolError::JoinTimeout`]. Timing out does not cancel the underlying
  /// work; a later join on the same promise can still observe its outcome.
  pub fn join_timeout(&self, timeout: Duration) -> Outcome<T> {
    let deadline = Instant::now() + timeout;
    let mut state = self.shared.state.lock();
    loop {
      if let State::Settled(outcome) = &*state {
        return outcome.clone();
      }
      if self.shared.settled.wait_until(&mut state, deadline).timed_out() {
        // Settlement may have raced the wakeup; check once more under the lock.
        if let State::Settled(outcome) = &*state {
          return outcome.clone();
        }
        trace!(promise_id = self.shared.promise_id, ?timeout, "Join timed out before settlement.");
        return Err(PoolError::JoinTimeout(timeout));
      }
    }
  }

  /// Non-blocking read of the outcome, if settled.
  pub fn try_outcome(&self) -> Option<Outcome<T>> {
    match &*self.shared.state.lock() {
      State::Settled(outcome) => Some(outcome.clone()),
      State::Pending(_) => None,
    }
  }

  /// Settles with a clone of an upstream outcome. Used by combinator glue.
  pub(crate) fn settle_from(&self, outcome: &Outcome<T>) -> bool {
    self.settle(outcome.clone())
  }

  pub(crate) fn settle(&self, outcome: Outcome<T>) -> bool {
    let continuations = {
      let mut state = self.shared.state.lock();
      if matches!(&*state, State::Settled(_)) {
        trace!(
          promise_id = self.shared.promise_id,
          "Settle on an already-settled promise ignored."
        );
        return false;
      }
      let previous = mem::replace(&mut *state, State::Settled(outcome.clone()));
      self.shared.settled.notify_all();
      match previous {
        State::Pending(continuations) => continuations,
        State::Settled(_) => Vec::new(),
      }
    };

    trace!(
      promise_id = self.shared.promise_id,
      ok = outcome.is_ok(),
      continuations = continuations.len(),
      "Promise settled."
    );

    // Continuations run outside the state lock, in registration order.
    for continuation in continuations {
      self.fire(continuation, outcome.clone());
    }
    true
  }

  fn fire(&self, continuation: Continuation<T>, outcome: Outcome<T>) {
    match &self.shared.dispatcher {
      Some(dispatcher) => {
        let job: Job = Box::new(move || continuation(&outcome));
        dispatcher.dispatch(job);
      }
      None => continuation(&outcome),
    }
  }
}
