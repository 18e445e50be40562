//! Non-blocking combinators over [`Promise`].
//!
//! All combinators return a new promise immediately; none block the invoking
//! thread. Downstream promises inherit the upstream's pool dispatcher, so
//! continuations registered on them fire on the pool rather than on the
//! settling thread. Failures propagate without ever invoking the user
//! function.

use crate::error::PoolError;
use crate::promise::Promise;
use crate::task::panic_message;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

struct PairState<A, B, F> {
  left: Option<A>,
  right: Option<B>,
  merge: Option<F>,
}

/// Takes the merge function and both values once both sides have arrived.
/// The `Option` dance under the pair lock guarantees the merge runs at most
/// once even when both inputs settle concurrently.
fn take_ready<A, B, F>(state: &mut PairState<A, B, F>) -> Option<(F, A, B)> {
  if state.left.is_some() && state.right.is_some() {
    if let (Some(merge), Some(left), Some(right)) =
      (state.merge.take(), state.left.take(), state.right.take())
    {
      return Some((merge, left, right));
    }
  }
  None
}

fn fire_merge<A, B, V, F>(ready: Option<(F, A, B)>, target: &Promise<V>)
where
  V: Clone + Send + 'static,
  F: FnOnce(A, B) -> V,
{
  if let Some((merge, left, right)) = ready {
    match panic::catch_unwind(AssertUnwindSafe(|| merge(left, right))) {
      Ok(value) => {
        target.complete(value);
      }
      Err(payload) => {
        target.fail(PoolError::TaskPanicked(panic_message(&*payload)));
      }
    }
  }
}

impl<T: Clone + Send + 'static> Promise<T> {
  /// Returns a promise that completes with `transform(value)` once `self`
  /// completes. If `self` fails, the new promise fails with the same error and
  /// `transform` is never invoked. A panicking `transform` fails the new
  /// promise with [`PoolError::TaskPanicked`].
  pub fn map<U, F>(&self, transform: F) -> Promise<U>
  where
    U: Clone + Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
  {
    let downstream = Promise::with_dispatcher(self.dispatcher());
    let settle_target = downstream.clone();
    self.on_settle(move |outcome| match outcome {
      Ok(value) => {
        let value = value.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| transform(value))) {
          Ok(mapped) => {
            settle_target.complete(mapped);
          }
          Err(payload) => {
            settle_target.fail(PoolError::TaskPanicked(panic_message(&*payload)));
          }
        }
      }
      Err(error) => {
        settle_target.fail(error.clone());
      }
    });
    downstream
  }

  /// Chains a dependent asynchronous step: `bind` maps a successful value to
  /// another promise, and the returned promise mirrors that inner promise's
  /// eventual outcome. Failure of `self` short-circuits; `bind` is never
  /// called and the returned promise fails with the outer error.
  ///
  /// No worker thread blocks while the inner promise runs; the glue is all
  /// continuations.
  pub fn and_then<U, F>(&self, bind: F) -> Promise<U>
  where
    U: Clone + Send + 'static,
    F: FnOnce(T) -> Promise<U> + Send + 'static,
  {
    let downstream = Promise::with_dispatcher(self.dispatcher());
    let settle_target = downstream.clone();
    self.on_settle(move |outcome| match outcome {
      Ok(value) => {
        let value = value.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| bind(value))) {
          Ok(inner) => {
            let inner_target = settle_target.clone();
            inner.on_settle(move |inner_outcome| {
              inner_target.settle_from(inner_outcome);
            });
          }
          Err(payload) => {
            settle_target.fail(PoolError::TaskPanicked(panic_message(&*payload)));
          }
        }
      }
      Err(error) => {
        settle_target.fail(error.clone());
      }
    });
    downstream
  }

  /// Returns a promise that completes with `merge(a, b)` only once both `self`
  /// and `other` have completed successfully. If either input fails, the
  /// returned promise fails with that error. When both inputs fail, whichever
  /// settles first wins the race to fail the result; which error propagates is
  /// deliberately non-deterministic.
  pub fn combine<U, V, F>(&self, other: &Promise<U>, merge: F) -> Promise<V>
  where
    U: Clone + Send + 'static,
    V: Clone + Send + 'static,
    F: FnOnce(T, U) -> V + Send + 'static,
  {
    let downstream = Promise::with_dispatcher(self.dispatcher().or_else(|| other.dispatcher()));
    let pair = Arc::new(Mutex::new(PairState {
      left: None,
      right: None,
      merge: Some(merge),
    }));

    let left_pair = pair.clone();
    let left_target = downstream.clone();
    self.on_settle(move |outcome| match outcome {
      Ok(value) => {
        let ready = {
          let mut state = left_pair.lock();
          state.left = Some(value.clone());
          take_ready(&mut state)
        };
        fire_merge(ready, &left_target);
      }
      Err(error) => {
        left_target.fail(error.clone());
      }
    });

    let right_target = downstream.clone();
    other.on_settle(move |outcome| match outcome {
      Ok(value) => {
        let ready = {
          let mut state = pair.lock();
          state.right = Some(value.clone());
          take_ready(&mut state)
        };
        fire_merge(ready, &right_target);
      }
      Err(error) => {
        right_target.fail(error.clone());
      }
    });

    downstream
  }
}
