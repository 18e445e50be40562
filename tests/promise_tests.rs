use promise_pool::{PoolError, Promise};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

// Helper to initialize tracing for tests (Once ensures it runs once per binary).
fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,promise_pool=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

#[test]
fn test_single_assignment_first_settle_wins() {
  setup_tracing_for_test();
  let promise = Promise::pending();

  assert!(promise.complete(1), "first complete must perform the transition");
  assert!(!promise.complete(2), "second complete must be a no-op");
  assert!(
    !promise.fail(PoolError::TaskPanicked("too late".to_string())),
    "fail after complete must be a no-op"
  );

  assert_eq!(promise.join().unwrap(), 1, "the first outcome must be immutable");
  assert_eq!(promise.try_outcome().unwrap().unwrap(), 1);
}

#[test]
fn test_fail_then_complete_keeps_the_error() {
  setup_tracing_for_test();
  let promise: Promise<u32> = Promise::pending();

  assert!(promise.fail(PoolError::failed("login refused")));
  assert!(!promise.complete(7));

  let error = promise.join().unwrap_err();
  match &error {
    PoolError::TaskFailed(cause) => assert!(cause.to_string().contains("login refused")),
    other => panic!("Expected TaskFailed, got {:?}", other),
  }
}

#[test]
fn test_register_after_settlement_runs_inline_before_return() {
  setup_tracing_for_test();
  let promise = Promise::completed("ready".to_string());

  let seen = Arc::new(AtomicBool::new(false));
  let seen_in_continuation = seen.clone();
  promise.on_settle(move |outcome| {
    assert_eq!(outcome.as_ref().unwrap().as_str(), "ready");
    seen_in_continuation.store(true, Ordering::SeqCst);
  });

  assert!(
    seen.load(Ordering::SeqCst),
    "continuation on a settled promise must run before on_settle returns"
  );
}

#[test]
fn test_register_while_pending_runs_at_settlement() {
  setup_tracing_for_test();
  let promise: Promise<u32> = Promise::pending();

  let seen = Arc::new(AtomicBool::new(false));
  let seen_in_continuation = seen.clone();
  promise.on_settle(move |outcome| {
    assert_eq!(*outcome.as_ref().unwrap(), 9);
    seen_in_continuation.store(true, Ordering::SeqCst);
  });
  assert!(!seen.load(Ordering::SeqCst), "continuation must not run before settlement");

  promise.complete(9);
  assert!(seen.load(Ordering::SeqCst), "settlement must run the stored continuation");
}

#[test]
fn test_join_timeout_then_later_join_observes_outcome() {
  setup_tracing_for_test();
  let promise: Promise<u32> = Promise::pending();

  let completer = promise.clone();
  let completer_thread = thread::spawn(move || {
    thread::sleep(Duration::from_millis(200));
    completer.complete(7);
  });

  let start = Instant::now();
  let timed_out = promise.join_timeout(Duration::from_millis(50));
  let waited = start.elapsed();

  match timed_out {
    Err(PoolError::JoinTimeout(timeout)) => assert_eq!(timeout, Duration::from_millis(50)),
    other => panic!("Expected JoinTimeout, got {:?}", other),
  }
  assert!(
    waited >= Duration::from_millis(50) && waited < Duration::from_millis(150),
    "timeout fired at {:?}, expected close to 50ms",
    waited
  );

  // The work was not cancelled; a later join sees the eventual value.
  assert_eq!(promise.join().unwrap(), 7);
  completer_thread.join().unwrap();
}

#[test]
fn test_join_timeout_on_already_settled_promise_returns_immediately() {
  setup_tracing_for_test();
  let promise = Promise::completed(3);
  let start = Instant::now();
  assert_eq!(promise.join_timeout(Duration::from_secs(5)).unwrap(), 3);
  assert!(start.elapsed() < Duration::from_millis(100));
}

#[test]
fn test_concurrent_registration_stress_each_continuation_runs_exactly_once() {
  setup_tracing_for_test();
  const REGISTRANTS: usize = 64;

  let promise: Promise<u32> = Promise::pending();
  let invocations = Arc::new(AtomicUsize::new(0));
  let mut threads = Vec::new();

  // Settlement races the registrations below.
  let completer = promise.clone();
  threads.push(thread::spawn(move || {
    thread::sleep(Duration::from_millis(5));
    completer.complete(42);
  }));

  for _ in 0..REGISTRANTS {
    let registrant = promise.clone();
    let invocations_for_continuation = invocations.clone();
    threads.push(thread::spawn(move || {
      let jitter_ms = rand::rng().random_range(0..10u64);
      thread::sleep(Duration::from_millis(jitter_ms));
      registrant.on_settle(move |outcome| {
        assert_eq!(*outcome.as_ref().unwrap(), 42);
        invocations_for_continuation.fetch_add(1, Ordering::SeqCst);
      });
    }));
  }

  for handle in threads {
    handle.join().unwrap();
  }

  assert_eq!(
    invocations.load(Ordering::SeqCst),
    REGISTRANTS,
    "every continuation must run exactly once, with no duplicates and none lost"
  );
}

#[test]
fn test_racing_completers_settle_exactly_once() {
  setup_tracing_for_test();
  let promise: Promise<usize> = Promise::pending();
  let wins = Arc::new(AtomicUsize::new(0));

  let mut threads = Vec::new();
  for contender in 0..8 {
    let completer = promise.clone();
    let wins_for_thread = wins.clone();
    threads.push(thread::spawn(move || {
      if completer.complete(contender) {
        wins_for_thread.fetch_add(1, Ordering::SeqCst);
      }
    }));
  }
  for handle in threads {
    handle.join().unwrap();
  }

  assert_eq!(wins.load(Ordering::SeqCst), 1, "exactly one completer must win");
  let winner = promise.join().unwrap();
  assert!(winner < 8);
}

#[test]
fn test_promise_ids_are_unique() {
  setup_tracing_for_test();
  let first: Promise<u32> = Promise::pending();
  let second: Promise<u32> = Promise::pending();
  assert_ne!(first.id(), second.id());
  assert_eq!(first.clone().id(), first.id(), "clones share the same identity");
}
