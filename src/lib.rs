//! A worker-thread-backed promise pool: submit blocking closures to a fixed
//! set of worker threads, compose the resulting promises with non-blocking
//! combinators (`map`, `and_then`, `combine`), and extract outcomes with a
//! blocking join with optional timeout.

mod combinator;
mod error;
mod pool;
mod promise;
mod task;

pub use error::PoolError;
pub use pool::WorkerPool;
pub use promise::{Outcome, Promise};
pub use task::BoxError;
