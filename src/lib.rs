//! Single-resolution promises for cooperative, single-threaded executors.
//!
//! A [`Promise`] starts empty and is resolved at most once, to a value or to a
//! captured failure. Any number of callers can [`wait`](Promise::wait) on it;
//! all of them are released together when it resolves.
//!
//! A promise resolved by a unit of work follows whatever that work returns
//! through [`Settle`]: if the result is another promise, a [`WaitQueue`] or a
//! spawned [`Task`], the promise waits on that too, until a plain value
//! turns up.
//!
//! ```
//! use settled::{Promise, Scheduler, Settle};
//! use futures::executor::LocalPool;
//!
//! let mut pool = LocalPool::new();
//! let scheduler = Scheduler::new(pool.spawner());
//!
//! let inner = Promise::pending(&scheduler);
//! let outer = Promise::spawn(&scheduler, {
//!     let inner = inner.clone();
//!     async move { Ok(Settle::Promise(inner)) }
//! })
//! .unwrap();
//! assert!(!outer.is_resolved());
//!
//! inner.resolve(5).unwrap();
//! pool.run_until_stalled();
//! assert_eq!(pool.run_until(outer.wait()).unwrap(), 5);
//! ```
use std::rc::Rc;

use futures::task::SpawnError;
use thiserror::Error;

pub mod promise;
pub mod scheduler;
pub mod settle;
pub mod wait_queue;

pub use promise::{Promise, State};
pub use scheduler::{Scheduler, Task};
pub use settle::Settle;
pub use wait_queue::{Wait, WaitQueue};

/// Errors are cheap to clone: a rejected promise hands the same captured
/// failure to every caller.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("promise was previously resolved")]
    AlreadyResolved,
    #[error("promise is not bound to a scheduler")]
    Unbound,
    /// The cooperative stop signal. Work that ends with it leaves its
    /// promise pending instead of rejecting it.
    #[error("unit of work was cancelled")]
    Cancelled,
    #[error("failed to spawn unit of work: {0}")]
    Spawn(Rc<SpawnError>),
    /// A failure raised by application code while producing a value.
    #[error("{0}")]
    Failed(Rc<anyhow::Error>),
}

impl Error {
    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        Error::Failed(Rc::new(error.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Error::Failed(Rc::new(error))
    }
}

impl From<SpawnError> for Error {
    fn from(error: SpawnError) -> Self {
        Error::Spawn(Rc::new(error))
    }
}
