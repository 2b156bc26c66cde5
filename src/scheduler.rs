//! The boundary to the cooperative executor. A [`Scheduler`] wraps any local
//! spawner (for example `futures::executor::LocalSpawner`) and hands back a
//! [`Task`] for every unit of work it spawns.
//!
use crate::Error;
use futures::{
    channel::oneshot::{self, Receiver},
    future::{AbortHandle, Abortable},
    task::{noop_waker_ref, LocalFutureObj, LocalSpawn},
};
use std::{fmt, future::Future, rc::Rc, task::Context};
use tracing::trace;

/// A scheduling context that units of work are spawned into.
///
/// Cloning is cheap; clones spawn onto the same executor.
///
/// # Examples
///
/// ```
/// use settled::Scheduler;
/// use futures::executor::LocalPool;
///
/// let pool = LocalPool::new();
/// let scheduler = Scheduler::new(pool.spawner());
/// let task = scheduler.spawn(async { Ok(40 + 2) }).unwrap();
/// assert_eq!(futures::executor::block_on(task.wait()).unwrap(), 42);
/// ```
#[derive(Clone)]
pub struct Scheduler {
    spawner: Rc<dyn LocalSpawn>,
    eager: bool,
}

/// Handle to a spawned unit of work. Dropping it detaches the unit.
pub struct Task<O> {
    receiver: Receiver<Result<O, Error>>,
    handle: AbortHandle,
}

impl Scheduler {
    pub fn new<S: LocalSpawn + 'static>(spawner: S) -> Self {
        Self {
            spawner: Rc::new(spawner),
            eager: true,
        }
    }

    /// When eager (the default), a unit runs inline up to its first
    /// suspension point inside [`spawn`](Self::spawn), and only reaches the
    /// executor if it suspends. Otherwise it runs once the executor advances.
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }

    /// Spawn `work` as an independent unit and return its handle.
    pub fn spawn<F, O>(&self, work: F) -> Result<Task<O>, Error>
    where
        F: Future<Output = Result<O, Error>> + 'static,
        O: 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let (handle, registration) = AbortHandle::new_pair();
        let abortable = Abortable::new(
            async move {
                // The handle may already be gone; the unit still runs to completion.
                let _ = sender.send(work.await);
            },
            registration,
        );
        let mut unit = Box::pin(async move {
            if abortable.await.is_err() {
                trace!("unit of work cancelled");
            }
        });

        if self.eager {
            // A unit left pending here is polled again by the executor as soon as
            // it is spawned, which registers its real waker.
            let mut cx = Context::from_waker(noop_waker_ref());
            if unit.as_mut().poll(&mut cx).is_ready() {
                trace!("unit of work completed eagerly");
                return Ok(Task { receiver, handle });
            }
        }

        self.spawner.spawn_local_obj(LocalFutureObj::new(unit))?;
        trace!("unit of work spawned");
        Ok(Task { receiver, handle })
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("eager", &self.eager)
            .finish_non_exhaustive()
    }
}

impl<O> Task<O> {
    /// Wait for the unit to finish and return its result, re-raising its
    /// failure. A cancelled unit yields [`Error::Cancelled`].
    pub async fn wait(self) -> Result<O, Error> {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(oneshot::Canceled) => Err(Error::Cancelled),
        }
    }

    /// Send the cooperative stop signal. The unit is dropped at its next
    /// suspension point; a unit that already finished is unaffected.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }
}

impl<O> fmt::Debug for Task<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::Scheduler;
    use crate::{Error, WaitQueue};
    use futures::executor::{block_on, LocalPool};

    #[test]
    fn test_eager_unit_finishes_without_executor() {
        let pool = LocalPool::new();
        let scheduler = Scheduler::new(pool.spawner());
        let task = scheduler.spawn(async { Ok("done") }).unwrap();
        drop(pool);
        assert_eq!(block_on(task.wait()).unwrap(), "done");
    }

    #[test]
    fn test_deferred_unit_waits_for_executor() {
        let mut pool = LocalPool::new();
        let scheduler = Scheduler::new(pool.spawner()).eager(false);
        assert!(!scheduler.is_eager());
        let ran = std::rc::Rc::new(std::cell::Cell::new(false));
        let flag = ran.clone();
        let task = scheduler
            .spawn(async move {
                flag.set(true);
                Ok(1)
            })
            .unwrap();
        assert!(!ran.get());
        pool.run_until_stalled();
        assert!(ran.get());
        assert_eq!(block_on(task.wait()).unwrap(), 1);
    }

    #[test]
    fn test_suspended_unit_resumes_on_executor() {
        let mut pool = LocalPool::new();
        let scheduler = Scheduler::new(pool.spawner());
        let queue = WaitQueue::<u8>::new();
        let waiter = queue.wait();
        let task = scheduler.spawn(async move { waiter.await.map(|n| n * 2) }).unwrap();
        queue.signal(Ok(21));
        pool.run_until_stalled();
        assert_eq!(block_on(task.wait()).unwrap(), 42);
    }

    #[test]
    fn test_failure_is_reraised_by_wait() {
        let pool = LocalPool::new();
        let scheduler = Scheduler::new(pool.spawner());
        let task = scheduler
            .spawn(async { Err::<(), _>(anyhow::anyhow!("boom").into()) })
            .unwrap();
        assert_eq!(block_on(task.wait()).unwrap_err().to_string(), "boom");
    }

    #[test]
    fn test_cancelled_unit_reports_cancellation() {
        let mut pool = LocalPool::new();
        let scheduler = Scheduler::new(pool.spawner());
        let queue = WaitQueue::<u8>::new();
        let waiter = queue.wait();
        let task = scheduler.spawn(waiter).unwrap();
        task.cancel();
        assert!(task.is_cancelled());
        pool.run_until_stalled();
        assert!(queue.is_empty());
        assert!(matches!(block_on(task.wait()), Err(Error::Cancelled)));
    }

    #[test]
    fn test_spawn_refused_by_shut_down_executor() {
        let pool = LocalPool::new();
        let scheduler = Scheduler::new(pool.spawner()).eager(false);
        drop(pool);
        let spawned = scheduler.spawn(async { Ok(()) });
        assert!(matches!(spawned, Err(Error::Spawn(_))));
    }
}
