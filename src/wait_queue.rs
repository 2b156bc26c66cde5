//! A wait queue holds suspended callers and releases all of them on a single
//! signal. It has no memory of past signals: a caller that starts waiting
//! after a signal waits for the next one.
//!
use crate::Error;
use futures::channel::oneshot::{self, Receiver, Sender};
use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};
use tracing::trace;

/// Every clone of a `WaitQueue` shares the same waiters.
///
/// # Examples
///
/// ```
/// use settled::WaitQueue;
/// use futures::executor::block_on;
///
/// let queue = WaitQueue::<&str>::new();
/// let waiter = queue.wait();
/// assert_eq!(queue.len(), 1);
/// assert_eq!(queue.signal(Ok("ready")), 1);
/// assert_eq!(block_on(waiter).unwrap(), "ready");
/// assert!(queue.is_empty());
/// ```
pub struct WaitQueue<T> {
    waiters: Rc<RefCell<VecDeque<Sender<Result<T, Error>>>>>,
}

/// A single suspended caller, returned by [`WaitQueue::wait`].
#[must_use = "a waiter does nothing unless polled"]
pub struct Wait<T> {
    receiver: Receiver<Result<T, Error>>,
}

impl<T> WaitQueue<T> {
    pub fn new() -> Self {
        Self {
            waiters: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Enqueue one waiter. The waiter holds its place in line from this call
    /// on, whether or not it has been polled yet.
    pub fn wait(&self) -> Wait<T> {
        let (sender, receiver) = oneshot::channel();
        self.waiters.borrow_mut().push_back(sender);
        Wait { receiver }
    }

    /// Number of callers still waiting. Waiters that were dropped before
    /// being signalled are not counted.
    pub fn len(&self) -> usize {
        self.waiters
            .borrow()
            .iter()
            .filter(|sender| !sender.is_canceled())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> WaitQueue<T> {
    /// Wake every waiter enqueued so far, in the order they started waiting,
    /// delivering `outcome` to each. Returns how many were woken.
    pub fn signal(&self, outcome: Result<T, Error>) -> usize {
        // Drained in one step, so nothing enqueued from here on sees this signal.
        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        let mut woken = 0;
        for sender in waiters {
            if sender.send(outcome.clone()).is_ok() {
                woken += 1;
            }
        }
        trace!(woken, "wait queue signalled");
        woken
    }
}

impl<T> Clone for WaitQueue<T> {
    fn clone(&self) -> Self {
        Self {
            waiters: self.waiters.clone(),
        }
    }
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for WaitQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQueue")
            .field("waiting", &self.len())
            .finish()
    }
}

impl<T> Future for Wait<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Every handle to the queue went away without a signal.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Wait<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::WaitQueue;
    use crate::Error;
    use futures::executor::{block_on, LocalPool};
    use futures::task::LocalSpawnExt;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn test_signal_wakes_every_waiter_in_order() {
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let queue = WaitQueue::<u32>::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for id in 0..3 {
            let waiter = queue.wait();
            let order = order.clone();
            spawner
                .spawn_local(async move {
                    let value = waiter.await.unwrap();
                    order.borrow_mut().push((id, value));
                })
                .unwrap();
        }
        pool.run_until_stalled();
        assert_eq!(queue.len(), 3);
        assert!(order.borrow().is_empty());

        assert_eq!(queue.signal(Ok(7)), 3);
        assert!(queue.is_empty());
        pool.run_until_stalled();
        assert_eq!(*order.borrow(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_signal_does_not_reach_later_waiters() {
        let queue = WaitQueue::<&str>::new();
        assert_eq!(queue.signal(Ok("early")), 0);

        let waiter = queue.wait();
        assert_eq!(queue.len(), 1);
        queue.signal(Ok("late"));
        assert_eq!(block_on(waiter).unwrap(), "late");
    }

    #[test]
    fn test_signal_failure_is_raised_to_waiters() {
        let queue = WaitQueue::<()>::new();
        let first = queue.wait();
        let second = queue.clone().wait();
        queue.signal(Err(anyhow::anyhow!("broken").into()));
        assert_eq!(block_on(first).unwrap_err().to_string(), "broken");
        assert_eq!(block_on(second).unwrap_err().to_string(), "broken");
    }

    #[test]
    fn test_dropped_waiter_is_skipped() {
        let queue = WaitQueue::<u8>::new();
        let gone = queue.wait();
        let kept = queue.wait();
        drop(gone);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.signal(Ok(1)), 1);
        assert_eq!(block_on(kept).unwrap(), 1);
    }

    #[test]
    fn test_dropped_queue_releases_waiters() {
        let queue = WaitQueue::<u8>::new();
        let waiter = queue.wait();
        drop(queue);
        assert!(matches!(block_on(waiter), Err(Error::Cancelled)));
    }
}
