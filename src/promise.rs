use crate::{Error, Scheduler, Settle, Task, WaitQueue};
use std::{
    cell::{Cell, RefCell},
    fmt,
    future::Future,
    rc::Rc,
};
use tracing::{debug, trace, warn};

/// A single-resolution value container with any number of waiters.
///
/// A promise starts [`State::Pending`] and is resolved at most once, to a value
/// or to a captured failure. Every caller suspended in [`wait`](Self::wait) at
/// that moment is released; callers arriving later get the stored outcome
/// without suspending.
///
/// Clones are handles to the same promise.
///
/// # Examples
///
/// ```
/// use settled::Promise;
/// use futures::executor::block_on;
///
/// let promise = Promise::new();
/// let waiter = promise.clone();
/// promise.resolve("hi").unwrap();
/// assert_eq!(block_on(waiter.wait()).unwrap(), "hi");
/// assert!(promise.resolve("again").is_err());
/// ```
pub struct Promise<T> {
    inner: Rc<Inner<T>>,
}

/// Where a promise is in its lifecycle. Anything but `Pending` is final.
#[derive(Debug, Clone)]
pub enum State<T> {
    Pending,
    Fulfilled(T),
    Rejected(Error),
}

struct Inner<T> {
    state: RefCell<State<T>>,
    waiters: WaitQueue<T>,
    scheduler: RefCell<Option<Scheduler>>,
    resolvers: RefCell<Vec<Task<()>>>,
}

impl<T> State<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }
}

impl<T> Promise<T> {
    /// A pending promise with no scheduling context. It can be resolved with
    /// a value or an error right away; work-based resolution needs
    /// [`rebind`](Self::rebind) first.
    pub fn new() -> Self {
        Self::with_state(State::Pending, None)
    }

    /// A promise that is already fulfilled.
    pub fn fulfilled(value: T) -> Self {
        Self::with_state(State::Fulfilled(value), None)
    }

    /// A promise that is already rejected.
    pub fn rejected(error: Error) -> Self {
        Self::with_state(State::Rejected(error), None)
    }

    /// A pending promise bound to `scheduler`.
    pub fn pending(scheduler: &Scheduler) -> Self {
        Self::with_state(State::Pending, Some(scheduler.clone()))
    }

    fn with_state(state: State<T>, scheduler: Option<Scheduler>) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(state),
                waiters: WaitQueue::new(),
                scheduler: RefCell::new(scheduler),
                resolvers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.inner.state.borrow().is_pending()
    }

    pub fn is_rejected(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Rejected(_))
    }

    /// True while at least one caller is suspended in [`wait`](Self::wait).
    pub fn is_waiting(&self) -> bool {
        !self.inner.waiters.is_empty()
    }

    /// Attach the promise to another scheduling context. Only work spawned
    /// from now on is affected.
    pub fn rebind(&self, scheduler: &Scheduler) -> &Self {
        *self.inner.scheduler.borrow_mut() = Some(scheduler.clone());
        self
    }

    pub fn scheduler(&self) -> Option<Scheduler> {
        self.inner.scheduler.borrow().clone()
    }

    /// Cancel every unit of work currently resolving this promise. The
    /// promise stays pending and can still be resolved some other way.
    pub fn stop(&self) {
        let resolvers = std::mem::take(&mut *self.inner.resolvers.borrow_mut());
        debug!(stopped = resolvers.len(), "stopping resolution work");
        for task in resolvers {
            task.cancel();
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Run `work` on `scheduler` and resolve the promise with its settled
    /// result.
    ///
    /// If the scheduler is eager and the work finishes without suspending,
    /// the returned promise is already resolved.
    pub fn spawn<F>(scheduler: &Scheduler, work: F) -> Result<Self, Error>
    where
        F: Future<Output = Result<Settle<T>, Error>> + 'static,
    {
        let promise = Self::pending(scheduler);
        promise.execute(work)?;
        Ok(promise)
    }

    /// Store `value` and release every waiter.
    ///
    /// The value is stored as given. Unlike work-based resolution, nothing
    /// here looks inside it for another awaitable.
    pub fn resolve(&self, value: T) -> Result<(), Error> {
        self.transition(Ok(value))
    }

    /// Store `error` and release every waiter, each of which sees `error`.
    pub fn reject(&self, error: Error) -> Result<(), Error> {
        self.transition(Err(error))
    }

    /// Resolve a pending promise later by running `work` on its scheduler.
    pub fn resolve_with<F>(&self, work: F) -> Result<(), Error>
    where
        F: Future<Output = Result<Settle<T>, Error>> + 'static,
    {
        if self.is_resolved() {
            return Err(Error::AlreadyResolved);
        }
        self.execute(work)
    }

    /// Return the stored value, or raise the stored failure. A pending promise
    /// suspends the caller until it is resolved.
    pub async fn wait(&self) -> Result<T, Error> {
        let waiter = match &*self.inner.state.borrow() {
            State::Fulfilled(value) => return Ok(value.clone()),
            State::Rejected(error) => return Err(error.clone()),
            State::Pending => self.inner.waiters.wait(),
        };
        waiter.await
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> State<T> {
        self.inner.state.borrow().clone()
    }

    fn execute<F>(&self, work: F) -> Result<(), Error>
    where
        F: Future<Output = Result<Settle<T>, Error>> + 'static,
    {
        let scheduler = self.scheduler().ok_or(Error::Unbound)?;
        let promise = self.clone();
        let finished = Rc::new(Cell::new(false));
        let done = finished.clone();
        let task = scheduler.spawn(async move {
            let outcome = match work.await {
                Ok(candidate) => candidate.settle().await,
                Err(error) => Err(error),
            };
            done.set(true);
            promise.complete(outcome);
            Ok(())
        })?;
        // Work that finished inline has nothing left to cancel.
        if !finished.get() {
            self.inner.resolvers.borrow_mut().push(task);
        }
        Ok(())
    }

    fn complete(&self, outcome: Result<T, Error>) {
        if let Err(Error::Cancelled) = outcome {
            trace!("resolution work cancelled, promise left pending");
            return;
        }
        if self.transition(outcome).is_err() {
            warn!("promise already resolved, discarding outcome of resolution work");
        }
    }

    fn transition(&self, outcome: Result<T, Error>) -> Result<(), Error> {
        {
            let mut state = self.inner.state.borrow_mut();
            if !state.is_pending() {
                return Err(Error::AlreadyResolved);
            }
            *state = match &outcome {
                Ok(value) => State::Fulfilled(value.clone()),
                Err(error) => State::Rejected(error.clone()),
            };
        }
        self.inner.resolvers.borrow_mut().clear();
        let woken = self.inner.waiters.signal(outcome);
        debug!(woken, rejected = self.is_rejected(), "promise resolved");
        Ok(())
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.state.borrow() {
            State::Pending => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Rejected(_) => "rejected",
        };
        f.debug_struct("Promise")
            .field("state", &state)
            .field("waiting", &self.inner.waiters.len())
            .finish()
    }
}
