use crate::{Error, Promise, Task, WaitQueue};
use std::fmt;

/// The result of a unit of work: either a final value, or something that
/// still has to be waited on before a final value exists.
///
/// A [`Task`] yields another `Settle`, so chains of any length can be built
/// by spawning work that itself returns an awaitable.
pub enum Settle<T> {
    Value(T),
    Promise(Promise<T>),
    Queue(WaitQueue<T>),
    Task(Task<Settle<T>>),
}

impl<T: Clone + 'static> Settle<T> {
    /// Follow the chain until a plain value turns up. The first failure
    /// along the way ends the chain and is returned as-is.
    ///
    /// A chain that loops back on itself never finishes.
    pub async fn settle(self) -> Result<T, Error> {
        let mut candidate = self;
        loop {
            candidate = match candidate {
                Settle::Value(value) => return Ok(value),
                Settle::Promise(promise) => Settle::Value(promise.wait().await?),
                Settle::Queue(queue) => Settle::Value(queue.wait().await?),
                Settle::Task(task) => task.wait().await?,
            };
        }
    }
}

impl<T> Settle<T> {
    pub fn is_value(&self) -> bool {
        matches!(self, Settle::Value(_))
    }
}

impl<T> From<Promise<T>> for Settle<T> {
    fn from(promise: Promise<T>) -> Self {
        Settle::Promise(promise)
    }
}

impl<T> From<WaitQueue<T>> for Settle<T> {
    fn from(queue: WaitQueue<T>) -> Self {
        Settle::Queue(queue)
    }
}

impl<T> From<Task<Settle<T>>> for Settle<T> {
    fn from(task: Task<Settle<T>>) -> Self {
        Settle::Task(task)
    }
}

impl<T: fmt::Debug> fmt::Debug for Settle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Settle::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Settle::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
            Settle::Queue(queue) => f.debug_tuple("Queue").field(queue).finish(),
            Settle::Task(task) => f.debug_tuple("Task").field(task).finish(),
        }
    }
}
