//! Thread-safe FIFO between command producers and the dispatcher.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard},
    time::Duration,
};

struct Inner<T> {
    queue: VecDeque<T>,
    shut_down: bool,
}

/// Multi-producer queue with blocking and timed pops. `shutdown` stops the
/// waiting, not the draining: queued items stay poppable until empty.
pub struct CommandBus<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
}

impl<T> CommandBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                shut_down: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends an item and wakes one waiter. Accepted even after shutdown.
    pub fn push(&self, item: T) {
        let mut inner = self.lock();
        inner.queue.push_back(item);
        drop(inner);
        self.ready.notify_one();
    }

    /// Pops the front item, waiting at most `timeout` for one to arrive.
    /// Returns `None` on timeout, or on shutdown once the queue is empty.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let inner = self.lock();
        let (mut inner, _) = self
            .ready
            .wait_timeout_while(inner, timeout, |inner| {
                inner.queue.is_empty() && !inner.shut_down
            })
            .unwrap_or_else(|e| e.into_inner());
        inner.queue.pop_front()
    }

    /// Pops the front item, waiting indefinitely until one arrives or the
    /// bus is shut down.
    pub fn pop(&self) -> Option<T> {
        let inner = self.lock();
        let mut inner = self
            .ready
            .wait_while(inner, |inner| {
                inner.queue.is_empty() && !inner.shut_down
            })
            .unwrap_or_else(|e| e.into_inner());
        inner.queue.pop_front()
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().queue.pop_front()
    }

    /// Wakes every waiter. Pending items remain poppable.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.shut_down = true;
        drop(inner);
        self.ready.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }
}

impl<T> Default for CommandBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
