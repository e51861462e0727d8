//! Bounded FIFO mailbox with purge-on-full backpressure.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::error;

struct Inner<M> {
    name: &'static str,
    capacity: usize,
    queue: Mutex<VecDeque<M>>,
    notify: Notify,
}

/// Private message queue of one manager
///
/// Cloning yields another handle onto the same queue.
pub struct Mailbox<M> {
    inner: Arc<Inner<M>>,
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<M> std::fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .finish_non_exhaustive()
    }
}

impl<M> Mailbox<M> {
    /// Create a mailbox holding at most `capacity` messages
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                capacity: capacity.max(1),
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                notify: Notify::new(),
            }),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<M>> {
        self.inner.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a message without blocking
    ///
    /// When the mailbox is full every pending message is dropped before
    /// `message` is enqueued.
    pub fn post(&self, message: M) {
        {
            let mut queue = self.queue();
            if queue.len() >= self.inner.capacity {
                let dropped = queue.len();
                queue.clear();
                error!(
                    mailbox = self.inner.name,
                    dropped, "Message queue full, queue purged"
                );
            }
            queue.push_back(message);
        }
        self.inner.notify.notify_one();
    }

    /// Dequeue the oldest message if one is pending
    pub fn try_recv(&self) -> Option<M> {
        self.queue().pop_front()
    }

    /// Wait for the next message
    pub async fn recv(&self) -> M {
        loop {
            if let Some(message) = self.try_recv() {
                return message;
            }
            self.inner.notify.notified().await;
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
