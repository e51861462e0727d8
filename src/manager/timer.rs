//! Cancellable delayed messages re-injected into a manager's own mailbox.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::mailbox::Mailbox;

/// One-shot timer that posts a message after a delay
///
/// Arming cancels any pending instance, so a timer never has more than one
/// firing outstanding. Cancelling a fired or idle timer does nothing. Once
/// `cancel` (or a re-arm) returns, the cancelled firing can no longer post.
pub struct Timer<M> {
    mailbox: Mailbox<M>,
    generation: Arc<Mutex<u64>>,
    handle: Option<JoinHandle<()>>,
}

impl<M> std::fmt::Debug for Timer<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("mailbox", &self.mailbox.name())
            .field("armed", &self.is_armed())
            .finish()
    }
}

fn lock(generation: &Mutex<u64>) -> MutexGuard<'_, u64> {
    generation.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<M> Timer<M> {
    /// True while a firing is pending
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Drop any pending firing
    pub fn cancel(&mut self) {
        // Waits out a firing that is posting right now
        *lock(&self.generation) += 1;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl<M: Send + 'static> Timer<M> {
    pub fn new(mailbox: Mailbox<M>) -> Self {
        Self {
            mailbox,
            generation: Arc::new(Mutex::new(0)),
            handle: None,
        }
    }

    /// Post `message` to the owning mailbox `delay` after this call
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&mut self, delay: Duration, message: M) {
        self.cancel();

        let deadline = Instant::now() + delay;
        let armed_generation = *lock(&self.generation);
        let generation = Arc::clone(&self.generation);
        let mailbox = self.mailbox.clone();

        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let current = lock(&generation);
            if *current == armed_generation {
                mailbox.post(message);
            }
        }));
    }
}

impl<M> Drop for Timer<M> {
    fn drop(&mut self) {
        self.cancel();
    }
}
