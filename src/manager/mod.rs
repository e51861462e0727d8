//! # Manager Framework
//!
//! The actor skeleton shared by every manager.
//!
//! This module handles:
//! - Bounded per-manager mailboxes with purge-on-full backpressure
//! - The publish/subscribe event bus
//! - Cancellable timers that re-inject messages into a mailbox
//! - Callback sinks handed to driver collaborators
//! - Spawning a manager onto its own tokio task
//!
//! A manager's only suspension point is receiving from its mailbox; every
//! handler runs to completion before the next message is taken.

pub mod bus;
pub mod mailbox;
pub mod timer;

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::{Event, ManagerId};

pub use bus::EventBus;
pub use mailbox::Mailbox;
pub use timer::Timer;

/// Cloneable callback through which a collaborator reports events of type `E`
///
/// Each event is converted into the owning manager's message type and
/// posted to its mailbox.
pub struct EventSink<E> {
    deliver: Arc<dyn Fn(E) + Send + Sync>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self { deliver: Arc::clone(&self.deliver) }
    }
}

impl<E> std::fmt::Debug for EventSink<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EventSink")
    }
}

impl<E: 'static> EventSink<E> {
    /// Sink posting into `mailbox` after mapping through `wrap`
    pub fn new<M, F>(mailbox: Mailbox<M>, wrap: F) -> Self
    where
        M: Send + 'static,
        F: Fn(E) -> M + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(move |event| mailbox.post(wrap(event))),
        }
    }

    /// Sink backed by an arbitrary callback
    pub fn from_fn<F>(deliver: F) -> Self
    where
        F: Fn(E) + Send + Sync + 'static,
    {
        Self { deliver: Arc::new(deliver) }
    }

    pub fn send(&self, event: E) {
        (self.deliver)(event)
    }
}

/// A subsystem actor
pub trait Manager: Send + 'static {
    /// Everything the manager's mailbox can carry
    type Message: From<Event> + Send + 'static;

    /// Publisher identity of this manager
    const ID: ManagerId;

    /// Publishers whose events this manager receives
    const SUBSCRIPTIONS: &'static [ManagerId];

    /// Narrows the subscribed events further; everything passes by default
    fn accepts(_event: &Event) -> bool {
        true
    }

    /// One-time setup run on the manager's task before the first message
    fn start(&mut self) {}

    /// Handle one message to completion
    fn handle(&mut self, message: Self::Message);
}

/// Subscribe `mailbox` to the manager's sources and run it on its own task
pub fn spawn<T: Manager>(
    mut manager: T,
    mailbox: Mailbox<T::Message>,
    bus: &EventBus,
) -> JoinHandle<()> {
    bus.subscribe_filtered(T::SUBSCRIPTIONS, T::accepts, mailbox.clone());

    tokio::spawn(async move {
        debug!("{} manager started", T::ID.name());
        manager.start();
        loop {
            let message = mailbox.recv().await;
            manager.handle(message);
        }
    })
}
