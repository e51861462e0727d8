//! Publish/subscribe event bus connecting the manager mailboxes.

use std::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

use super::mailbox::Mailbox;
use crate::events::{Event, ManagerId};

type Deliver = Box<dyn Fn(Event) + Send + Sync>;

struct Subscription {
    name: &'static str,
    sources: Vec<ManagerId>,
    accepts: fn(&Event) -> bool,
    deliver: Deliver,
}

/// Fan-out of published events into subscriber mailboxes
///
/// Delivery is synchronous and in registration order, so events from one
/// publisher reach each subscriber in publish order.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.read().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Subscription>> {
        self.subscriptions.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Route events from `sources` into `mailbox`
    pub fn subscribe<M>(&self, sources: &[ManagerId], mailbox: Mailbox<M>)
    where
        M: From<Event> + Send + 'static,
    {
        self.subscribe_filtered(sources, |_| true, mailbox);
    }

    /// Route events from `sources` that pass `accepts` into `mailbox`
    pub fn subscribe_filtered<M>(
        &self,
        sources: &[ManagerId],
        accepts: fn(&Event) -> bool,
        mailbox: Mailbox<M>,
    ) where
        M: From<Event> + Send + 'static,
    {
        let subscription = Subscription {
            name: mailbox.name(),
            sources: sources.to_vec(),
            accepts,
            deliver: Box::new(move |event| mailbox.post(M::from(event))),
        };

        self.subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(subscription);
    }

    /// Deliver `event` to every subscriber of its source
    pub fn publish(&self, event: impl Into<Event>) {
        let event = event.into();
        let source = event.source();

        let subscriptions = self.read();
        let interested = subscriptions
            .iter()
            .filter(|s| s.sources.contains(&source) && (s.accepts)(&event));
        for subscription in interested {
            debug!("{} -> {}: {:?}", source.name(), subscription.name, event);
            (subscription.deliver)(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{GpsEvent, ModemEvent};

    #[test]
    fn test_publish_reaches_interested_subscribers_only() {
        let bus = EventBus::new();
        let gps_listener: Mailbox<Event> = Mailbox::new("gps-listener", 8);
        let modem_listener: Mailbox<Event> = Mailbox::new("modem-listener", 8);
        bus.subscribe(&[ManagerId::Gps], gps_listener.clone());
        bus.subscribe(&[ManagerId::Modem], modem_listener.clone());

        bus.publish(GpsEvent::Timeout);

        assert!(matches!(gps_listener.try_recv(), Some(Event::Gps(GpsEvent::Timeout))));
        assert!(modem_listener.is_empty());
    }

    #[test]
    fn test_per_publisher_order_is_preserved() {
        let bus = EventBus::new();
        let listener: Mailbox<Event> = Mailbox::new("listener", 8);
        bus.subscribe(&[ManagerId::Modem], listener.clone());

        bus.publish(ModemEvent::LteConnecting);
        bus.publish(ModemEvent::LteConnected);
        bus.publish(ModemEvent::DateTimeObtained);

        let received: Vec<Event> = std::iter::from_fn(|| listener.try_recv()).collect();
        assert!(matches!(
            received.as_slice(),
            [
                Event::Modem(ModemEvent::LteConnecting),
                Event::Modem(ModemEvent::LteConnected),
                Event::Modem(ModemEvent::DateTimeObtained),
            ]
        ));
    }

    #[test]
    fn test_each_subscriber_receives_once() {
        let bus = EventBus::new();
        let listener: Mailbox<Event> = Mailbox::new("listener", 8);
        bus.subscribe(&[ManagerId::Gps, ManagerId::Modem], listener.clone());

        bus.publish(GpsEvent::Active);
        assert_eq!(listener.len(), 1);
    }

    #[test]
    fn test_filtered_subscription_skips_rejected_events() {
        let bus = EventBus::new();
        let listener: Mailbox<Event> = Mailbox::new("listener", 8);
        bus.subscribe_filtered(&[ManagerId::Gps], Event::is_shutdown_ready, listener.clone());

        bus.publish(GpsEvent::Active);
        bus.publish(GpsEvent::Timeout);
        bus.publish(GpsEvent::ShutdownReady);

        assert!(matches!(listener.try_recv(), Some(Event::Gps(GpsEvent::ShutdownReady))));
        assert!(listener.is_empty());
    }
}
