//! # Util Manager
//!
//! Shutdown coordinator. Turns any fatal condition into one shutdown
//! request and guarantees a reboot within a bounded time.
//!
//! A reboot request arms a fallback timer. Once every other manager has
//! acknowledged the shutdown, a shorter graceful timer takes over if it
//! fires earlier. The reboot handler runs at most once.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::collab::RebootHandler;
use crate::events::{CloudEvent, Event, ManagerId, UtilEvent};
use crate::manager::{EventBus, Mailbox, Manager, Timer};

/// Messages handled by the util manager
#[derive(Debug)]
pub enum UtilMessage {
    Event(Event),
    /// Unrecoverable fault reported from outside the managers
    FatalError(String),
    /// Reboot timer elapsed
    Reboot,
}

impl From<Event> for UtilMessage {
    fn from(event: Event) -> Self {
        UtilMessage::Event(event)
    }
}

/// Handle for reporting fatal faults to the util manager
#[derive(Debug, Clone)]
pub struct UtilHandle {
    mailbox: Mailbox<UtilMessage>,
}

impl UtilHandle {
    pub fn new(mailbox: Mailbox<UtilMessage>) -> Self {
        Self { mailbox }
    }

    pub fn fatal_error(&self, reason: impl Into<String>) {
        self.mailbox.post(UtilMessage::FatalError(reason.into()));
    }
}

pub struct UtilManager {
    bus: Arc<EventBus>,
    reboot: Box<dyn RebootHandler>,
    manager_count: usize,
    ack_count: usize,
    shutdown_requested: bool,
    rebooted: bool,
    fallback: Duration,
    graceful: Duration,
    reboot_timer: Timer<UtilMessage>,
    reboot_at: Option<Instant>,
}

impl UtilManager {
    /// # Arguments
    ///
    /// * `manager_count` - Number of managers expected to acknowledge a shutdown
    /// * `fallback` - Reboot delay when not every manager acknowledges
    /// * `graceful` - Reboot delay once every manager has acknowledged
    pub fn new(
        bus: Arc<EventBus>,
        mailbox: Mailbox<UtilMessage>,
        reboot: Box<dyn RebootHandler>,
        manager_count: usize,
        fallback: Duration,
        graceful: Duration,
    ) -> Self {
        Self {
            bus,
            reboot,
            manager_count,
            ack_count: 0,
            shutdown_requested: false,
            rebooted: false,
            fallback,
            graceful,
            reboot_timer: Timer::new(mailbox),
            reboot_at: None,
        }
    }

    pub fn ack_count(&self) -> usize {
        self.ack_count
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    fn request_reboot(&mut self, reason: &str) {
        if self.shutdown_requested {
            debug!("Reboot already requested, ignoring: {}", reason);
            return;
        }
        self.shutdown_requested = true;

        error!("Reboot requested: {}", reason);
        self.bus.publish(UtilEvent::ShutdownRequest);
        self.arm_reboot(self.fallback);
    }

    fn arm_reboot(&mut self, delay: Duration) {
        self.reboot_at = Some(Instant::now() + delay);
        self.reboot_timer.arm(delay, UtilMessage::Reboot);
    }

    fn on_ack(&mut self, source: ManagerId) {
        if !self.shutdown_requested {
            return;
        }

        self.ack_count += 1;
        debug!("{} ready for shutdown ({}/{})", source.name(), self.ack_count, self.manager_count);
        if self.ack_count < self.manager_count {
            return;
        }

        let graceful_at = Instant::now() + self.graceful;
        if self.reboot_at.is_some_and(|at| graceful_at < at) {
            info!("All managers ready, rebooting in {} s", self.graceful.as_secs());
            self.arm_reboot(self.graceful);
        }
    }

    fn do_reboot(&mut self) {
        if self.rebooted {
            return;
        }
        self.rebooted = true;
        self.reboot_at = None;

        info!("Rebooting");
        self.reboot.reboot();
    }
}

impl Manager for UtilManager {
    type Message = UtilMessage;
    const ID: ManagerId = ManagerId::Util;
    const SUBSCRIPTIONS: &'static [ManagerId] = &[
        ManagerId::App,
        ManagerId::Data,
        ManagerId::Cloud,
        ManagerId::Gps,
        ManagerId::Modem,
        ManagerId::Sensor,
        ManagerId::Ui,
        ManagerId::Output,
    ];

    fn accepts(event: &Event) -> bool {
        event.is_shutdown_ready()
            || event.error_reason().is_some()
            || matches!(event, Event::Cloud(CloudEvent::FotaDone))
    }

    fn handle(&mut self, message: UtilMessage) {
        match message {
            UtilMessage::Reboot => self.do_reboot(),
            UtilMessage::FatalError(reason) => self.request_reboot(&reason),
            UtilMessage::Event(Event::Cloud(CloudEvent::FotaDone)) => {
                self.request_reboot("firmware update ready")
            }
            UtilMessage::Event(event) if event.is_shutdown_ready() => self.on_ack(event.source()),
            UtilMessage::Event(event) => {
                if let Some(reason) = event.error_reason() {
                    let reason = format!("{} error: {}", event.source().name(), reason);
                    self.request_reboot(&reason);
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::CountingReboot;
    use super::*;
    use crate::events::{AppEvent, DataEvent, GpsEvent, ModemEvent, SensorEvent, UiEvent};
    use crate::manager::testing::{advance, drain, tap};

    const MANAGERS: usize = 3;

    fn setup() -> (UtilManager, Mailbox<UtilMessage>, CountingReboot, Mailbox<Event>) {
        let bus = Arc::new(EventBus::new());
        let tap = tap(&bus);
        let mailbox = Mailbox::new("util", 10);
        let reboot = CountingReboot::default();
        let manager = UtilManager::new(
            bus,
            mailbox.clone(),
            Box::new(reboot.clone()),
            MANAGERS,
            Duration::from_secs(60),
            Duration::from_secs(5),
        );
        (manager, mailbox, reboot, tap)
    }

    fn event(event: impl Into<Event>) -> UtilMessage {
        UtilMessage::Event(event.into())
    }

    fn acks() -> Vec<UtilMessage> {
        vec![
            event(GpsEvent::ShutdownReady),
            event(DataEvent::ShutdownReady),
            event(UiEvent::ShutdownReady),
        ]
    }

    fn shutdown_requests(tap: &Mailbox<Event>) -> usize {
        drain(tap)
            .iter()
            .filter(|e| matches!(e, Event::Util(UtilEvent::ShutdownRequest)))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_requests_shutdown_once() {
        let (mut manager, _mailbox, _reboot, tap) = setup();

        manager.handle(event(SensorEvent::Error("i2c".to_string())));
        manager.handle(event(ModemEvent::Error("uicc".to_string())));

        assert!(manager.shutdown_requested());
        assert_eq!(shutdown_requests(&tap), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acks_before_request_are_ignored() {
        let (mut manager, _mailbox, _reboot, _tap) = setup();
        for ack in acks() {
            manager.handle(ack);
        }
        assert_eq!(manager.ack_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_reboot_without_acks() {
        let (mut manager, mailbox, reboot, _tap) = setup();
        manager.handle(event(AppEvent::Error("scheduler".to_string())));

        advance(&mut manager, &mailbox, Duration::from_secs(59)).await;
        assert_eq!(reboot.count(), 0);

        advance(&mut manager, &mailbox, Duration::from_secs(1)).await;
        assert_eq!(reboot.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_acks_use_fallback() {
        let (mut manager, mailbox, reboot, _tap) = setup();
        manager.handle(UtilMessage::FatalError("watchdog".to_string()));
        let mut acks = acks();
        acks.pop();
        for ack in acks {
            manager.handle(ack);
        }

        advance(&mut manager, &mailbox, Duration::from_secs(30)).await;
        assert_eq!(reboot.count(), 0);
        advance(&mut manager, &mailbox, Duration::from_secs(30)).await;
        assert_eq!(reboot.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_reboot_after_all_acks() {
        let (mut manager, mailbox, reboot, _tap) = setup();
        manager.handle(event(CloudEvent::FotaDone));
        for ack in acks() {
            manager.handle(ack);
        }

        advance(&mut manager, &mailbox, Duration::from_secs(4)).await;
        assert_eq!(reboot.count(), 0);
        advance(&mut manager, &mailbox, Duration::from_secs(1)).await;
        assert_eq!(reboot.count(), 1);

        advance(&mut manager, &mailbox, Duration::from_secs(120)).await;
        assert_eq!(reboot.count(), 1, "reboot handler runs at most once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_acks_keep_earlier_fallback() {
        let (mut manager, mailbox, reboot, _tap) = setup();
        manager.handle(event(CloudEvent::Error("retries".to_string())));

        advance(&mut manager, &mailbox, Duration::from_secs(58)).await;
        for ack in acks() {
            manager.handle(ack);
        }

        advance(&mut manager, &mailbox, Duration::from_secs(2)).await;
        assert_eq!(reboot.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_through_handle() {
        let (mut manager, mailbox, _reboot, tap) = setup();
        let handle = UtilHandle::new(mailbox.clone());

        handle.fatal_error("stack overflow");
        for message in drain(&mailbox) {
            manager.handle(message);
        }
        assert_eq!(shutdown_requests(&tap), 1);
    }

    #[test]
    fn test_receives_only_shutdown_relevant_events() {
        let accepts = |event: Event| <UtilManager as Manager>::accepts(&event);

        assert!(accepts(GpsEvent::ShutdownReady.into()));
        assert!(accepts(ModemEvent::Error("uicc".to_string()).into()));
        assert!(accepts(CloudEvent::FotaDone.into()));
        assert!(!accepts(GpsEvent::Active.into()));
        assert!(!accepts(CloudEvent::Connected.into()));
        assert!(!accepts(ModemEvent::LteConnected.into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_burst_fits_mailbox_when_spawned() {
        let bus = Arc::new(EventBus::new());
        let mailbox = Mailbox::new("util", 10);
        let reboot = CountingReboot::default();
        let handle = UtilHandle::new(mailbox.clone());
        let task = crate::manager::spawn(
            UtilManager::new(
                Arc::clone(&bus),
                mailbox.clone(),
                Box::new(reboot.clone()),
                8,
                Duration::from_secs(60),
                Duration::from_secs(5),
            ),
            mailbox,
            &bus,
        );

        handle.fatal_error("test fault");
        tokio::time::sleep(Duration::from_millis(1)).await;
        for _ in 0..8 {
            // Chatter around each ack must not crowd the acks out
            bus.publish(GpsEvent::Active);
            bus.publish(ModemEvent::LteDisconnected);
            bus.publish(GpsEvent::ShutdownReady);
        }

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(reboot.count(), 1);
        task.abort();
    }
}
