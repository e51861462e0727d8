//! # UI Manager
//!
//! Turns debounced button presses into button data events.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::collab::{ButtonPress, Buttons, ClockSource};
use crate::data::UiSample;
use crate::events::{Event, ManagerId, UiEvent, UtilEvent};
use crate::manager::{EventBus, EventSink, Mailbox, Manager};

/// Button reported to the cloud
pub const REPORTED_BUTTON: u8 = 1;

/// Messages handled by the UI manager
#[derive(Debug)]
pub enum UiMessage {
    Event(Event),
    Button(ButtonPress),
}

impl From<Event> for UiMessage {
    fn from(event: Event) -> Self {
        UiMessage::Event(event)
    }
}

pub struct UiManager {
    bus: Arc<EventBus>,
    mailbox: Mailbox<UiMessage>,
    buttons: Box<dyn Buttons>,
    clock: Arc<dyn ClockSource>,
    debounce: Duration,
    last_press: Option<Instant>,
}

impl UiManager {
    pub fn new(
        bus: Arc<EventBus>,
        mailbox: Mailbox<UiMessage>,
        buttons: Box<dyn Buttons>,
        clock: Arc<dyn ClockSource>,
        debounce: Duration,
    ) -> Self {
        Self {
            bus,
            mailbox,
            buttons,
            clock,
            debounce,
            last_press: None,
        }
    }

    fn on_press(&mut self, press: ButtonPress) {
        if press.button != REPORTED_BUTTON {
            debug!("Button {} pressed, not reported", press.button);
            return;
        }

        let now = Instant::now();
        if self.last_press.is_some_and(|last| now.duration_since(last) < self.debounce) {
            debug!("Button press debounced");
            return;
        }
        self.last_press = Some(now);

        info!("Button {} pressed", press.button);
        self.bus.publish(UiEvent::ButtonDataReady(UiSample {
            button: press.button,
            timestamp: self.clock.monotonic_ms(),
            queued: true,
        }));
    }
}

impl Manager for UiManager {
    type Message = UiMessage;
    const ID: ManagerId = ManagerId::Ui;
    const SUBSCRIPTIONS: &'static [ManagerId] = &[ManagerId::Util];

    fn start(&mut self) {
        let sink = EventSink::new(self.mailbox.clone(), UiMessage::Button);
        if let Err(e) = self.buttons.init(sink) {
            self.bus.publish(UiEvent::Error(format!("button init failed: {}", e)));
        }
    }

    fn handle(&mut self, message: UiMessage) {
        match message {
            UiMessage::Button(press) => self.on_press(press),
            UiMessage::Event(Event::Util(UtilEvent::ShutdownRequest)) => {
                self.bus.publish(UiEvent::ShutdownReady);
            }
            UiMessage::Event(_) => {}
        }
    }
}
