//! # Output Manager
//!
//! Renders the tracker status on the LEDs.
//!
//! This module handles:
//! - The base pattern derived from the device mode and GPS activity
//! - The temporary publishing pattern shown after each data send
//! - The LTE connecting indication
//! - The fault indication once shutdown has been requested

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::collab::{LedOutput, LedPattern};
use crate::events::{DataEvent, Event, GpsEvent, ManagerId, ModemEvent, OutputEvent, UtilEvent};
use crate::manager::{EventBus, Mailbox, Manager, Timer};

/// Messages handled by the output manager
#[derive(Debug)]
pub enum OutputMessage {
    Event(Event),
    /// Publishing indication elapsed
    Revert,
}

impl From<Event> for OutputMessage {
    fn from(event: Event) -> Self {
        OutputMessage::Event(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Active,
    Passive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsActivity {
    GpsActive,
    GpsInactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Init,
    Running { mode: DeviceMode, gps: GpsActivity },
    Error,
}

pub struct OutputManager {
    bus: Arc<EventBus>,
    leds: Box<dyn LedOutput>,
    revert: Timer<OutputMessage>,
    publish_pattern: Duration,
    publishing: bool,
    state: OutputState,
}

fn mode_of(active_mode: bool) -> DeviceMode {
    if active_mode {
        DeviceMode::Active
    } else {
        DeviceMode::Passive
    }
}

impl OutputManager {
    /// # Arguments
    ///
    /// * `publish_pattern` - How long the publishing pattern stays on
    pub fn new(
        bus: Arc<EventBus>,
        mailbox: Mailbox<OutputMessage>,
        leds: Box<dyn LedOutput>,
        publish_pattern: Duration,
    ) -> Self {
        Self {
            bus,
            leds,
            revert: Timer::new(mailbox),
            publish_pattern,
            publishing: false,
            state: OutputState::Init,
        }
    }

    pub fn state(&self) -> OutputState {
        self.state
    }

    fn render(&mut self, pattern: LedPattern) {
        debug!("LED pattern {:?}", pattern);
        if let Err(e) = self.leds.set_pattern(pattern) {
            warn!("Failed to set LED pattern: {}", e);
        }
    }

    fn render_base(&mut self, mode: DeviceMode, gps: GpsActivity) {
        if self.publishing {
            return;
        }
        let pattern = match (gps, mode) {
            (GpsActivity::GpsActive, _) => LedPattern::GpsSearching,
            (GpsActivity::GpsInactive, DeviceMode::Active) => LedPattern::ActiveMode,
            (GpsActivity::GpsInactive, DeviceMode::Passive) => LedPattern::PassiveMode,
        };
        self.render(pattern);
    }

    fn on_running(&mut self, mode: DeviceMode, gps: GpsActivity, message: OutputMessage) -> OutputState {
        let (mode, gps) = match message {
            OutputMessage::Revert => {
                self.publishing = false;
                (mode, gps)
            }
            OutputMessage::Event(Event::Data(DataEvent::ConfigReady(config))) => {
                (mode_of(config.active_mode), gps)
            }
            OutputMessage::Event(Event::Gps(GpsEvent::Active)) => (mode, GpsActivity::GpsActive),
            OutputMessage::Event(Event::Gps(GpsEvent::Inactive)) => (mode, GpsActivity::GpsInactive),
            OutputMessage::Event(Event::Data(DataEvent::DataSend(_) | DataEvent::UiDataSend(_))) => {
                self.render(LedPattern::CloudPublishing);
                self.publishing = true;
                self.revert.arm(self.publish_pattern, OutputMessage::Revert);
                return OutputState::Running { mode, gps };
            }
            OutputMessage::Event(Event::Modem(ModemEvent::LteConnecting)) => {
                self.render(LedPattern::LteConnecting);
                return OutputState::Running { mode, gps };
            }
            OutputMessage::Event(_) => return OutputState::Running { mode, gps },
        };

        self.render_base(mode, gps);
        OutputState::Running { mode, gps }
    }
}

impl Manager for OutputManager {
    type Message = OutputMessage;
    const ID: ManagerId = ManagerId::Output;
    const SUBSCRIPTIONS: &'static [ManagerId] =
        &[ManagerId::Data, ManagerId::Gps, ManagerId::Modem, ManagerId::Util];

    fn handle(&mut self, message: OutputMessage) {
        if let OutputMessage::Event(Event::Util(UtilEvent::ShutdownRequest)) = message {
            self.revert.cancel();
            self.publishing = false;
            self.render(LedPattern::SystemFault);
            self.state = OutputState::Error;
            self.bus.publish(OutputEvent::ShutdownReady);
            return;
        }

        self.state = match self.state {
            OutputState::Init => match message {
                OutputMessage::Event(Event::Data(DataEvent::ConfigInit(config))) => {
                    let mode = mode_of(config.active_mode);
                    self.render_base(mode, GpsActivity::GpsInactive);
                    OutputState::Running { mode, gps: GpsActivity::GpsInactive }
                }
                OutputMessage::Event(Event::Modem(ModemEvent::LteConnecting)) => {
                    self.render(LedPattern::LteConnecting);
                    OutputState::Init
                }
                _ => OutputState::Init,
            },
            OutputState::Running { mode, gps } => self.on_running(mode, gps, message),
            OutputState::Error => OutputState::Error,
        };
    }
}

#[cfg(test)]
pub mod mocks {
    //! Recording LED driver

    use super::*;
    use crate::error::Result;
    use std::sync::Mutex;

    #[derive(Default, Clone)]
    pub struct RecordingLeds {
        pub patterns: Arc<Mutex<Vec<LedPattern>>>,
    }

    impl RecordingLeds {
        pub fn last(&self) -> Option<LedPattern> {
            self.patterns.lock().unwrap().last().copied()
        }
    }

    impl LedOutput for RecordingLeds {
        fn set_pattern(&mut self, pattern: LedPattern) -> Result<()> {
            self.patterns.lock().unwrap().push(pattern);
            Ok(())
        }
    }
}
