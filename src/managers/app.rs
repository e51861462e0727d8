//! # App Manager
//!
//! Schedules collection cycles.
//!
//! States: `Init` until the first configuration arrives, then `Running`
//! with sub-states `Active` and `Passive` following the device mode.
//!
//! In active mode a cycle is requested every `active_wait_s`. In passive
//! mode movement requests a cycle, at most once per `passive_wait_s`, and a
//! heartbeat cycle is requested after `movement_timeout_s` without one.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::data::DataType;
use crate::device_config::DeviceConfig;
use crate::events::{AppEvent, DataEvent, Event, ManagerId, SensorEvent, UtilEvent};
use crate::manager::{EventBus, Mailbox, Manager, Timer};

/// Data types sampled by every cycle
pub const CYCLE_DATA_TYPES: [DataType; 4] = [
    DataType::Gps,
    DataType::Modem,
    DataType::Battery,
    DataType::Environmentals,
];

/// Messages handled by the app manager
#[derive(Debug)]
pub enum AppMessage {
    Event(Event),
    /// Periodic cycle due (active mode)
    DataGet,
    /// No movement for the heartbeat interval (passive mode)
    MovementTimeout,
}

impl From<Event> for AppMessage {
    fn from(event: Event) -> Self {
        AppMessage::Event(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppSubState {
    Active,
    Passive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Init,
    Running(AppSubState),
}

pub struct AppManager {
    bus: Arc<EventBus>,
    config: DeviceConfig,
    sample_margin: Duration,
    state: AppState,
    data_get_timer: Timer<AppMessage>,
    movement_timer: Timer<AppMessage>,
    last_cycle: Option<Instant>,
}

fn sub_state_of(config: &DeviceConfig) -> AppSubState {
    if config.active_mode {
        AppSubState::Active
    } else {
        AppSubState::Passive
    }
}

impl AppManager {
    /// # Arguments
    ///
    /// * `sample_margin` - Time added to the GPS timeout for the cycle deadline
    pub fn new(bus: Arc<EventBus>, mailbox: Mailbox<AppMessage>, sample_margin: Duration) -> Self {
        Self {
            bus,
            config: DeviceConfig::default(),
            sample_margin,
            state: AppState::Init,
            data_get_timer: Timer::new(mailbox.clone()),
            movement_timer: Timer::new(mailbox),
            last_cycle: None,
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    fn request_cycle(&mut self) {
        let timeout = Duration::from_secs(u64::from(self.config.gps_timeout_s)) + self.sample_margin;
        debug!("Requesting data, cycle timeout {} s", timeout.as_secs());

        self.last_cycle = Some(Instant::now());
        self.bus.publish(AppEvent::DataGet {
            types: CYCLE_DATA_TYPES.to_vec(),
            timeout,
        });
    }

    fn arm_data_get(&mut self) {
        let wait = Duration::from_secs(u64::from(self.config.active_wait_s));
        self.data_get_timer.arm(wait, AppMessage::DataGet);
    }

    fn arm_movement_timeout(&mut self) {
        let wait = Duration::from_secs(u64::from(self.config.movement_timeout_s));
        self.movement_timer.arm(wait, AppMessage::MovementTimeout);
    }

    /// Cancel both schedules and start the one matching `sub_state`
    fn schedule(&mut self, sub_state: AppSubState) {
        self.data_get_timer.cancel();
        self.movement_timer.cancel();
        match sub_state {
            AppSubState::Active => self.arm_data_get(),
            AppSubState::Passive => self.arm_movement_timeout(),
        }
    }

    fn on_movement(&mut self) {
        let passive_wait = Duration::from_secs(u64::from(self.config.passive_wait_s));
        if self.last_cycle.is_some_and(|last| last.elapsed() < passive_wait) {
            debug!("Movement within passive wait, no cycle");
            return;
        }

        info!("Movement detected, requesting data");
        self.request_cycle();
        self.arm_movement_timeout();
    }

    fn on_running(&mut self, sub_state: AppSubState, message: AppMessage) -> AppSubState {
        match (sub_state, message) {
            (_, AppMessage::Event(Event::Data(DataEvent::ConfigReady(config)))) => {
                self.config = config;
                let next = sub_state_of(&config);
                if next != sub_state {
                    info!("Switching to {:?} mode", next);
                }
                self.schedule(next);
                next
            }
            (AppSubState::Active, AppMessage::DataGet) => {
                self.request_cycle();
                self.arm_data_get();
                AppSubState::Active
            }
            (AppSubState::Passive, AppMessage::MovementTimeout) => {
                info!("No movement, requesting heartbeat data");
                self.request_cycle();
                self.arm_movement_timeout();
                AppSubState::Passive
            }
            (AppSubState::Passive, AppMessage::Event(Event::Sensor(SensorEvent::MovementDataReady(_)))) => {
                self.on_movement();
                AppSubState::Passive
            }
            (sub_state, _) => sub_state,
        }
    }
}

impl Manager for AppManager {
    type Message = AppMessage;
    const ID: ManagerId = ManagerId::App;
    const SUBSCRIPTIONS: &'static [ManagerId] = &[ManagerId::Data, ManagerId::Sensor, ManagerId::Util];

    fn handle(&mut self, message: AppMessage) {
        if let AppMessage::Event(Event::Util(UtilEvent::ShutdownRequest)) = message {
            self.data_get_timer.cancel();
            self.movement_timer.cancel();
            self.bus.publish(AppEvent::ShutdownReady);
            return;
        }

        self.state = match self.state {
            AppState::Init => match message {
                AppMessage::Event(Event::Data(DataEvent::ConfigInit(config))) => {
                    self.config = config;
                    let sub_state = sub_state_of(&config);
                    info!("Starting in {:?} mode", sub_state);
                    self.request_cycle();
                    self.schedule(sub_state);
                    AppState::Running(sub_state)
                }
                _ => AppState::Init,
            },
            AppState::Running(sub_state) => AppState::Running(self.on_running(sub_state, message)),
        };
    }
}
