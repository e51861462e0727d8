//! # Data Manager
//!
//! Owns every telemetry buffer and the device configuration, and closes
//! collection cycles.
//!
//! This module handles:
//! - Loading, merging, persisting and broadcasting the device configuration
//! - Routing samples into their buffers
//! - Collection cycle bookkeeping (affirmations and deadline)
//! - Lending the buffers to the cloud manager and reclaiming them
//! - Ad hoc publication of button presses
//!
//! While the buffers are lent the data manager holds no mutable access to
//! them. Samples arriving in that window are kept aside and stored once the
//! cloud manager hands the buffers back. If the buffers are not handed back
//! within [`HANDOFF_TIMEOUT`] they are reclaimed with nothing published.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::buffer::{
    Consumed, TelemetryBuffers, ACCEL_BUFFER_MAX, BAT_BUFFER_MAX, GPS_BUFFER_MAX,
    MODEM_BUFFER_MAX, SENSOR_BUFFER_MAX, UI_BUFFER_MAX,
};
use crate::collab::ConfigStore;
use crate::data::{AccelSample, BatterySample, DataType, GpsSample, ModemSample, SensorSample, UiSample};
use crate::device_config::{ConfigDelta, DeviceConfig};
use crate::events::{
    AppEvent, CloudEvent, DataEvent, Event, GpsEvent, ManagerId, ModemEvent, SensorEvent, UiEvent,
    UtilEvent,
};
use crate::manager::{EventBus, Mailbox, Manager, Timer};

/// Time the cloud manager may hold the buffers
pub const HANDOFF_TIMEOUT: Duration = Duration::from_secs(30);

/// Samples kept aside while the buffers are lent; the oldest go first
pub const PENDING_MAX: usize = GPS_BUFFER_MAX
    + SENSOR_BUFFER_MAX
    + MODEM_BUFFER_MAX
    + UI_BUFFER_MAX
    + ACCEL_BUFFER_MAX
    + BAT_BUFFER_MAX;

/// Messages handled by the data manager
#[derive(Debug)]
pub enum DataMessage {
    Event(Event),
    /// Deadline of the cycle with the given id
    Deadline(u64),
    /// Lend with the given id was not handed back in time
    HandoffExpired(u64),
}

impl From<Event> for DataMessage {
    fn from(event: Event) -> Self {
        DataMessage::Event(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeState {
    TimeNotObtained,
    TimeObtained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected(TimeState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataState {
    /// Buffers are owned and may be populated
    NotSharingData(LinkState),
    /// Buffers are lent to the cloud manager
    SharingData(LinkState),
}

/// Where the buffers currently are
#[derive(Debug)]
enum Custody {
    Owned(TelemetryBuffers),
    Lent(Arc<TelemetryBuffers>),
}

/// A sample waiting to be stored
#[derive(Debug, Clone)]
enum Incoming {
    Gps(GpsSample),
    Sensor(SensorSample),
    Modem(ModemSample),
    Ui(UiSample),
    Accel(AccelSample),
    Battery(BatterySample),
}

/// Open collection cycle
#[derive(Debug)]
struct Cycle {
    id: u64,
    requested: Vec<DataType>,
    affirmed: Vec<DataType>,
}

impl Cycle {
    fn is_complete(&self) -> bool {
        self.requested.iter().all(|t| self.affirmed.contains(t))
    }
}

pub struct DataManager {
    bus: Arc<EventBus>,
    store: Box<dyn ConfigStore>,
    config: DeviceConfig,
    custody: Custody,
    pending: VecDeque<Incoming>,
    lend_id: u64,
    pending_send: bool,
    pending_ui: bool,
    link: LinkState,
    time_obtained: bool,
    cycle: Option<Cycle>,
    next_cycle_id: u64,
    deadline: Timer<DataMessage>,
    handoff: Timer<DataMessage>,
}

impl DataManager {
    /// # Arguments
    ///
    /// * `defaults` - Configuration used when nothing is persisted
    pub fn new(
        bus: Arc<EventBus>,
        mailbox: Mailbox<DataMessage>,
        store: Box<dyn ConfigStore>,
        defaults: DeviceConfig,
    ) -> Self {
        Self {
            bus,
            store,
            config: defaults,
            custody: Custody::Owned(TelemetryBuffers::new()),
            pending: VecDeque::new(),
            lend_id: 0,
            pending_send: false,
            pending_ui: false,
            link: LinkState::Disconnected,
            time_obtained: false,
            cycle: None,
            next_cycle_id: 0,
            deadline: Timer::new(mailbox.clone()),
            handoff: Timer::new(mailbox),
        }
    }

    pub fn state(&self) -> DataState {
        match self.custody {
            Custody::Owned(_) => DataState::NotSharingData(self.link),
            Custody::Lent(_) => DataState::SharingData(self.link),
        }
    }

    /// Samples waiting for the buffers to return
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Current buffer contents, whether owned or lent
    pub fn buffers(&self) -> &TelemetryBuffers {
        match &self.custody {
            Custody::Owned(buffers) => buffers,
            Custody::Lent(buffers) => buffers,
        }
    }

    fn load_config(&mut self) {
        match self.store.load() {
            Ok(Some(config)) if config.is_valid() => {
                info!("Device configuration loaded from storage");
                self.config = config;
            }
            Ok(Some(config)) => {
                warn!("Stored device configuration is invalid, using defaults: {:?}", config);
            }
            Ok(None) => info!("No stored device configuration, using defaults"),
            Err(e) => {
                error!("Failed to load device configuration: {}", e);
                self.bus.publish(DataEvent::Error(format!("config load failed: {}", e)));
            }
        }
        self.bus.publish(DataEvent::ConfigInit(self.config));
    }

    fn on_config_received(&mut self, delta: ConfigDelta) {
        if self.link == LinkState::Disconnected {
            debug!("Configuration delta ignored while disconnected");
            return;
        }

        if self.config.apply_delta(&delta) {
            info!("Device configuration updated: {:?}", self.config);
            if let Err(e) = self.store.save(&self.config) {
                warn!("Failed to persist device configuration: {}", e);
            }
            self.bus.publish(DataEvent::ConfigReady(self.config));
        } else {
            debug!("Configuration delta carries no change");
        }
        self.bus.publish(DataEvent::ConfigSend(self.config));
    }

    fn store(&mut self, incoming: Incoming) {
        let buffers = match &mut self.custody {
            Custody::Owned(buffers) => buffers,
            Custody::Lent(_) => {
                if self.pending.len() >= PENDING_MAX {
                    warn!("Too many samples kept aside, dropping the oldest");
                    self.pending.pop_front();
                }
                debug!("Buffers lent, sample kept aside");
                self.pending.push_back(incoming);
                return;
            }
        };

        let stored = match incoming {
            Incoming::Gps(sample) => buffers.gps.populate(sample),
            Incoming::Sensor(sample) => buffers.sensor.populate(sample),
            Incoming::Modem(sample) => buffers.modem.populate(sample),
            Incoming::Ui(sample) => buffers.ui.populate(sample),
            Incoming::Accel(sample) => buffers.accel.populate(sample),
            Incoming::Battery(sample) => buffers.battery.populate(sample),
        };
        if stored.is_none() {
            debug!("Sample not stored");
        }
    }

    fn open_cycle(&mut self, types: Vec<DataType>, timeout: std::time::Duration) {
        if let Some(cycle) = self.cycle.take() {
            warn!("Cycle {} replaced before completion", cycle.id);
        }

        let id = self.next_cycle_id;
        self.next_cycle_id += 1;
        debug!("Cycle {} started for {:?}, timeout {} s", id, types, timeout.as_secs());

        self.cycle = Some(Cycle { id, requested: types, affirmed: Vec::new() });
        if self.cycle.as_ref().is_some_and(Cycle::is_complete) {
            self.close_cycle();
            return;
        }
        self.deadline.arm(timeout, DataMessage::Deadline(id));
    }

    fn affirm(&mut self, data_type: DataType) {
        let Some(cycle) = self.cycle.as_mut() else {
            return;
        };
        if !cycle.requested.contains(&data_type) || cycle.affirmed.contains(&data_type) {
            return;
        }

        cycle.affirmed.push(data_type);
        debug!("{} affirmed ({}/{})", data_type, cycle.affirmed.len(), cycle.requested.len());
        if cycle.is_complete() {
            self.close_cycle();
        }
    }

    fn on_deadline(&mut self, id: u64) {
        match &self.cycle {
            Some(cycle) if cycle.id == id => {
                info!(
                    "Cycle deadline reached with {}/{} affirmations",
                    cycle.affirmed.len(),
                    cycle.requested.len()
                );
                self.close_cycle();
            }
            _ => debug!("Stale deadline for cycle {} ignored", id),
        }
    }

    fn close_cycle(&mut self) {
        self.deadline.cancel();
        self.cycle = None;
        self.send_data();
    }

    fn can_publish(&self) -> bool {
        self.link == LinkState::Connected(TimeState::TimeObtained)
    }

    fn send_data(&mut self) {
        if !self.can_publish() {
            debug!("Not ready to publish, data kept buffered");
            return;
        }

        let buffers = match std::mem::replace(&mut self.custody, Custody::Owned(TelemetryBuffers::new())) {
            Custody::Owned(buffers) => Arc::new(buffers),
            Custody::Lent(buffers) => {
                debug!("Buffers still lent, send postponed");
                self.custody = Custody::Lent(buffers);
                self.pending_send = true;
                return;
            }
        };

        debug!("Lending buffers, {} entries queued", buffers.queued_count());
        self.lend_id += 1;
        self.handoff.arm(HANDOFF_TIMEOUT, DataMessage::HandoffExpired(self.lend_id));
        self.custody = Custody::Lent(Arc::clone(&buffers));
        self.bus.publish(DataEvent::DataSend(buffers));
    }

    fn send_ui(&mut self) {
        if !self.can_publish() {
            debug!("Not ready to publish, button press kept buffered");
            return;
        }

        let buffers = match &mut self.custody {
            Custody::Owned(buffers) => buffers,
            Custody::Lent(_) => {
                self.pending_ui = true;
                return;
            }
        };

        let head = buffers.ui.head();
        let sample = buffers.ui.head_entry().clone();
        if sample.queued {
            buffers.ui.consume(head);
            self.bus.publish(DataEvent::UiDataSend(sample));
        }
    }

    fn on_shared_data_done(&mut self, consumed: Consumed) {
        let buffers = match std::mem::replace(&mut self.custody, Custody::Owned(TelemetryBuffers::new())) {
            Custody::Lent(buffers) => buffers,
            Custody::Owned(buffers) => {
                warn!("Buffers returned while not lent");
                self.custody = Custody::Owned(buffers);
                return;
            }
        };

        self.handoff.cancel();
        let mut buffers = Arc::try_unwrap(buffers).unwrap_or_else(|shared| (*shared).clone());
        let published = buffers.apply(&consumed);
        debug!("Buffers reclaimed, {} entries published", published);
        self.custody = Custody::Owned(buffers);

        for incoming in std::mem::take(&mut self.pending) {
            self.store(incoming);
        }

        if std::mem::take(&mut self.pending_ui) {
            self.send_ui();
        }
        if std::mem::take(&mut self.pending_send) {
            self.send_data();
        }
    }

    fn on_handoff_expired(&mut self, id: u64) {
        if id != self.lend_id || !matches!(self.custody, Custody::Lent(_)) {
            debug!("Stale hand-off expiry {} ignored", id);
            return;
        }
        warn!("Buffers not handed back in {} s, reclaiming", HANDOFF_TIMEOUT.as_secs());
        self.on_shared_data_done(Consumed::new());
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::App(AppEvent::DataGet { types, timeout }) => self.open_cycle(types, timeout),
            Event::Gps(GpsEvent::DataReady(sample)) => {
                self.store(Incoming::Gps(sample));
                self.affirm(DataType::Gps);
            }
            Event::Gps(GpsEvent::Timeout) => self.affirm(DataType::Gps),
            Event::Modem(ModemEvent::ModemDataReady(sample)) => {
                self.store(Incoming::Modem(sample));
                self.affirm(DataType::Modem);
            }
            Event::Modem(ModemEvent::BatteryDataReady(sample)) => {
                self.store(Incoming::Battery(sample));
                self.affirm(DataType::Battery);
            }
            Event::Modem(ModemEvent::DateTimeObtained) => {
                self.time_obtained = true;
                if let LinkState::Connected(_) = self.link {
                    self.link = LinkState::Connected(TimeState::TimeObtained);
                }
            }
            Event::Sensor(SensorEvent::EnvironmentalDataReady(sample)) => {
                self.store(Incoming::Sensor(sample));
                self.affirm(DataType::Environmentals);
            }
            Event::Sensor(SensorEvent::MovementDataReady(sample)) => {
                self.store(Incoming::Accel(sample));
            }
            Event::Ui(UiEvent::ButtonDataReady(sample)) => {
                self.store(Incoming::Ui(sample));
                self.send_ui();
            }
            Event::Cloud(CloudEvent::Connected) => {
                let time = if self.time_obtained {
                    TimeState::TimeObtained
                } else {
                    TimeState::TimeNotObtained
                };
                self.link = LinkState::Connected(time);
                self.bus.publish(DataEvent::ConfigSend(self.config));
            }
            Event::Cloud(CloudEvent::Disconnected) => self.link = LinkState::Disconnected,
            Event::Cloud(CloudEvent::ConfigReceived(delta)) => self.on_config_received(delta),
            Event::Cloud(CloudEvent::SharedDataDone(consumed)) => self.on_shared_data_done(consumed),
            Event::Util(UtilEvent::ShutdownRequest) => {
                self.deadline.cancel();
                self.cycle = None;
                self.bus.publish(DataEvent::ShutdownReady);
            }
            _ => {}
        }
    }
}

impl Manager for DataManager {
    type Message = DataMessage;
    const ID: ManagerId = ManagerId::Data;
    const SUBSCRIPTIONS: &'static [ManagerId] = &[
        ManagerId::App,
        ManagerId::Cloud,
        ManagerId::Gps,
        ManagerId::Modem,
        ManagerId::Sensor,
        ManagerId::Ui,
        ManagerId::Util,
    ];

    fn start(&mut self) {
        self.load_config();
    }

    fn handle(&mut self, message: DataMessage) {
        match message {
            DataMessage::Event(event) => self.on_event(event),
            DataMessage::Deadline(id) => self.on_deadline(id),
            DataMessage::HandoffExpired(id) => self.on_handoff_expired(id),
        }
    }
}
