//! # Cloud Manager
//!
//! Keeps the broker session up and publishes everything the tracker
//! reports.
//!
//! This module handles:
//! - Connecting once LTE is up, with exponential backoff between attempts
//! - Debouncing the transport's ready notifications into one `Connected`
//! - Polling and decoding inbound configuration and AGPS payloads
//! - Encoding and publishing lent buffers, button presses, configuration
//!   and AGPS requests
//!
//! States: `LteDisconnected`, and `LteConnected` with sub-states
//! `CloudDisconnected` and `CloudConnected`.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::buffer::{Consumed, DataKind, TelemetryBuffers};
use crate::codec::CloudCodec;
use crate::collab::{AgpsRequest, BootConfirm, ClockSource, CloudTransport, LinkEvent, Topic};
use crate::config::{CloudConfig, BACKOFF_TABLE_LEN};
use crate::data::UiSample;
use crate::device_config::DeviceConfig;
use crate::error::CodecError;
use crate::events::{CloudEvent, DataEvent, Event, GpsEvent, ManagerId, ModemEvent, UtilEvent};
use crate::manager::{EventBus, EventSink, Mailbox, Manager, Timer};

/// Delay before each connection attempt, indexed by the retry count
pub const BACKOFF_DELAYS_S: [u64; BACKOFF_TABLE_LEN] = [
    32, 64, 128, 256, 512, 2048, 4096, 8192, 16384, 32768, 65536, 131072, 262144, 524288, 1048576,
];

/// Messages handled by the cloud manager
#[derive(Debug)]
pub enum CloudMessage {
    Event(Event),
    Link(LinkEvent),
    /// Connection attempt due
    Connect,
    /// Ready notifications settled
    Ready,
    /// Time to check for inbound payloads
    Poll,
}

impl From<Event> for CloudMessage {
    fn from(event: Event) -> Self {
        CloudMessage::Event(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudSubState {
    CloudDisconnected,
    CloudConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudState {
    LteDisconnected,
    LteConnected(CloudSubState),
}

/// Collaborators used by the cloud manager
pub struct CloudLinks {
    pub transport: Box<dyn CloudTransport>,
    pub codec: Box<dyn CloudCodec>,
    pub boot: Box<dyn BootConfirm>,
    pub clock: Arc<dyn ClockSource>,
}

pub struct CloudManager {
    bus: Arc<EventBus>,
    mailbox: Mailbox<CloudMessage>,
    transport: Box<dyn CloudTransport>,
    codec: Box<dyn CloudCodec>,
    boot: Box<dyn BootConfirm>,
    clock: Arc<dyn ClockSource>,
    config: CloudConfig,
    state: CloudState,
    retries: usize,
    image_confirmed: bool,
    static_modem_sent: bool,
    connect_timer: Timer<CloudMessage>,
    ready_timer: Timer<CloudMessage>,
    poll_timer: Timer<CloudMessage>,
}

impl CloudManager {
    pub fn new(
        bus: Arc<EventBus>,
        mailbox: Mailbox<CloudMessage>,
        links: CloudLinks,
        config: CloudConfig,
    ) -> Self {
        Self {
            bus,
            connect_timer: Timer::new(mailbox.clone()),
            ready_timer: Timer::new(mailbox.clone()),
            poll_timer: Timer::new(mailbox.clone()),
            mailbox,
            transport: links.transport,
            codec: links.codec,
            boot: links.boot,
            clock: links.clock,
            config,
            state: CloudState::LteDisconnected,
            retries: 0,
            image_confirmed: false,
            static_modem_sent: false,
        }
    }

    pub fn state(&self) -> CloudState {
        self.state
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    fn cancel_timers(&mut self) {
        self.connect_timer.cancel();
        self.ready_timer.cancel();
        self.poll_timer.cancel();
    }

    fn connect(&mut self) {
        if self.retries > self.config.connect_retries {
            error!("Too many failed cloud connection attempts");
            self.bus.publish(CloudEvent::Error(format!(
                "cloud connection failed after {} attempts",
                self.retries
            )));
            return;
        }

        let delay = BACKOFF_DELAYS_S
            .get(self.retries)
            .copied()
            .unwrap_or(BACKOFF_DELAYS_S[BACKOFF_TABLE_LEN - 1]);
        self.retries += 1;

        info!("Connecting to cloud, attempt {}", self.retries);
        self.bus.publish(CloudEvent::Connecting);

        match self.transport.connect() {
            Ok(()) => self.confirm_image(),
            Err(e) => warn!("Cloud connection failed: {}", e),
        }

        // Cancelled once the session is ready
        debug!("Next connection check in {} s", delay);
        self.connect_timer.arm(Duration::from_secs(delay), CloudMessage::Connect);
    }

    fn confirm_image(&mut self) {
        if self.image_confirmed {
            return;
        }
        match self.boot.confirm() {
            Ok(()) => {
                info!("Running image confirmed");
                self.image_confirmed = true;
            }
            Err(e) => warn!("Failed to confirm running image: {}", e),
        }
    }

    fn on_connected(&mut self) {
        info!("Cloud connected");
        self.retries = 0;
        self.connect_timer.cancel();
        self.static_modem_sent = false;

        // Ask for the current shadow
        self.send(Topic::StateGet, Bytes::new());
        self.poll_timer.arm(self.config.poll_interval(), CloudMessage::Poll);
    }

    fn on_link_lost(&mut self, was_connected: bool) {
        info!("Cloud session lost, reconnecting");
        self.ready_timer.cancel();
        self.poll_timer.cancel();
        if was_connected {
            self.bus.publish(CloudEvent::Disconnected);
        }
        self.connect_timer.arm(Duration::ZERO, CloudMessage::Connect);
    }

    fn send(&mut self, topic: Topic, payload: Bytes) -> bool {
        let len = payload.len();
        match self.transport.send(topic, payload) {
            Ok(()) => {
                debug!("Published {} bytes to {}", len, topic.path(&self.config.client_id));
                true
            }
            Err(e) => {
                warn!("Publish to {} failed: {}", topic.path(&self.config.client_id), e);
                false
            }
        }
    }

    fn poll(&mut self) {
        while let Some(payload) = self.transport.poll_inbound() {
            self.on_inbound(&payload);
        }
        self.poll_timer.arm(self.config.poll_interval(), CloudMessage::Poll);
    }

    fn on_inbound(&mut self, payload: &[u8]) {
        let config_error = match self.codec.decode_config(payload) {
            Ok(delta) if delta.is_empty() => {
                debug!("Configuration without known fields ignored");
                return;
            }
            Ok(delta) => {
                debug!("Configuration received: {:?}", delta);
                self.bus.publish(CloudEvent::ConfigReceived(delta));
                return;
            }
            Err(e) => e,
        };

        if self.config.agps_enabled {
            match self.codec.decode_agps(payload) {
                Ok(data) => {
                    debug!("AGPS data received, {} bytes", data.len());
                    self.bus.publish(CloudEvent::AgpsDataReceived(data));
                    return;
                }
                Err(e) => debug!("Inbound payload is not AGPS data: {}", e),
            }
        }

        warn!("Unhandled inbound payload ({} bytes): {}", payload.len(), config_error);
    }

    /// Publish the lent buffers and report what was consumed
    fn publish_data(&mut self, buffers: &TelemetryBuffers) -> Consumed {
        let mut consumed = Consumed::new();
        let include_static_modem = !self.static_modem_sent;

        match self.codec.encode_data(buffers, self.clock.as_ref(), include_static_modem) {
            Ok(encoded) => {
                let with_modem = encoded
                    .consumed
                    .iter()
                    .any(|(kind, _)| kind == DataKind::Modem);
                if self.send(Topic::StateUpdate, encoded.payload) {
                    consumed.extend(encoded.consumed);
                    if include_static_modem && with_modem {
                        self.static_modem_sent = true;
                    }
                }
            }
            Err(CodecError::NoData) => debug!("No head entries queued"),
            Err(e) => warn!("Failed to encode data: {}", e),
        }

        match self.codec.encode_batch(buffers, self.clock.as_ref(), &consumed) {
            Ok(encoded) => {
                if self.send(Topic::Batch, encoded.payload) {
                    consumed.extend(encoded.consumed);
                }
            }
            Err(CodecError::NoData) => debug!("No batch entries queued"),
            Err(e) => warn!("Failed to encode batch: {}", e),
        }

        consumed
    }

    fn publish_ui(&mut self, sample: &UiSample) {
        match self.codec.encode_ui(sample, self.clock.as_ref()) {
            Ok(payload) => {
                self.send(Topic::Messages, payload);
            }
            Err(e) => warn!("Failed to encode button data: {}", e),
        }
    }

    fn publish_config(&mut self, config: &DeviceConfig) {
        match self.codec.encode_config(config) {
            Ok(payload) => {
                self.send(Topic::StateUpdate, payload);
            }
            Err(e) => warn!("Failed to encode configuration: {}", e),
        }
    }

    fn request_agps(&mut self, request: &AgpsRequest) {
        if !self.config.agps_enabled {
            debug!("AGPS disabled, request dropped");
            return;
        }
        match self.codec.encode_agps_request(request) {
            Ok(payload) => {
                self.send(Topic::AgpsRequest, payload);
            }
            Err(e) => warn!("Failed to encode AGPS request: {}", e),
        }
    }

    fn on_lte_disconnected(&mut self, message: CloudMessage) -> CloudState {
        match message {
            CloudMessage::Event(Event::Modem(ModemEvent::LteConnected)) => {
                info!("LTE connected, scheduling cloud connection");
                self.connect_timer.arm(Duration::ZERO, CloudMessage::Connect);
                CloudState::LteConnected(CloudSubState::CloudDisconnected)
            }
            CloudMessage::Event(Event::Data(DataEvent::DataSend(_))) => {
                self.bus.publish(CloudEvent::SharedDataDone(Consumed::new()));
                CloudState::LteDisconnected
            }
            _ => CloudState::LteDisconnected,
        }
    }

    fn on_cloud_disconnected(&mut self, message: CloudMessage) -> CloudSubState {
        match message {
            CloudMessage::Connect => {
                self.connect();
                CloudSubState::CloudDisconnected
            }
            CloudMessage::Link(LinkEvent::Ready) => {
                self.ready_timer.arm(self.config.ready_debounce(), CloudMessage::Ready);
                CloudSubState::CloudDisconnected
            }
            CloudMessage::Ready => {
                self.bus.publish(CloudEvent::Connected);
                CloudSubState::CloudDisconnected
            }
            CloudMessage::Event(Event::Cloud(CloudEvent::Connected)) => {
                self.on_connected();
                CloudSubState::CloudConnected
            }
            CloudMessage::Link(LinkEvent::Disconnected) => {
                self.on_link_lost(false);
                CloudSubState::CloudDisconnected
            }
            CloudMessage::Event(Event::Data(DataEvent::DataSend(_))) => {
                debug!("Cloud not connected, data kept for the next cycle");
                self.bus.publish(CloudEvent::SharedDataDone(Consumed::new()));
                CloudSubState::CloudDisconnected
            }
            _ => CloudSubState::CloudDisconnected,
        }
    }

    fn on_cloud_connected(&mut self, message: CloudMessage) -> CloudSubState {
        match message {
            CloudMessage::Poll => {
                self.poll();
                CloudSubState::CloudConnected
            }
            CloudMessage::Link(LinkEvent::Disconnected) => {
                self.on_link_lost(true);
                CloudSubState::CloudDisconnected
            }
            CloudMessage::Event(Event::Data(DataEvent::DataSend(buffers))) => {
                let consumed = self.publish_data(&buffers);
                // Release the snapshot before handing the buffers back
                drop(buffers);
                self.bus.publish(CloudEvent::SharedDataDone(consumed));
                CloudSubState::CloudConnected
            }
            CloudMessage::Event(Event::Data(DataEvent::UiDataSend(sample))) => {
                self.publish_ui(&sample);
                CloudSubState::CloudConnected
            }
            CloudMessage::Event(Event::Data(DataEvent::ConfigSend(config))) => {
                self.publish_config(&config);
                CloudSubState::CloudConnected
            }
            CloudMessage::Event(Event::Gps(GpsEvent::AgpsNeeded(request))) => {
                self.request_agps(&request);
                CloudSubState::CloudConnected
            }
            _ => CloudSubState::CloudConnected,
        }
    }
}

impl Manager for CloudManager {
    type Message = CloudMessage;
    const ID: ManagerId = ManagerId::Cloud;
    const SUBSCRIPTIONS: &'static [ManagerId] = &[
        ManagerId::Cloud,
        ManagerId::Data,
        ManagerId::Gps,
        ManagerId::Modem,
        ManagerId::Util,
    ];

    fn start(&mut self) {
        let link = EventSink::new(self.mailbox.clone(), CloudMessage::Link);
        self.transport.register(link);
    }

    fn handle(&mut self, message: CloudMessage) {
        match message {
            CloudMessage::Event(Event::Util(UtilEvent::ShutdownRequest)) => {
                self.cancel_timers();
                self.transport.disconnect();
                self.bus.publish(CloudEvent::ShutdownReady);
                return;
            }
            CloudMessage::Link(LinkEvent::FotaDone) => {
                info!("Firmware update downloaded");
                self.bus.publish(CloudEvent::FotaDone);
                return;
            }
            _ => {}
        }

        self.state = match (self.state, message) {
            (CloudState::LteConnected(sub_state), CloudMessage::Event(Event::Modem(ModemEvent::LteDisconnected))) => {
                info!("LTE disconnected");
                self.cancel_timers();
                self.retries = 0;
                if sub_state == CloudSubState::CloudConnected {
                    self.transport.disconnect();
                    self.bus.publish(CloudEvent::Disconnected);
                }
                CloudState::LteDisconnected
            }
            (CloudState::LteDisconnected, message) => self.on_lte_disconnected(message),
            (CloudState::LteConnected(CloudSubState::CloudDisconnected), message) => {
                CloudState::LteConnected(self.on_cloud_disconnected(message))
            }
            (CloudState::LteConnected(CloudSubState::CloudConnected), message) => {
                CloudState::LteConnected(self.on_cloud_connected(message))
            }
        };
    }
}
