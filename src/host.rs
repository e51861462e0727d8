//! # Host Collaborators
//!
//! Workstation stand-ins for the device drivers, so the tracker core can be
//! run and observed without hardware.
//!
//! This module handles:
//! - A loopback cloud transport that logs every publish
//! - A simulated GPS receiver producing a fixed position
//! - A simulated modem that registers on LTE and sets the clock
//! - Fixed environmental readings, idle accelerometer and buttons
//! - LED patterns and reboots reported through the log

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collab::{
    Accelerometer, BootConfirm, ButtonPress, Buttons, ClockSource, CloudTransport,
    DateTimeOutcome, EnvironmentSensor, GpsDriver, GpsDriverEvent, GpsFix, LedOutput, LedPattern,
    LinkEvent, ModemDriver, ModemDriverEvent, ModemInfo, RebootHandler, Registration, Topic,
};
use crate::data::NetworkMode;
use crate::error::{Result, TrackerError};
use crate::manager::EventSink;

/// Time the simulated receiver needs for a fix
pub const SIMULATED_FIX_DELAY: Duration = Duration::from_secs(3);

/// Time the simulated modem needs to register
pub const SIMULATED_ATTACH_DELAY: Duration = Duration::from_secs(1);

/// Cloud transport that accepts every publish and logs it
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    client_id: String,
    link: Option<EventSink<LinkEvent>>,
    connected: bool,
}

impl LoopbackTransport {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), link: None, connected: false }
    }
}

impl CloudTransport for LoopbackTransport {
    fn register(&mut self, link: EventSink<LinkEvent>) {
        self.link = Some(link);
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        info!("Loopback session opened for {}", self.client_id);
        if let Some(link) = &self.link {
            link.send(LinkEvent::Ready);
        }
        Ok(())
    }

    fn send(&mut self, topic: Topic, payload: Bytes) -> Result<()> {
        if !self.connected {
            return Err(TrackerError::Transport("not connected".to_string()));
        }
        info!("{} <- {}", topic.path(&self.client_id), String::from_utf8_lossy(&payload));
        Ok(())
    }

    fn poll_inbound(&mut self) -> Option<Bytes> {
        None
    }

    fn disconnect(&mut self) {
        self.connected = false;
        info!("Loopback session closed");
    }
}

/// GPS receiver reporting a fixed position after a short search
#[derive(Debug, Default)]
pub struct SimulatedGps {
    events: Option<EventSink<GpsDriverEvent>>,
    search: Option<JoinHandle<()>>,
}

impl SimulatedGps {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GpsDriver for SimulatedGps {
    fn init(&mut self, events: EventSink<GpsDriverEvent>) -> Result<()> {
        self.events = Some(events);
        Ok(())
    }

    fn start(&mut self, timeout: Duration) -> Result<()> {
        let events = self
            .events
            .clone()
            .ok_or_else(|| TrackerError::Driver("GPS not initialized".to_string()))?;

        if let Some(search) = self.search.take() {
            search.abort();
        }
        self.search = Some(tokio::spawn(async move {
            if timeout < SIMULATED_FIX_DELAY {
                tokio::time::sleep(timeout).await;
                events.send(GpsDriverEvent::Timeout);
                return;
            }
            tokio::time::sleep(SIMULATED_FIX_DELAY).await;
            events.send(GpsDriverEvent::Fix(GpsFix {
                latitude: 63.421,
                longitude: 10.437,
                altitude: 42.0,
                accuracy: 5.0,
                speed: 0.0,
                heading: 0.0,
                datetime: Utc::now(),
            }));
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(search) = self.search.take() {
            search.abort();
        }
        Ok(())
    }

    fn process_agps(&mut self, data: &[u8]) -> Result<()> {
        debug!("Ignoring {} bytes of AGPS data", data.len());
        Ok(())
    }
}

/// Modem that registers on LTE shortly after init and obtains network time
/// from the host clock
pub struct SimulatedModem {
    clock: Arc<dyn ClockSource>,
    events: Option<EventSink<ModemDriverEvent>>,
}

impl SimulatedModem {
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        Self { clock, events: None }
    }
}

impl ModemDriver for SimulatedModem {
    fn init(&mut self, events: EventSink<ModemDriverEvent>) -> Result<()> {
        self.events = Some(events.clone());
        tokio::spawn(async move {
            tokio::time::sleep(SIMULATED_ATTACH_DELAY).await;
            events.send(ModemDriverEvent::Registration(Registration::Searching));
            events.send(ModemDriverEvent::Rsrp(60));
            events.send(ModemDriverEvent::Registration(Registration::Home));
        });
        Ok(())
    }

    fn modem_info(&mut self) -> Result<ModemInfo> {
        Ok(ModemInfo {
            area_code: 33131,
            mcc_mnc: "24201".to_string(),
            cell_id: 34237196,
            ip_address: "10.81.183.99".to_string(),
            band: 20,
            network_mode: NetworkMode::LteM,
            gps_enabled: true,
            iccid: "8931080019073497795".to_string(),
            modem_firmware: "mfw_nrf9160_1.3.0".to_string(),
            board_version: "host".to_string(),
        })
    }

    fn battery_voltage(&mut self) -> Result<u16> {
        Ok(3_900)
    }

    fn request_date_time(&mut self) -> Result<()> {
        let events = self
            .events
            .as_ref()
            .ok_or_else(|| TrackerError::Driver("modem not initialized".to_string()))?;

        let outcome = match self.clock.set_utc(Utc::now()) {
            Ok(()) => DateTimeOutcome::Obtained,
            Err(e) => {
                warn!("Failed to set clock: {}", e);
                DateTimeOutcome::NotObtained
            }
        };
        events.send(ModemDriverEvent::DateTime(outcome));
        Ok(())
    }

    fn firmware_version(&mut self) -> Result<String> {
        Ok("mfw_nrf9160_1.3.0".to_string())
    }

    fn power_off(&mut self) -> Result<()> {
        info!("Modem powered off");
        Ok(())
    }
}

/// Environmental sensor returning fixed readings
#[derive(Debug, Clone, Copy)]
pub struct FixedEnvironment {
    pub temperature: f64,
    pub humidity: f64,
}

impl Default for FixedEnvironment {
    fn default() -> Self {
        Self { temperature: 21.5, humidity: 45.0 }
    }
}

impl EnvironmentSensor for FixedEnvironment {
    fn temperature(&mut self) -> Result<f64> {
        Ok(self.temperature)
    }

    fn humidity(&mut self) -> Result<f64> {
        Ok(self.humidity)
    }
}

/// Accelerometer that never triggers
#[derive(Debug, Default)]
pub struct IdleAccelerometer;

impl Accelerometer for IdleAccelerometer {
    fn init(&mut self, _triggers: EventSink<[f64; 3]>) -> Result<()> {
        Ok(())
    }

    fn set_threshold(&mut self, threshold: u32) -> Result<()> {
        debug!("Accelerometer threshold {}", threshold);
        Ok(())
    }
}

/// Buttons that are never pressed
#[derive(Debug, Default)]
pub struct IdleButtons;

impl Buttons for IdleButtons {
    fn init(&mut self, _presses: EventSink<ButtonPress>) -> Result<()> {
        Ok(())
    }
}

/// LED driver writing patterns to the log
#[derive(Debug, Default)]
pub struct LogLeds;

impl LedOutput for LogLeds {
    fn set_pattern(&mut self, pattern: LedPattern) -> Result<()> {
        info!("LED: {:?}", pattern);
        Ok(())
    }
}

/// Boot confirmation with nothing to confirm
#[derive(Debug, Default)]
pub struct HostBootConfirm;

impl BootConfirm for HostBootConfirm {
    fn confirm(&mut self) -> Result<()> {
        debug!("No boot image to confirm on host");
        Ok(())
    }
}

/// Reboot handler that wakes whoever waits on the shared `Notify`
#[derive(Debug, Clone, Default)]
pub struct HostReboot {
    requested: Arc<Notify>,
}

impl HostReboot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once a reboot was requested
    pub async fn requested(&self) {
        self.requested.notified().await
    }
}

impl RebootHandler for HostReboot {
    fn reboot(&mut self) {
        info!("Reboot requested, stopping");
        self.requested.notify_one();
    }
}
