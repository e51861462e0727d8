//! # Modem Manager
//!
//! Orchestrates the cellular modem. It keeps no super-state machine.
//!
//! This module handles:
//! - LTE registration notifications (connecting, connected, disconnected)
//! - Modem and battery samples for collection cycles
//! - A one-shot network time fetch after LTE attaches
//! - Radio power-down on shutdown

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collab::{ClockSource, DateTimeOutcome, ModemDriver, ModemDriverEvent, Registration};
use crate::data::{BatterySample, DataType, ModemSample};
use crate::events::{AppEvent, Event, ManagerId, ModemEvent, UtilEvent};
use crate::manager::{EventBus, EventSink, Mailbox, Manager};

/// Highest raw RSRP index that represents a real measurement
pub const RSRP_MAX_VALID: u16 = 97;

/// Messages handled by the modem manager
#[derive(Debug)]
pub enum ModemMessage {
    Event(Event),
    Driver(ModemDriverEvent),
}

impl From<Event> for ModemMessage {
    fn from(event: Event) -> Self {
        ModemMessage::Event(event)
    }
}

/// Progress of the network time fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeState {
    NotRequested,
    Pending,
    Obtained,
}

pub struct ModemManager {
    bus: Arc<EventBus>,
    mailbox: Mailbox<ModemMessage>,
    driver: Box<dyn ModemDriver>,
    clock: Arc<dyn ClockSource>,
    expected_firmware: Option<String>,
    lte_connected: bool,
    rsrp: u16,
    date_time: DateTimeState,
}

impl ModemManager {
    pub fn new(
        bus: Arc<EventBus>,
        mailbox: Mailbox<ModemMessage>,
        driver: Box<dyn ModemDriver>,
        clock: Arc<dyn ClockSource>,
        expected_firmware: Option<String>,
    ) -> Self {
        Self {
            bus,
            mailbox,
            driver,
            clock,
            expected_firmware,
            lte_connected: false,
            rsrp: 0,
            date_time: DateTimeState::NotRequested,
        }
    }

    pub fn is_lte_connected(&self) -> bool {
        self.lte_connected
    }

    pub fn date_time_state(&self) -> DateTimeState {
        self.date_time
    }

    pub fn rsrp(&self) -> u16 {
        self.rsrp
    }

    fn check_firmware(&mut self) {
        let Some(expected) = self.expected_firmware.as_deref() else {
            return;
        };

        match self.driver.firmware_version() {
            Ok(version) if version == expected => debug!("Modem firmware {}", version),
            Ok(version) => warn!(
                "Unexpected modem firmware version {}, expected {}",
                version, expected
            ),
            Err(e) => warn!("Failed to read modem firmware version: {}", e),
        }
    }

    fn on_registration(&mut self, registration: Registration) {
        match registration {
            Registration::Home | Registration::Roaming => {
                if self.lte_connected {
                    return;
                }
                self.lte_connected = true;
                info!("LTE connected ({:?})", registration);
                self.bus.publish(ModemEvent::LteConnected);
                self.request_date_time();
            }
            Registration::NotRegistered | Registration::Searching => {
                if !self.lte_connected {
                    return;
                }
                self.lte_connected = false;
                info!("LTE disconnected");
                self.bus.publish(ModemEvent::LteDisconnected);
            }
            Registration::UiccFailure => {
                self.bus.publish(ModemEvent::Error("UICC failure".to_string()));
            }
        }
    }

    fn request_date_time(&mut self) {
        if self.date_time != DateTimeState::NotRequested {
            return;
        }

        match self.driver.request_date_time() {
            Ok(()) => self.date_time = DateTimeState::Pending,
            Err(e) => warn!("Failed to request network time: {}", e),
        }
    }

    fn on_date_time(&mut self, outcome: DateTimeOutcome) {
        if self.date_time != DateTimeState::Pending {
            debug!("Ignoring date-time outcome {:?}", outcome);
            return;
        }

        match outcome {
            DateTimeOutcome::Obtained => {
                self.date_time = DateTimeState::Obtained;
                self.bus.publish(ModemEvent::DateTimeObtained);
            }
            DateTimeOutcome::NotObtained => {
                self.date_time = DateTimeState::NotRequested;
                warn!("Network time not obtained, retrying on next LTE attach");
            }
        }
    }

    fn on_rsrp(&mut self, rsrp: u16) {
        if rsrp > RSRP_MAX_VALID {
            return;
        }
        self.rsrp = rsrp;
        debug!("RSRP updated to {}", rsrp);
    }

    fn sample_modem(&mut self) {
        let info = match self.driver.modem_info() {
            Ok(info) => info,
            Err(e) => {
                warn!("Failed to read modem parameters: {}", e);
                return;
            }
        };

        self.bus.publish(ModemEvent::ModemDataReady(ModemSample {
            rsrp: self.rsrp,
            area_code: info.area_code,
            mcc_mnc: info.mcc_mnc,
            cell_id: info.cell_id,
            ip_address: info.ip_address,
            band: info.band,
            network_mode: info.network_mode,
            gps_enabled: info.gps_enabled,
            iccid: info.iccid,
            modem_firmware: info.modem_firmware,
            board_version: info.board_version,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: self.clock.monotonic_ms(),
            queued: true,
        }));
    }

    fn sample_battery(&mut self) {
        match self.driver.battery_voltage() {
            Ok(voltage_mv) => self.bus.publish(ModemEvent::BatteryDataReady(BatterySample {
                voltage_mv,
                timestamp: self.clock.monotonic_ms(),
                queued: true,
            })),
            Err(e) => warn!("Failed to read battery voltage: {}", e),
        }
    }
}

impl Manager for ModemManager {
    type Message = ModemMessage;
    const ID: ManagerId = ManagerId::Modem;
    const SUBSCRIPTIONS: &'static [ManagerId] = &[ManagerId::App, ManagerId::Util];

    fn start(&mut self) {
        self.check_firmware();

        let sink = EventSink::new(self.mailbox.clone(), ModemMessage::Driver);
        match self.driver.init(sink) {
            Ok(()) => self.bus.publish(ModemEvent::LteConnecting),
            Err(e) => self.bus.publish(ModemEvent::Error(format!("modem init failed: {}", e))),
        }
    }

    fn handle(&mut self, message: ModemMessage) {
        match message {
            ModemMessage::Driver(ModemDriverEvent::Registration(registration)) => {
                self.on_registration(registration)
            }
            ModemMessage::Driver(ModemDriverEvent::Rsrp(rsrp)) => self.on_rsrp(rsrp),
            ModemMessage::Driver(ModemDriverEvent::DateTime(outcome)) => self.on_date_time(outcome),
            ModemMessage::Event(Event::App(AppEvent::DataGet { types, .. })) => {
                if types.contains(&DataType::Modem) {
                    self.sample_modem();
                }
                if types.contains(&DataType::Battery) {
                    self.sample_battery();
                }
            }
            ModemMessage::Event(Event::Util(UtilEvent::ShutdownRequest)) => {
                if let Err(e) = self.driver.power_off() {
                    warn!("Failed to power off modem: {}", e);
                }
                self.bus.publish(ModemEvent::ShutdownReady);
            }
            ModemMessage::Event(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::clock::mocks::ManualClock;
    use crate::collab::modem::{MockModemDriver, ModemInfo};
    use crate::error::TrackerError;
    use crate::manager::testing::{drain, tap};
    use std::time::Duration;

    fn setup(driver: MockModemDriver, expected: Option<&str>) -> (ModemManager, Mailbox<Event>) {
        let bus = Arc::new(EventBus::new());
        let tap = tap(&bus);
        let clock = Arc::new(ManualClock::default());
        clock.set_now(777);
        let manager = ModemManager::new(
            bus,
            Mailbox::new("modem", 10),
            Box::new(driver),
            clock,
            expected.map(str::to_string),
        );
        (manager, tap)
    }

    fn registration(registration: Registration) -> ModemMessage {
        ModemMessage::Driver(ModemDriverEvent::Registration(registration))
    }

    fn data_get(types: Vec<DataType>) -> ModemMessage {
        ModemMessage::Event(Event::from(AppEvent::DataGet { types, timeout: Duration::from_secs(1) }))
    }

    #[test]
    fn test_start_reports_connecting_and_checks_firmware() {
        let mut driver = MockModemDriver::new();
        driver.expect_firmware_version().times(1).returning(|| Ok("mfw_1.0.0".to_string()));
        driver.expect_init().times(1).returning(|_| Ok(()));
        let (mut manager, tap) = setup(driver, Some("mfw_1.2.0"));

        manager.start();
        assert!(matches!(drain(&tap).as_slice(), [Event::Modem(ModemEvent::LteConnecting)]));
    }

    #[test]
    fn test_registration_transitions() {
        let mut driver = MockModemDriver::new();
        driver.expect_request_date_time().times(1).returning(|| Ok(()));
        let (mut manager, tap) = setup(driver, None);

        manager.handle(registration(Registration::Searching));
        manager.handle(registration(Registration::Home));
        manager.handle(registration(Registration::Roaming));
        assert!(manager.is_lte_connected());
        manager.handle(registration(Registration::NotRegistered));
        assert!(!manager.is_lte_connected());

        assert!(matches!(
            drain(&tap).as_slice(),
            [Event::Modem(ModemEvent::LteConnected), Event::Modem(ModemEvent::LteDisconnected)]
        ));
    }

    #[test]
    fn test_uicc_failure_is_error() {
        let (mut manager, tap) = setup(MockModemDriver::new(), None);
        manager.handle(registration(Registration::UiccFailure));
        assert!(matches!(drain(&tap).as_slice(), [Event::Modem(ModemEvent::Error(_))]));
    }

    #[test]
    fn test_date_time_is_one_shot() {
        let mut driver = MockModemDriver::new();
        driver.expect_request_date_time().times(1).returning(|| Ok(()));
        let (mut manager, tap) = setup(driver, None);

        manager.handle(registration(Registration::Home));
        assert_eq!(manager.date_time_state(), DateTimeState::Pending);
        drain(&tap);

        manager.handle(ModemMessage::Driver(ModemDriverEvent::DateTime(DateTimeOutcome::Obtained)));
        manager.handle(ModemMessage::Driver(ModemDriverEvent::DateTime(DateTimeOutcome::Obtained)));
        assert_eq!(manager.date_time_state(), DateTimeState::Obtained);
        assert!(matches!(drain(&tap).as_slice(), [Event::Modem(ModemEvent::DateTimeObtained)]));

        // Reattach does not fetch again
        manager.handle(registration(Registration::Searching));
        manager.handle(registration(Registration::Home));
    }

    #[test]
    fn test_date_time_not_obtained_retries_on_next_attach() {
        let mut driver = MockModemDriver::new();
        driver.expect_request_date_time().times(2).returning(|| Ok(()));
        let (mut manager, tap) = setup(driver, None);

        manager.handle(registration(Registration::Home));
        manager.handle(ModemMessage::Driver(ModemDriverEvent::DateTime(DateTimeOutcome::NotObtained)));
        assert_eq!(manager.date_time_state(), DateTimeState::NotRequested);

        manager.handle(registration(Registration::Searching));
        manager.handle(registration(Registration::Home));
        assert_eq!(manager.date_time_state(), DateTimeState::Pending);
        assert!(!drain(&tap).iter().any(|e| matches!(e, Event::Modem(ModemEvent::DateTimeObtained))));
    }

    #[test]
    fn test_rsrp_above_valid_range_is_ignored() {
        let (mut manager, _tap) = setup(MockModemDriver::new(), None);
        manager.handle(ModemMessage::Driver(ModemDriverEvent::Rsrp(60)));
        manager.handle(ModemMessage::Driver(ModemDriverEvent::Rsrp(255)));
        assert_eq!(manager.rsrp(), 60);
    }

    #[test]
    fn test_data_request_samples_modem_and_battery() {
        let mut driver = MockModemDriver::new();
        driver.expect_modem_info().times(1).returning(|| {
            Ok(ModemInfo {
                mcc_mnc: "24201".to_string(),
                band: 20,
                ..Default::default()
            })
        });
        driver.expect_battery_voltage().times(1).returning(|| Ok(3850));
        let (mut manager, tap) = setup(driver, None);
        manager.handle(ModemMessage::Driver(ModemDriverEvent::Rsrp(42)));

        manager.handle(data_get(vec![DataType::Modem, DataType::Battery, DataType::Gps]));

        match drain(&tap).as_slice() {
            [Event::Modem(ModemEvent::ModemDataReady(modem)), Event::Modem(ModemEvent::BatteryDataReady(battery))] => {
                assert_eq!(modem.rsrp, 42);
                assert_eq!(modem.band, 20);
                assert_eq!(modem.timestamp, 777);
                assert_eq!(modem.app_version, env!("CARGO_PKG_VERSION"));
                assert_eq!(battery.voltage_mv, 3850);
                assert!(battery.queued);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_sample_failure_is_logged_only() {
        let mut driver = MockModemDriver::new();
        driver
            .expect_battery_voltage()
            .returning(|| Err(TrackerError::Driver("adc".to_string())));
        let (mut manager, tap) = setup(driver, None);

        manager.handle(data_get(vec![DataType::Battery]));
        assert!(drain(&tap).is_empty());
    }

    #[test]
    fn test_shutdown_powers_off_before_ready() {
        let mut driver = MockModemDriver::new();
        driver.expect_power_off().times(1).returning(|| Ok(()));
        let (mut manager, tap) = setup(driver, None);

        manager.handle(ModemMessage::Event(Event::from(UtilEvent::ShutdownRequest)));
        assert!(matches!(drain(&tap).as_slice(), [Event::Modem(ModemEvent::ShutdownReady)]));
    }
}
