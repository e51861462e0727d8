//! # GPS Manager
//!
//! Drives the GPS receiver on behalf of collection cycles.
//!
//! States: `Init` until the first configuration arrives, then `Running`
//! with sub-states `Idle` and `Search`. A search is started when a cycle
//! requests GPS data and ends on a fix, a timeout or shutdown.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::collab::{ClockSource, GpsDriver, GpsDriverEvent, GpsFix};
use crate::data::{DataType, GpsSample};
use crate::events::{AppEvent, CloudEvent, DataEvent, Event, GpsEvent, ManagerId, UtilEvent};
use crate::manager::{EventBus, EventSink, Mailbox, Manager};

/// Messages handled by the GPS manager
#[derive(Debug)]
pub enum GpsMessage {
    Event(Event),
    Driver(GpsDriverEvent),
}

impl From<Event> for GpsMessage {
    fn from(event: Event) -> Self {
        GpsMessage::Event(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsSubState {
    Idle,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsState {
    Init,
    Running(GpsSubState),
}

pub struct GpsManager {
    bus: Arc<EventBus>,
    mailbox: Mailbox<GpsMessage>,
    driver: Box<dyn GpsDriver>,
    clock: Arc<dyn ClockSource>,
    state: GpsState,
    timeout: Duration,
}

impl GpsManager {
    pub fn new(
        bus: Arc<EventBus>,
        mailbox: Mailbox<GpsMessage>,
        driver: Box<dyn GpsDriver>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            bus,
            mailbox,
            driver,
            clock,
            state: GpsState::Init,
            timeout: Duration::ZERO,
        }
    }

    pub fn state(&self) -> GpsState {
        self.state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn on_init(&mut self, message: GpsMessage) -> GpsState {
        match message {
            GpsMessage::Event(Event::Data(DataEvent::ConfigInit(config))) => {
                self.timeout = Duration::from_secs(u64::from(config.gps_timeout_s));
                info!("GPS timeout set to {} s", config.gps_timeout_s);
                GpsState::Running(GpsSubState::Idle)
            }
            _ => GpsState::Init,
        }
    }

    fn on_running(&mut self, sub_state: GpsSubState, message: GpsMessage) -> GpsSubState {
        match (sub_state, message) {
            (_, GpsMessage::Event(Event::Data(DataEvent::ConfigReady(config)))) => {
                self.timeout = Duration::from_secs(u64::from(config.gps_timeout_s));
                debug!("GPS timeout updated to {} s", config.gps_timeout_s);
                sub_state
            }
            (GpsSubState::Idle, GpsMessage::Event(Event::App(AppEvent::DataGet { types, .. }))) => {
                if !types.contains(&DataType::Gps) {
                    return GpsSubState::Idle;
                }
                self.start_search()
            }
            (GpsSubState::Search, GpsMessage::Event(Event::App(AppEvent::DataGet { types, .. }))) => {
                if types.contains(&DataType::Gps) {
                    warn!("GPS search already in progress, data request ignored");
                }
                GpsSubState::Search
            }
            (GpsSubState::Search, GpsMessage::Driver(GpsDriverEvent::Fix(fix))) => {
                self.on_fix(fix);
                self.stop_search()
            }
            (GpsSubState::Search, GpsMessage::Driver(GpsDriverEvent::Timeout)) => {
                info!("GPS search timed out");
                self.bus.publish(GpsEvent::Timeout);
                self.stop_search()
            }
            (_, GpsMessage::Driver(GpsDriverEvent::AgpsNeeded(request))) => {
                debug!("AGPS data requested: {:?}", request.types);
                self.bus.publish(GpsEvent::AgpsNeeded(request));
                sub_state
            }
            (_, GpsMessage::Driver(GpsDriverEvent::Error(reason))) => {
                self.bus.publish(GpsEvent::Error(reason));
                sub_state
            }
            (_, GpsMessage::Event(Event::Cloud(CloudEvent::AgpsDataReceived(data)))) => {
                if let Err(e) = self.driver.process_agps(&data) {
                    warn!("Failed to process AGPS data: {}", e);
                }
                sub_state
            }
            (GpsSubState::Idle, GpsMessage::Driver(event)) => {
                debug!("Ignoring {:?} while idle", event);
                GpsSubState::Idle
            }
            _ => sub_state,
        }
    }

    fn start_search(&mut self) -> GpsSubState {
        match self.driver.start(self.timeout) {
            Ok(()) => {
                info!("GPS search started, timeout {} s", self.timeout.as_secs());
                self.bus.publish(GpsEvent::Active);
                GpsSubState::Search
            }
            Err(e) => {
                self.bus.publish(GpsEvent::Error(format!("failed to start GPS: {}", e)));
                GpsSubState::Idle
            }
        }
    }

    fn stop_search(&mut self) -> GpsSubState {
        if let Err(e) = self.driver.stop() {
            warn!("Failed to stop GPS: {}", e);
        }
        self.bus.publish(GpsEvent::Inactive);
        GpsSubState::Idle
    }

    fn on_fix(&mut self, fix: GpsFix) {
        if let Err(e) = self.clock.set_utc(fix.datetime) {
            warn!("Failed to set time from GPS fix: {}", e);
        }

        let sample = GpsSample {
            longitude: fix.longitude,
            latitude: fix.latitude,
            accuracy: fix.accuracy,
            altitude: fix.altitude,
            speed: fix.speed,
            heading: fix.heading,
            timestamp: self.clock.monotonic_ms(),
            queued: true,
        };

        info!("GPS fix: lat {:.6}, lng {:.6}", sample.latitude, sample.longitude);
        self.bus.publish(GpsEvent::DataReady(sample));
    }
}

impl Manager for GpsManager {
    type Message = GpsMessage;
    const ID: ManagerId = ManagerId::Gps;
    const SUBSCRIPTIONS: &'static [ManagerId] =
        &[ManagerId::App, ManagerId::Data, ManagerId::Cloud, ManagerId::Util];

    fn start(&mut self) {
        let sink = EventSink::new(self.mailbox.clone(), GpsMessage::Driver);
        if let Err(e) = self.driver.init(sink) {
            self.bus.publish(GpsEvent::Error(format!("GPS init failed: {}", e)));
        }
    }

    fn handle(&mut self, message: GpsMessage) {
        if let GpsMessage::Event(Event::Util(UtilEvent::ShutdownRequest)) = message {
            if self.state == GpsState::Running(GpsSubState::Search) {
                self.state = GpsState::Running(self.stop_search());
            }
            self.bus.publish(GpsEvent::ShutdownReady);
            return;
        }

        self.state = match self.state {
            GpsState::Init => self.on_init(message),
            GpsState::Running(sub_state) => GpsState::Running(self.on_running(sub_state, message)),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::clock::mocks::ManualClock;
    use crate::collab::gps::{AgpsRequest, MockGpsDriver};
    use crate::device_config::DeviceConfig;
    use crate::manager::testing::{drain, tap};
    use chrono::{TimeZone, Utc};

    fn event(event: impl Into<Event>) -> GpsMessage {
        GpsMessage::Event(event.into())
    }

    fn data_get(types: Vec<DataType>) -> GpsMessage {
        event(AppEvent::DataGet { types, timeout: Duration::from_secs(70) })
    }

    fn fix() -> GpsFix {
        GpsFix {
            latitude: 63.42,
            longitude: 10.43,
            altitude: 50.0,
            accuracy: 3.5,
            speed: 1.2,
            heading: 90.0,
            datetime: Utc.with_ymd_and_hms(2021, 6, 1, 8, 30, 0).unwrap(),
        }
    }

    fn setup(driver: MockGpsDriver) -> (GpsManager, Mailbox<Event>, Arc<ManualClock>) {
        let bus = Arc::new(EventBus::new());
        let tap = tap(&bus);
        let clock = Arc::new(ManualClock::default());
        let manager = GpsManager::new(
            bus,
            Mailbox::new("gps", 10),
            Box::new(driver),
            clock.clone(),
        );
        (manager, tap, clock)
    }

    fn running(driver: MockGpsDriver) -> (GpsManager, Mailbox<Event>, Arc<ManualClock>) {
        let (mut manager, tap, clock) = setup(driver);
        manager.handle(event(DataEvent::ConfigInit(DeviceConfig::default())));
        drain(&tap);
        (manager, tap, clock)
    }

    #[test]
    fn test_init_waits_for_config() {
        let (mut manager, _tap, _clock) = setup(MockGpsDriver::new());

        manager.handle(data_get(vec![DataType::Gps]));
        assert_eq!(manager.state(), GpsState::Init);

        let config = DeviceConfig { gps_timeout_s: 45, ..Default::default() };
        manager.handle(event(DataEvent::ConfigInit(config)));
        assert_eq!(manager.state(), GpsState::Running(GpsSubState::Idle));
        assert_eq!(manager.timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_data_request_starts_search_with_configured_timeout() {
        let mut driver = MockGpsDriver::new();
        driver
            .expect_start()
            .withf(|timeout| *timeout == Duration::from_secs(60))
            .times(1)
            .returning(|_| Ok(()));
        let (mut manager, tap, _clock) = running(driver);

        manager.handle(data_get(vec![DataType::Gps, DataType::Modem]));

        assert_eq!(manager.state(), GpsState::Running(GpsSubState::Search));
        assert!(matches!(drain(&tap).as_slice(), [Event::Gps(GpsEvent::Active)]));
    }

    #[test]
    fn test_request_without_gps_is_ignored() {
        let (mut manager, tap, _clock) = running(MockGpsDriver::new());
        manager.handle(data_get(vec![DataType::Battery]));
        assert_eq!(manager.state(), GpsState::Running(GpsSubState::Idle));
        assert!(drain(&tap).is_empty());
    }

    #[test]
    fn test_second_request_while_searching_does_not_restart() {
        let mut driver = MockGpsDriver::new();
        driver.expect_start().times(1).returning(|_| Ok(()));
        let (mut manager, _tap, _clock) = running(driver);

        manager.handle(data_get(vec![DataType::Gps]));
        manager.handle(data_get(vec![DataType::Gps]));
        assert_eq!(manager.state(), GpsState::Running(GpsSubState::Search));
    }

    #[test]
    fn test_fix_publishes_sample_and_sets_time() {
        let mut driver = MockGpsDriver::new();
        driver.expect_start().returning(|_| Ok(()));
        driver.expect_stop().times(1).returning(|| Ok(()));
        let (mut manager, tap, clock) = running(driver);
        clock.set_now(12_000);

        manager.handle(data_get(vec![DataType::Gps]));
        drain(&tap);
        manager.handle(GpsMessage::Driver(GpsDriverEvent::Fix(fix())));

        assert_eq!(manager.state(), GpsState::Running(GpsSubState::Idle));
        assert_eq!(clock.utc_updates.lock().unwrap().as_slice(), &[fix().datetime]);

        let events = drain(&tap);
        match events.as_slice() {
            [Event::Gps(GpsEvent::DataReady(sample)), Event::Gps(GpsEvent::Inactive)] => {
                assert_eq!(sample.latitude, 63.42);
                assert_eq!(sample.timestamp, 12_000);
                assert!(sample.queued);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_timeout_publishes_timeout() {
        let mut driver = MockGpsDriver::new();
        driver.expect_start().returning(|_| Ok(()));
        driver.expect_stop().times(1).returning(|| Ok(()));
        let (mut manager, tap, _clock) = running(driver);

        manager.handle(data_get(vec![DataType::Gps]));
        drain(&tap);
        manager.handle(GpsMessage::Driver(GpsDriverEvent::Timeout));

        assert_eq!(manager.state(), GpsState::Running(GpsSubState::Idle));
        assert!(matches!(
            drain(&tap).as_slice(),
            [Event::Gps(GpsEvent::Timeout), Event::Gps(GpsEvent::Inactive)]
        ));
    }

    #[test]
    fn test_start_failure_reports_error() {
        let mut driver = MockGpsDriver::new();
        driver
            .expect_start()
            .returning(|_| Err(crate::error::TrackerError::Driver("busy".to_string())));
        let (mut manager, tap, _clock) = running(driver);

        manager.handle(data_get(vec![DataType::Gps]));
        assert_eq!(manager.state(), GpsState::Running(GpsSubState::Idle));
        assert!(matches!(drain(&tap).as_slice(), [Event::Gps(GpsEvent::Error(_))]));
    }

    #[test]
    fn test_config_ready_updates_timeout() {
        let (mut manager, _tap, _clock) = running(MockGpsDriver::new());
        let config = DeviceConfig { gps_timeout_s: 180, ..Default::default() };
        manager.handle(event(DataEvent::ConfigReady(config)));
        assert_eq!(manager.timeout(), Duration::from_secs(180));
    }

    #[test]
    fn test_agps_request_and_data_are_forwarded() {
        let mut driver = MockGpsDriver::new();
        driver
            .expect_process_agps()
            .withf(|data| *data == [1u8, 2, 3])
            .times(1)
            .returning(|_| Ok(()));
        let (mut manager, tap, _clock) = running(driver);

        let request = AgpsRequest { types: vec![1, 3] };
        manager.handle(GpsMessage::Driver(GpsDriverEvent::AgpsNeeded(request.clone())));
        manager.handle(event(CloudEvent::AgpsDataReceived(bytes::Bytes::from_static(&[1, 2, 3]))));

        assert!(matches!(
            drain(&tap).as_slice(),
            [Event::Gps(GpsEvent::AgpsNeeded(r))] if *r == request
        ));
    }

    #[test]
    fn test_shutdown_stops_search_and_acknowledges() {
        let mut driver = MockGpsDriver::new();
        driver.expect_start().returning(|_| Ok(()));
        driver.expect_stop().times(1).returning(|| Ok(()));
        let (mut manager, tap, _clock) = running(driver);

        manager.handle(data_get(vec![DataType::Gps]));
        drain(&tap);
        manager.handle(event(UtilEvent::ShutdownRequest));

        let events = drain(&tap);
        assert!(matches!(events.last(), Some(Event::Gps(GpsEvent::ShutdownReady))));
    }
}
