//! # Sensor Manager
//!
//! Samples the environmental sensor for collection cycles and forwards
//! accelerometer triggers as movement events.
//!
//! States: `Init` until the first configuration arrives, then `Running`.
//! Accelerometer triggers are handled in every state.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::collab::{Accelerometer, ClockSource, EnvironmentSensor};
use crate::data::{AccelSample, DataType, SensorSample};
use crate::error::Result;
use crate::events::{AppEvent, DataEvent, Event, ManagerId, SensorEvent, UtilEvent};
use crate::manager::{EventBus, EventSink, Mailbox, Manager};

/// Messages handled by the sensor manager
#[derive(Debug)]
pub enum SensorMessage {
    Event(Event),
    /// Accelerometer trigger reading
    Trigger([f64; 3]),
}

impl From<Event> for SensorMessage {
    fn from(event: Event) -> Self {
        SensorMessage::Event(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    Init,
    Running,
}

pub struct SensorManager {
    bus: Arc<EventBus>,
    mailbox: Mailbox<SensorMessage>,
    environment: Option<Box<dyn EnvironmentSensor>>,
    accelerometer: Box<dyn Accelerometer>,
    clock: Arc<dyn ClockSource>,
    dwell: Duration,
    last_accepted: Option<Instant>,
    state: SensorState,
}

impl SensorManager {
    /// # Arguments
    ///
    /// * `environment` - Temperature/humidity sensor, `None` on boards without one
    /// * `dwell` - Minimum time between accepted accelerometer triggers
    pub fn new(
        bus: Arc<EventBus>,
        mailbox: Mailbox<SensorMessage>,
        environment: Option<Box<dyn EnvironmentSensor>>,
        accelerometer: Box<dyn Accelerometer>,
        clock: Arc<dyn ClockSource>,
        dwell: Duration,
    ) -> Self {
        Self {
            bus,
            mailbox,
            environment,
            accelerometer,
            clock,
            dwell,
            last_accepted: None,
            state: SensorState::Init,
        }
    }

    pub fn state(&self) -> SensorState {
        self.state
    }

    fn apply_threshold(&mut self, threshold: u32) {
        if threshold == 0 {
            info!("Movement trigger disabled");
        } else {
            debug!("Movement threshold set to {}", threshold);
        }

        if let Err(e) = self.accelerometer.set_threshold(threshold) {
            warn!("Failed to set movement threshold: {}", e);
        }
    }

    fn on_trigger(&mut self, values: [f64; 3]) {
        let now = Instant::now();
        if let Some(last) = self.last_accepted {
            if now.duration_since(last) < self.dwell {
                debug!("Movement trigger within dwell time, dropped");
                return;
            }
        }
        self.last_accepted = Some(now);

        self.bus.publish(SensorEvent::MovementDataReady(AccelSample {
            values,
            timestamp: self.clock.monotonic_ms(),
            queued: true,
        }));
    }

    fn sample_environment(&mut self) {
        let timestamp = self.clock.monotonic_ms();

        let Some(sensor) = self.environment.as_mut() else {
            // Still answer so the cycle completes
            self.bus.publish(SensorEvent::EnvironmentalDataReady(SensorSample {
                timestamp,
                queued: false,
                ..Default::default()
            }));
            return;
        };

        let reading: Result<(f64, f64)> = sensor
            .temperature()
            .and_then(|temperature| Ok((temperature, sensor.humidity()?)));

        match reading {
            Ok((temperature, humidity)) => {
                self.bus.publish(SensorEvent::EnvironmentalDataReady(SensorSample {
                    temperature,
                    humidity,
                    timestamp,
                    queued: true,
                }))
            }
            Err(e) => warn!("Failed to sample environmental sensor: {}", e),
        }
    }
}

impl Manager for SensorManager {
    type Message = SensorMessage;
    const ID: ManagerId = ManagerId::Sensor;
    const SUBSCRIPTIONS: &'static [ManagerId] = &[ManagerId::App, ManagerId::Data, ManagerId::Util];

    fn start(&mut self) {
        let sink = EventSink::new(self.mailbox.clone(), SensorMessage::Trigger);
        if let Err(e) = self.accelerometer.init(sink) {
            self.bus.publish(SensorEvent::Error(format!("accelerometer init failed: {}", e)));
        }
    }

    fn handle(&mut self, message: SensorMessage) {
        let event = match message {
            SensorMessage::Trigger(values) => return self.on_trigger(values),
            SensorMessage::Event(event) => event,
        };

        if let Event::Util(UtilEvent::ShutdownRequest) = event {
            self.bus.publish(SensorEvent::ShutdownReady);
            return;
        }

        self.state = match (self.state, event) {
            (SensorState::Init, Event::Data(DataEvent::ConfigInit(config))) => {
                self.apply_threshold(config.movement_threshold);
                SensorState::Running
            }
            (SensorState::Running, Event::Data(DataEvent::ConfigReady(config))) => {
                self.apply_threshold(config.movement_threshold);
                SensorState::Running
            }
            (SensorState::Running, Event::App(AppEvent::DataGet { types, .. })) => {
                if types.contains(&DataType::Environmentals) {
                    self.sample_environment();
                }
                SensorState::Running
            }
            (state, _) => state,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::clock::mocks::ManualClock;
    use crate::collab::sensor::{MockAccelerometer, MockEnvironmentSensor};
    use crate::device_config::DeviceConfig;
    use crate::error::TrackerError;
    use crate::manager::testing::{drain, tap};

    fn setup(
        environment: Option<MockEnvironmentSensor>,
        accelerometer: MockAccelerometer,
    ) -> (SensorManager, Mailbox<Event>) {
        let bus = Arc::new(EventBus::new());
        let tap = tap(&bus);
        let clock = Arc::new(ManualClock::default());
        clock.set_now(5_000);
        let manager = SensorManager::new(
            bus,
            Mailbox::new("sensor", 10),
            environment.map(|sensor| Box::new(sensor) as Box<dyn EnvironmentSensor>),
            Box::new(accelerometer),
            clock,
            Duration::from_secs(1),
        );
        (manager, tap)
    }

    fn event(event: impl Into<Event>) -> SensorMessage {
        SensorMessage::Event(event.into())
    }

    fn env_request() -> SensorMessage {
        event(AppEvent::DataGet {
            types: vec![DataType::Environmentals],
            timeout: Duration::from_secs(5),
        })
    }

    #[test]
    fn test_init_applies_threshold_from_config() {
        let mut accelerometer = MockAccelerometer::new();
        accelerometer.expect_set_threshold().withf(|t| *t == 100).times(1).returning(|_| Ok(()));
        let (mut manager, _tap) = setup(None, accelerometer);

        manager.handle(event(DataEvent::ConfigInit(DeviceConfig::default())));
        assert_eq!(manager.state(), SensorState::Running);
    }

    #[test]
    fn test_zero_threshold_disables_trigger() {
        let mut accelerometer = MockAccelerometer::new();
        accelerometer.expect_set_threshold().withf(|t| *t == 100).returning(|_| Ok(()));
        accelerometer.expect_set_threshold().withf(|t| *t == 0).times(1).returning(|_| Ok(()));
        let (mut manager, _tap) = setup(None, accelerometer);

        manager.handle(event(DataEvent::ConfigInit(DeviceConfig::default())));
        let config = DeviceConfig { movement_threshold: 0, ..Default::default() };
        manager.handle(event(DataEvent::ConfigReady(config)));
        assert_eq!(manager.state(), SensorState::Running);
    }

    #[test]
    fn test_environment_sample() {
        let mut environment = MockEnvironmentSensor::new();
        environment.expect_temperature().returning(|| Ok(22.5));
        environment.expect_humidity().returning(|| Ok(48.0));
        let mut accelerometer = MockAccelerometer::new();
        accelerometer.expect_set_threshold().returning(|_| Ok(()));
        let (mut manager, tap) = setup(Some(environment), accelerometer);

        manager.handle(env_request());
        assert!(drain(&tap).is_empty(), "requests before init are ignored");

        manager.handle(event(DataEvent::ConfigInit(DeviceConfig::default())));
        manager.handle(env_request());

        match drain(&tap).as_slice() {
            [Event::Sensor(SensorEvent::EnvironmentalDataReady(sample))] => {
                assert_eq!(sample.temperature, 22.5);
                assert_eq!(sample.humidity, 48.0);
                assert_eq!(sample.timestamp, 5_000);
                assert!(sample.queued);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_missing_environment_sensor_answers_unqueued() {
        let mut accelerometer = MockAccelerometer::new();
        accelerometer.expect_set_threshold().returning(|_| Ok(()));
        let (mut manager, tap) = setup(None, accelerometer);

        manager.handle(event(DataEvent::ConfigInit(DeviceConfig::default())));
        manager.handle(env_request());

        assert!(matches!(
            drain(&tap).as_slice(),
            [Event::Sensor(SensorEvent::EnvironmentalDataReady(sample))] if !sample.queued
        ));
    }

    #[test]
    fn test_environment_failure_is_logged_only() {
        let mut environment = MockEnvironmentSensor::new();
        environment
            .expect_temperature()
            .returning(|| Err(TrackerError::Driver("i2c".to_string())));
        let mut accelerometer = MockAccelerometer::new();
        accelerometer.expect_set_threshold().returning(|_| Ok(()));
        let (mut manager, tap) = setup(Some(environment), accelerometer);

        manager.handle(event(DataEvent::ConfigInit(DeviceConfig::default())));
        manager.handle(env_request());
        assert!(drain(&tap).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_dwell_time_throttles_movement() {
        let (mut manager, tap) = setup(None, MockAccelerometer::new());

        manager.handle(SensorMessage::Trigger([0.1, 9.8, -2.0]));
        tokio::time::advance(Duration::from_millis(500)).await;
        manager.handle(SensorMessage::Trigger([0.2, 9.7, -2.1]));
        tokio::time::advance(Duration::from_millis(600)).await;
        manager.handle(SensorMessage::Trigger([3.0, 1.0, 0.0]));

        let movements: Vec<AccelSample> = drain(&tap)
            .into_iter()
            .filter_map(|e| match e {
                Event::Sensor(SensorEvent::MovementDataReady(sample)) => Some(sample),
                _ => None,
            })
            .collect();

        assert_eq!(movements.len(), 2, "trigger inside the dwell window is dropped");
        assert_eq!(movements[0].values, [0.1, 9.8, -2.0]);
        assert_eq!(movements[1].values, [3.0, 1.0, 0.0]);
        assert_eq!(manager.state(), SensorState::Init, "triggers are handled before init");
    }

    #[test]
    fn test_shutdown_acknowledged() {
        let (mut manager, tap) = setup(None, MockAccelerometer::new());
        manager.handle(event(UtilEvent::ShutdownRequest));
        assert!(matches!(drain(&tap).as_slice(), [Event::Sensor(SensorEvent::ShutdownReady)]));
    }
}
