//! # Tracker Wiring
//!
//! Builds every manager from the runtime configuration and its
//! collaborators, subscribes them on the bus and spawns them.
//!
//! The data manager is spawned last: its start-up publishes the boot
//! configuration, which every other manager must already be subscribed to.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::codec::CloudCodec;
use crate::collab::{
    Accelerometer, BootConfirm, Buttons, ClockSource, CloudTransport, ConfigStore,
    EnvironmentSensor, GpsDriver, LedOutput, ModemDriver, RebootHandler,
};
use crate::config::Config;
use crate::manager::{self, EventBus, Mailbox};
use crate::managers::{
    AppManager, CloudLinks, CloudManager, DataManager, GpsManager, ModemManager, OutputManager,
    SensorManager, UiManager, UtilHandle, UtilManager,
};

/// Managers that acknowledge a shutdown request (all but the util manager)
pub const SHUTDOWN_ACK_COUNT: usize = 8;

/// Everything outside the tracker core
pub struct Collaborators {
    pub transport: Box<dyn CloudTransport>,
    pub codec: Box<dyn CloudCodec>,
    pub boot: Box<dyn BootConfirm>,
    pub gps: Box<dyn GpsDriver>,
    pub modem: Box<dyn ModemDriver>,
    /// `None` on boards without an environmental sensor
    pub environment: Option<Box<dyn EnvironmentSensor>>,
    pub accelerometer: Box<dyn Accelerometer>,
    pub buttons: Box<dyn Buttons>,
    pub leds: Box<dyn LedOutput>,
    pub store: Box<dyn ConfigStore>,
    pub reboot: Box<dyn RebootHandler>,
    pub clock: Arc<dyn ClockSource>,
}

/// Running tracker
pub struct Tracker {
    util: UtilHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl Tracker {
    /// Spawn every manager onto the current tokio runtime
    ///
    /// # Arguments
    ///
    /// * `config` - Validated runtime configuration
    /// * `bus` - Event bus the managers publish on
    /// * `collab` - Drivers and services used by the managers
    pub fn spawn(config: &Config, bus: Arc<EventBus>, collab: Collaborators) -> Self {
        let capacity = config.manager.mailbox_capacity;
        let clock = collab.clock;
        let mut tasks = Vec::with_capacity(SHUTDOWN_ACK_COUNT + 1);

        let util_mailbox = Mailbox::new("util", capacity.max(SHUTDOWN_ACK_COUNT + 2));
        let util = UtilHandle::new(util_mailbox.clone());
        tasks.push(manager::spawn(
            UtilManager::new(
                Arc::clone(&bus),
                util_mailbox.clone(),
                collab.reboot,
                SHUTDOWN_ACK_COUNT,
                Duration::from_secs(config.util.reboot_fallback_s),
                Duration::from_secs(config.util.graceful_reboot_s),
            ),
            util_mailbox,
            &bus,
        ));

        let app_mailbox = Mailbox::new("app", capacity);
        tasks.push(manager::spawn(
            AppManager::new(
                Arc::clone(&bus),
                app_mailbox.clone(),
                Duration::from_secs(config.data.sample_margin_s),
            ),
            app_mailbox,
            &bus,
        ));

        let cloud_mailbox = Mailbox::new("cloud", capacity);
        let links = CloudLinks {
            transport: collab.transport,
            codec: collab.codec,
            boot: collab.boot,
            clock: Arc::clone(&clock),
        };
        tasks.push(manager::spawn(
            CloudManager::new(Arc::clone(&bus), cloud_mailbox.clone(), links, config.cloud.clone()),
            cloud_mailbox,
            &bus,
        ));

        let gps_mailbox = Mailbox::new("gps", capacity);
        tasks.push(manager::spawn(
            GpsManager::new(Arc::clone(&bus), gps_mailbox.clone(), collab.gps, Arc::clone(&clock)),
            gps_mailbox,
            &bus,
        ));

        let modem_mailbox = Mailbox::new("modem", capacity);
        tasks.push(manager::spawn(
            ModemManager::new(
                Arc::clone(&bus),
                modem_mailbox.clone(),
                collab.modem,
                Arc::clone(&clock),
                config.modem.expected_firmware.clone(),
            ),
            modem_mailbox,
            &bus,
        ));

        let sensor_mailbox = Mailbox::new("sensor", capacity);
        tasks.push(manager::spawn(
            SensorManager::new(
                Arc::clone(&bus),
                sensor_mailbox.clone(),
                collab.environment,
                collab.accelerometer,
                Arc::clone(&clock),
                Duration::from_secs(config.sensor.accel_dwell_s),
            ),
            sensor_mailbox,
            &bus,
        ));

        let ui_mailbox = Mailbox::new("ui", capacity);
        tasks.push(manager::spawn(
            UiManager::new(
                Arc::clone(&bus),
                ui_mailbox.clone(),
                collab.buttons,
                Arc::clone(&clock),
                Duration::from_millis(config.ui.button_debounce_ms),
            ),
            ui_mailbox,
            &bus,
        ));

        let output_mailbox = Mailbox::new("output", capacity);
        tasks.push(manager::spawn(
            OutputManager::new(
                Arc::clone(&bus),
                output_mailbox.clone(),
                collab.leds,
                Duration::from_millis(config.output.publish_pattern_ms),
            ),
            output_mailbox,
            &bus,
        ));

        let data_mailbox = Mailbox::new("data", capacity);
        tasks.push(manager::spawn(
            DataManager::new(
                Arc::clone(&bus),
                data_mailbox.clone(),
                collab.store,
                config.device.to_device_config(),
            ),
            data_mailbox,
            &bus,
        ));

        info!("{} managers started", tasks.len());
        Self { util, tasks }
    }

    /// Handle for reporting fatal faults
    pub fn util(&self) -> UtilHandle {
        self.util.clone()
    }

    /// Stop every manager task
    pub fn abort(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}
