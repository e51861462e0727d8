//! # Configuration Module
//!
//! Handles loading and validating runtime configuration from TOML files.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! a working configuration.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::device_config::{self, DeviceConfig};
use crate::error::Result;

/// Length of the cloud reconnect backoff table
pub const BACKOFF_TABLE_LEN: usize = 15;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub device: DeviceDefaults,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub util: UtilConfig,
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Actor framework configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ManagerConfig {
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

/// Compiled-in device configuration used when nothing is persisted
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceDefaults {
    #[serde(default = "default_gps_timeout_s")]
    pub gps_timeout_s: u32,

    #[serde(default = "default_active_mode")]
    pub active_mode: bool,

    #[serde(default = "default_active_wait_s")]
    pub active_wait_s: u32,

    #[serde(default = "default_passive_wait_s")]
    pub passive_wait_s: u32,

    #[serde(default = "default_movement_timeout_s")]
    pub movement_timeout_s: u32,

    #[serde(default = "default_movement_threshold")]
    pub movement_threshold: u32,
}

/// Data manager configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_settings_path")]
    pub settings_path: String,

    #[serde(default = "default_sample_margin_s")]
    pub sample_margin_s: u64,
}

/// Cloud manager configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CloudConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_connect_retries")]
    pub connect_retries: usize,

    #[serde(default = "default_ready_debounce_ms")]
    pub ready_debounce_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub agps_enabled: bool,
}

/// Sensor manager configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    #[serde(default = "default_accel_dwell_s")]
    pub accel_dwell_s: u64,
}

/// UI manager configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    #[serde(default = "default_button_debounce_ms")]
    pub button_debounce_ms: u64,
}

/// Output manager configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_publish_pattern_ms")]
    pub publish_pattern_ms: u64,
}

/// Shutdown coordinator configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UtilConfig {
    #[serde(default = "default_reboot_fallback_s")]
    pub reboot_fallback_s: u64,

    #[serde(default = "default_graceful_reboot_s")]
    pub graceful_reboot_s: u64,
}

/// Modem manager configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModemConfig {
    #[serde(default)]
    pub expected_firmware: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; stdout only when unset
    #[serde(default)]
    pub file_dir: Option<String>,
}

// Default value functions
fn default_mailbox_capacity() -> usize { 10 }

fn default_gps_timeout_s() -> u32 { device_config::DEFAULT_GPS_TIMEOUT_S }
fn default_active_mode() -> bool { device_config::DEFAULT_ACTIVE_MODE }
fn default_active_wait_s() -> u32 { device_config::DEFAULT_ACTIVE_WAIT_S }
fn default_passive_wait_s() -> u32 { device_config::DEFAULT_PASSIVE_WAIT_S }
fn default_movement_timeout_s() -> u32 { device_config::DEFAULT_MOVEMENT_TIMEOUT_S }
fn default_movement_threshold() -> u32 { device_config::DEFAULT_MOVEMENT_THRESHOLD }

fn default_settings_path() -> String { "./tracker-settings.json".to_string() }
fn default_sample_margin_s() -> u64 { 10 }

fn default_client_id() -> String { "cat-tracker".to_string() }
fn default_connect_retries() -> usize { 10 }
fn default_ready_debounce_ms() -> u64 { 1000 }
fn default_poll_interval_ms() -> u64 { 1000 }

fn default_accel_dwell_s() -> u64 { 1 }

fn default_button_debounce_ms() -> u64 { 2000 }

fn default_publish_pattern_ms() -> u64 { 5000 }

fn default_reboot_fallback_s() -> u64 { 60 }
fn default_graceful_reboot_s() -> u64 { 5 }

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { mailbox_capacity: default_mailbox_capacity() }
    }
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        Self {
            gps_timeout_s: default_gps_timeout_s(),
            active_mode: default_active_mode(),
            active_wait_s: default_active_wait_s(),
            passive_wait_s: default_passive_wait_s(),
            movement_timeout_s: default_movement_timeout_s(),
            movement_threshold: default_movement_threshold(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            settings_path: default_settings_path(),
            sample_margin_s: default_sample_margin_s(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            connect_retries: default_connect_retries(),
            ready_debounce_ms: default_ready_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            agps_enabled: false,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self { accel_dwell_s: default_accel_dwell_s() }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { button_debounce_ms: default_button_debounce_ms() }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { publish_pattern_ms: default_publish_pattern_ms() }
    }
}

impl Default for UtilConfig {
    fn default() -> Self {
        Self {
            reboot_fallback_s: default_reboot_fallback_s(),
            graceful_reboot_s: default_graceful_reboot_s(),
        }
    }
}

impl DeviceDefaults {
    /// Device configuration built from these defaults
    pub fn to_device_config(&self) -> DeviceConfig {
        DeviceConfig {
            active_mode: self.active_mode,
            active_wait_s: self.active_wait_s,
            passive_wait_s: self.passive_wait_s,
            movement_timeout_s: self.movement_timeout_s,
            gps_timeout_s: self.gps_timeout_s,
            movement_threshold: self.movement_threshold,
        }
    }
}

impl CloudConfig {
    pub fn ready_debounce(&self) -> Duration {
        Duration::from_millis(self.ready_debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cat_tracker::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.manager.mailbox_capacity == 0 || self.manager.mailbox_capacity > 1024 {
            return Err(invalid("mailbox_capacity must be between 1 and 1024"));
        }

        if !self.device.to_device_config().is_valid() {
            return Err(invalid("device wait and timeout values must be greater than 0"));
        }

        if self.data.settings_path.is_empty() {
            return Err(invalid("settings_path cannot be empty"));
        }

        if self.cloud.client_id.is_empty() {
            return Err(invalid("client_id cannot be empty"));
        }

        if self.cloud.connect_retries >= BACKOFF_TABLE_LEN - 1 {
            return Err(invalid(format!(
                "connect_retries must be less than {}",
                BACKOFF_TABLE_LEN - 1
            )));
        }

        if self.cloud.poll_interval_ms == 0 || self.cloud.poll_interval_ms > 60000 {
            return Err(invalid("poll_interval_ms must be between 1 and 60000"));
        }

        if self.cloud.ready_debounce_ms > 60000 {
            return Err(invalid("ready_debounce_ms must be at most 60000"));
        }

        if self.output.publish_pattern_ms == 0 {
            return Err(invalid("publish_pattern_ms must be greater than 0"));
        }

        if self.util.reboot_fallback_s == 0 {
            return Err(invalid("reboot_fallback_s must be greater than 0"));
        }

        if self.util.graceful_reboot_s >= self.util.reboot_fallback_s {
            return Err(invalid("graceful_reboot_s must be less than reboot_fallback_s"));
        }

        Ok(())
    }
}

fn invalid<T: std::fmt::Display>(message: T) -> crate::error::TrackerError {
    crate::error::TrackerError::Config(toml::de::Error::custom(message))
}
