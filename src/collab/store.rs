//! Persistent storage of the device configuration.

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::device_config::DeviceConfig;
use crate::error::{Result, TrackerError};

/// Settings key under which the device configuration blob is stored
pub const SETTINGS_KEY: &str = "data_manager/config";

/// Storage for the device configuration
#[cfg_attr(test, mockall::automock)]
pub trait ConfigStore: Send {
    /// Persisted configuration, or `None` if nothing was stored yet
    fn load(&mut self) -> Result<Option<DeviceConfig>>;

    fn save(&mut self, config: &DeviceConfig) -> Result<()>;
}

/// JSON settings file holding one entry per settings key
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_settings(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&contents)? {
            Value::Object(settings) => Ok(settings),
            _ => Err(TrackerError::Store(format!(
                "{} does not contain a settings object",
                self.path.display()
            ))),
        }
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&mut self) -> Result<Option<DeviceConfig>> {
        let mut settings = self.read_settings()?;
        match settings.remove(SETTINGS_KEY) {
            Some(blob) => Ok(Some(serde_json::from_value(blob)?)),
            None => Ok(None),
        }
    }

    fn save(&mut self, config: &DeviceConfig) -> Result<()> {
        let mut settings = self.read_settings()?;
        settings.insert(SETTINGS_KEY.to_string(), serde_json::to_value(config)?);

        fs::write(&self.path, serde_json::to_string_pretty(&Value::Object(settings))?)?;
        debug!("Device configuration stored to {}", self.path.display());
        Ok(())
    }
}
