//! # Telemetry Samples
//!
//! Raw sample types produced by the sampling managers and stored by the
//! data manager in its ring buffers.
//!
//! Every sample carries:
//! - `timestamp`: monotonic uptime in milliseconds at sampling time
//! - `queued`: true while the sample awaits publication

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data kinds that can be requested in a collection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Gps,
    Modem,
    Battery,
    Environmentals,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Gps => "GPS",
            DataType::Modem => "MODEM",
            DataType::Battery => "BATTERY",
            DataType::Environmentals => "ENVIRONMENTALS",
        };
        f.write_str(name)
    }
}

/// Position fix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsSample {
    pub longitude: f64,
    pub latitude: f64,
    /// Horizontal accuracy in meters
    pub accuracy: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub timestamp: i64,
    pub queued: bool,
}

/// Temperature and humidity reading
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSample {
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: i64,
    pub queued: bool,
}

/// Three-axis accelerometer trigger reading
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccelSample {
    pub values: [f64; 3],
    pub timestamp: i64,
    pub queued: bool,
}

impl AccelSample {
    /// Largest absolute value across the three axes
    pub fn max_axis_magnitude(&self) -> f64 {
        self.values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }
}

/// Battery voltage reading in millivolts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatterySample {
    pub voltage_mv: u16,
    pub timestamp: i64,
    pub queued: bool,
}

/// Button press
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiSample {
    pub button: u8,
    pub timestamp: i64,
    pub queued: bool,
}

/// LTE system mode the modem is attached with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetworkMode {
    #[default]
    LteM,
    NbIot,
}

/// Modem parameters, split on the wire into a static (`dev`) and a
/// dynamic (`roam`) block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModemSample {
    // Dynamic
    /// Raw RSRP index (0..=97)
    pub rsrp: u16,
    pub area_code: u32,
    pub mcc_mnc: String,
    pub cell_id: u32,
    pub ip_address: String,

    // Static
    pub band: u16,
    pub network_mode: NetworkMode,
    pub gps_enabled: bool,
    pub iccid: String,
    pub modem_firmware: String,
    pub board_version: String,
    pub app_version: String,

    pub timestamp: i64,
    pub queued: bool,
}

impl ModemSample {
    /// Network mode string as reported to the cloud
    pub fn network_mode_label(&self) -> String {
        let base = match self.network_mode {
            NetworkMode::LteM => "LTE-M",
            NetworkMode::NbIot => "NB-IoT",
        };
        if self.gps_enabled {
            format!("{} GPS", base)
        } else {
            base.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_axis_magnitude_uses_absolute_values() {
        let sample = AccelSample { values: [1.5, -7.25, 3.0], ..Default::default() };
        assert_eq!(sample.max_axis_magnitude(), 7.25);
    }

    #[test]
    fn test_network_mode_label() {
        let mut sample = ModemSample::default();
        assert_eq!(sample.network_mode_label(), "LTE-M");

        sample.network_mode = NetworkMode::NbIot;
        sample.gps_enabled = true;
        assert_eq!(sample.network_mode_label(), "NB-IoT GPS");
    }

    #[test]
    fn test_data_type_display() {
        assert_eq!(DataType::Environmentals.to_string(), "ENVIRONMENTALS");
        assert_eq!(DataType::Gps.to_string(), "GPS");
    }
}
