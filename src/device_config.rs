//! # Device Configuration
//!
//! The runtime-tunable behaviour of the tracker, synchronized with the
//! cloud shadow.
//!
//! This module handles:
//! - The `DeviceConfig` record and its compiled-in defaults
//! - Partial remote updates (`ConfigDelta`)
//! - The field-level merge policy applied to incoming deltas

use serde::{Deserialize, Serialize};

/// Default GPS search timeout in seconds
pub const DEFAULT_GPS_TIMEOUT_S: u32 = 60;

/// Default device mode
pub const DEFAULT_ACTIVE_MODE: bool = true;

/// Default interval between cycles in active mode
pub const DEFAULT_ACTIVE_WAIT_S: u32 = 60;

/// Default minimum interval between movement-triggered cycles in passive mode
pub const DEFAULT_PASSIVE_WAIT_S: u32 = 60;

/// Default heartbeat interval in passive mode when no movement occurs
pub const DEFAULT_MOVEMENT_TIMEOUT_S: u32 = 3600;

/// Default accelerometer trigger threshold
pub const DEFAULT_MOVEMENT_THRESHOLD: u32 = 100;

/// Device configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Periodic sampling (true) or movement-driven sampling (false)
    pub active_mode: bool,
    pub active_wait_s: u32,
    pub passive_wait_s: u32,
    pub movement_timeout_s: u32,
    pub gps_timeout_s: u32,
    /// Accelerometer trigger threshold; 0 disables the trigger
    pub movement_threshold: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            active_mode: DEFAULT_ACTIVE_MODE,
            active_wait_s: DEFAULT_ACTIVE_WAIT_S,
            passive_wait_s: DEFAULT_PASSIVE_WAIT_S,
            movement_timeout_s: DEFAULT_MOVEMENT_TIMEOUT_S,
            gps_timeout_s: DEFAULT_GPS_TIMEOUT_S,
            movement_threshold: DEFAULT_MOVEMENT_THRESHOLD,
        }
    }
}

/// Partial configuration received from the cloud
///
/// `None` means the field was absent from the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigDelta {
    pub active_mode: Option<bool>,
    pub active_wait_s: Option<u32>,
    pub passive_wait_s: Option<u32>,
    pub movement_timeout_s: Option<u32>,
    pub gps_timeout_s: Option<u32>,
    pub movement_threshold: Option<u32>,
}

impl ConfigDelta {
    /// True when the payload carried no recognised field
    pub fn is_empty(&self) -> bool {
        *self == ConfigDelta::default()
    }
}

impl DeviceConfig {
    /// True when every wait and timeout field is positive
    pub fn is_valid(&self) -> bool {
        self.active_wait_s > 0
            && self.passive_wait_s > 0
            && self.movement_timeout_s > 0
            && self.gps_timeout_s > 0
    }

    /// Merge a remote delta into this configuration
    ///
    /// A numeric field is applied only if present, non-zero and different
    /// from the current value. Zero is the "no change" sentinel.
    /// `active_mode` is applied whenever present and different.
    ///
    /// # Returns
    ///
    /// * `bool` - True if any field changed
    pub fn apply_delta(&mut self, delta: &ConfigDelta) -> bool {
        let mut changed = false;

        if let Some(active) = delta.active_mode {
            if active != self.active_mode {
                self.active_mode = active;
                changed = true;
            }
        }

        for (current, incoming) in [
            (&mut self.active_wait_s, delta.active_wait_s),
            (&mut self.passive_wait_s, delta.passive_wait_s),
            (&mut self.movement_timeout_s, delta.movement_timeout_s),
            (&mut self.gps_timeout_s, delta.gps_timeout_s),
            (&mut self.movement_threshold, delta.movement_threshold),
        ] {
            changed |= merge_field(current, incoming);
        }

        changed
    }
}

fn merge_field(current: &mut u32, incoming: Option<u32>) -> bool {
    match incoming {
        Some(value) if value != 0 && value != *current => {
            *current = value;
            true
        }
        _ => false,
    }
}
