//! The six telemetry buffers owned by the data manager and the record of
//! which entries a publish consumed.

use super::{AccelBuffer, BatteryBuffer, GpsBuffer, ModemBuffer, SensorBuffer, UiBuffer};

/// Identifies one of the six buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Gps,
    Environmentals,
    Modem,
    Ui,
    Accelerometer,
    Battery,
}

/// All buffers, moved as one unit between the data manager and the cloud manager
#[derive(Debug, Clone, Default)]
pub struct TelemetryBuffers {
    pub gps: GpsBuffer,
    pub sensor: SensorBuffer,
    pub modem: ModemBuffer,
    pub ui: UiBuffer,
    pub accel: AccelBuffer,
    pub battery: BatteryBuffer,
}

impl TelemetryBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every entry listed in `consumed` as published
    ///
    /// # Returns
    ///
    /// * `usize` - Number of entries that were still queued
    pub fn apply(&mut self, consumed: &Consumed) -> usize {
        consumed
            .iter()
            .filter(|&(kind, index)| match kind {
                DataKind::Gps => self.gps.consume(index),
                DataKind::Environmentals => self.sensor.consume(index),
                DataKind::Modem => self.modem.consume(index),
                DataKind::Ui => self.ui.consume(index),
                DataKind::Accelerometer => self.accel.consume(index),
                DataKind::Battery => self.battery.consume(index),
            })
            .count()
    }

    /// Total number of queued entries across all buffers
    pub fn queued_count(&self) -> usize {
        self.gps.queued_count()
            + self.sensor.queued_count()
            + self.modem.queued_count()
            + self.ui.queued_count()
            + self.accel.queued_count()
            + self.battery.queued_count()
    }
}

/// Buffer entries that were encoded and published
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consumed {
    entries: Vec<(DataKind, usize)>,
}

impl Consumed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: DataKind, index: usize) {
        if !self.contains(kind, index) {
            self.entries.push((kind, index));
        }
    }

    pub fn contains(&self, kind: DataKind, index: usize) -> bool {
        self.entries.contains(&(kind, index))
    }

    pub fn extend(&mut self, other: Consumed) {
        for (kind, index) in other.entries {
            self.push(kind, index);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (DataKind, usize)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
