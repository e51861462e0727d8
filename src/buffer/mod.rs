//! # Telemetry Ring Buffers
//!
//! Fixed-capacity buffers holding samples until they are published.
//!
//! This module handles:
//! - The generic `TelemetryBuffer` with a pluggable population policy
//! - Plain ring (FIFO) population for GPS, sensor, modem, UI and battery data
//! - Magnitude-priority population for accelerometer data
//! - Head tracking and the `queued` consumption protocol
//!
//! The complete set of buffers owned by the data manager lives in [`set`].

pub mod set;

use std::marker::PhantomData;

use crate::data::{AccelSample, BatterySample, GpsSample, ModemSample, SensorSample, UiSample};

pub use set::{Consumed, DataKind, TelemetryBuffers};

/// Number of GPS entries retained while offline
pub const GPS_BUFFER_MAX: usize = 10;

/// Number of environmental entries retained while offline
pub const SENSOR_BUFFER_MAX: usize = 10;

/// Number of modem entries retained while offline
pub const MODEM_BUFFER_MAX: usize = 10;

/// Number of button entries retained while offline
pub const UI_BUFFER_MAX: usize = 10;

/// Number of accelerometer entries retained while offline
pub const ACCEL_BUFFER_MAX: usize = 3;

/// Number of battery entries retained while offline
pub const BAT_BUFFER_MAX: usize = 10;

/// Common view over every sample type stored in a buffer
pub trait Sample: Clone + Default {
    /// Whether the sample still awaits publication
    fn is_queued(&self) -> bool;

    /// Set or clear the queued flag
    fn set_queued(&mut self, queued: bool);

    /// Monotonic uptime (ms) at which the sample was taken
    fn timestamp(&self) -> i64;
}

macro_rules! impl_sample {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Sample for $ty {
                fn is_queued(&self) -> bool {
                    self.queued
                }

                fn set_queued(&mut self, queued: bool) {
                    self.queued = queued;
                }

                fn timestamp(&self) -> i64 {
                    self.timestamp
                }
            }
        )+
    };
}

impl_sample!(GpsSample, SensorSample, ModemSample, UiSample, AccelSample, BatterySample);

/// Outcome of a population attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Population {
    /// Head index after the attempt
    pub head: usize,
    /// Slot written, or `None` when the sample was discarded
    pub stored: Option<usize>,
}

/// Strategy deciding where a new sample lands in a full or partially full buffer
pub trait PopulationPolicy<T: Sample> {
    /// Place `sample` into `entries` given the current `head`
    fn populate(entries: &mut [T], head: usize, sample: T) -> Population;
}

/// Plain ring: advance the head and overwrite the oldest entry unconditionally
#[derive(Debug, Clone, Copy, Default)]
pub struct Fifo;

impl<T: Sample> PopulationPolicy<T> for Fifo {
    fn populate(entries: &mut [T], head: usize, sample: T) -> Population {
        let next = (head + 1) % entries.len();
        entries[next] = sample;
        Population { head: next, stored: Some(next) }
    }
}

/// Value-priority ring used for accelerometer samples
///
/// Free slots are filled first. Once full, a new sample replaces the entry
/// with the lowest maximum axis magnitude if it is at least as strong, and
/// is discarded otherwise. The head always indexes the newest queued entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagnitudePriority;

impl PopulationPolicy<AccelSample> for MagnitudePriority {
    fn populate(entries: &mut [AccelSample], head: usize, sample: AccelSample) -> Population {
        let slot = match entries.iter().position(|entry| !entry.is_queued()) {
            Some(free) => Some(free),
            None => {
                let weakest = weakest_entry(entries);
                if sample.max_axis_magnitude() >= entries[weakest].max_axis_magnitude() {
                    Some(weakest)
                } else {
                    None
                }
            }
        };

        if let Some(index) = slot {
            entries[index] = sample;
        }

        let head = newest_queued(entries, slot).unwrap_or(head);
        Population { head, stored: slot }
    }
}

/// Index of the entry with the lowest maximum axis magnitude (first on ties)
fn weakest_entry(entries: &[AccelSample]) -> usize {
    let mut weakest = 0;
    for (index, entry) in entries.iter().enumerate().skip(1) {
        if entry.max_axis_magnitude() < entries[weakest].max_axis_magnitude() {
            weakest = index;
        }
    }
    weakest
}

/// Index of the queued entry with the greatest timestamp, preferring `written` on ties
fn newest_queued<T: Sample>(entries: &[T], written: Option<usize>) -> Option<usize> {
    let mut newest = written.filter(|&index| entries[index].is_queued());
    for (index, entry) in entries.iter().enumerate() {
        if !entry.is_queued() {
            continue;
        }
        match newest {
            Some(best) if entry.timestamp() <= entries[best].timestamp() => {}
            _ => newest = Some(index),
        }
    }
    newest
}

/// Fixed-capacity buffer of `N` samples populated according to policy `P`
#[derive(Debug, Clone)]
pub struct TelemetryBuffer<T, P, const N: usize> {
    entries: [T; N],
    head: usize,
    _policy: PhantomData<P>,
}

impl<T: Sample, P: PopulationPolicy<T>, const N: usize> Default for TelemetryBuffer<T, P, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Sample, P: PopulationPolicy<T>, const N: usize> TelemetryBuffer<T, P, N> {
    /// Create a zero-valued buffer with every slot unqueued
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| T::default()),
            head: 0,
            _policy: PhantomData,
        }
    }

    /// Store a new sample
    ///
    /// Samples that are not marked queued are never stored.
    ///
    /// # Returns
    ///
    /// * `Option<usize>` - Slot written, or `None` if the sample was discarded
    pub fn populate(&mut self, sample: T) -> Option<usize> {
        if !sample.is_queued() {
            return None;
        }

        let population = P::populate(&mut self.entries, self.head, sample);
        self.head = population.head;
        population.stored
    }

    /// Mark an entry as published
    ///
    /// Returns true if the entry was queued before the call.
    pub fn consume(&mut self, index: usize) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) if entry.is_queued() => {
                entry.set_queued(false);
                true
            }
            _ => false,
        }
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn head_entry(&self) -> &T {
        &self.entries[self.head]
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Iterate over every queued entry together with its slot index
    pub fn queued(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries.iter().enumerate().filter(|(_, entry)| entry.is_queued())
    }

    pub fn queued_count(&self) -> usize {
        self.queued().count()
    }
}

pub type GpsBuffer = TelemetryBuffer<GpsSample, Fifo, GPS_BUFFER_MAX>;
pub type SensorBuffer = TelemetryBuffer<SensorSample, Fifo, SENSOR_BUFFER_MAX>;
pub type ModemBuffer = TelemetryBuffer<ModemSample, Fifo, MODEM_BUFFER_MAX>;
pub type UiBuffer = TelemetryBuffer<UiSample, Fifo, UI_BUFFER_MAX>;
pub type AccelBuffer = TelemetryBuffer<AccelSample, MagnitudePriority, ACCEL_BUFFER_MAX>;
pub type BatteryBuffer = TelemetryBuffer<BatterySample, Fifo, BAT_BUFFER_MAX>;
