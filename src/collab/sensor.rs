//! Environmental sensor and accelerometer interfaces.

use crate::error::Result;
use crate::manager::EventSink;

/// Temperature and humidity sensor
#[cfg_attr(test, mockall::automock)]
pub trait EnvironmentSensor: Send {
    /// Temperature in degrees Celsius
    fn temperature(&mut self) -> Result<f64>;

    /// Relative humidity in percent
    fn humidity(&mut self) -> Result<f64>;
}

/// Accelerometer with a movement trigger comparator
#[cfg_attr(test, mockall::automock)]
pub trait Accelerometer: Send {
    /// Install the sink receiving three-axis readings when the trigger fires
    fn init(&mut self, triggers: EventSink<[f64; 3]>) -> Result<()>;

    /// Set the trigger threshold; 0 disables the trigger
    fn set_threshold(&mut self, threshold: u32) -> Result<()>;
}
