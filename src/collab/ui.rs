//! Buttons and LED output interfaces.

use crate::error::Result;
use crate::manager::EventSink;

/// A button was pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    pub button: u8,
}

/// Device buttons
#[cfg_attr(test, mockall::automock)]
pub trait Buttons: Send {
    fn init(&mut self, presses: EventSink<ButtonPress>) -> Result<()>;
}

/// Status indications rendered by the LED driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedPattern {
    LteConnecting,
    GpsSearching,
    CloudPublishing,
    ActiveMode,
    PassiveMode,
    SystemFault,
}

/// LED driver
#[cfg_attr(test, mockall::automock)]
pub trait LedOutput: Send {
    fn set_pattern(&mut self, pattern: LedPattern) -> Result<()>;
}
