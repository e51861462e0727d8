//! GPS receiver interface.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::error::Result;
use crate::manager::EventSink;

/// Position fix reported by the receiver
#[derive(Debug, Clone, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub accuracy: f64,
    pub speed: f64,
    pub heading: f64,
    /// UTC time of the fix
    pub datetime: DateTime<Utc>,
}

/// Assistance data the receiver asks for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgpsRequest {
    /// Assistance element types, as numbered by the AGPS service
    pub types: Vec<u8>,
}

/// Outcomes reported by the receiver while searching
#[derive(Debug, Clone, PartialEq)]
pub enum GpsDriverEvent {
    Fix(GpsFix),
    Timeout,
    AgpsNeeded(AgpsRequest),
    Error(String),
}

/// GPS receiver
#[cfg_attr(test, mockall::automock)]
pub trait GpsDriver: Send {
    /// Install the sink for search outcomes
    fn init(&mut self, events: EventSink<GpsDriverEvent>) -> Result<()>;

    /// Begin a search that gives up after `timeout`
    fn start(&mut self, timeout: Duration) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Feed downloaded assistance data to the receiver
    fn process_agps(&mut self, data: &[u8]) -> Result<()>;
}
