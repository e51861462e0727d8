//! Cellular modem interface.

use crate::data::NetworkMode;
use crate::error::Result;
use crate::manager::EventSink;

/// LTE network registration status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    NotRegistered,
    Searching,
    Home,
    Roaming,
    /// SIM failure; unrecoverable without intervention
    UiccFailure,
}

/// Result of an asynchronous date-time fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeOutcome {
    Obtained,
    NotObtained,
}

/// Notifications raised by the modem outside of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemDriverEvent {
    Registration(Registration),
    /// Raw RSRP index
    Rsrp(u16),
    DateTime(DateTimeOutcome),
}

/// Network and identity parameters read from the modem
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModemInfo {
    pub area_code: u32,
    pub mcc_mnc: String,
    pub cell_id: u32,
    pub ip_address: String,
    pub band: u16,
    pub network_mode: NetworkMode,
    pub gps_enabled: bool,
    pub iccid: String,
    pub modem_firmware: String,
    pub board_version: String,
}

/// Cellular modem
#[cfg_attr(test, mockall::automock)]
pub trait ModemDriver: Send {
    /// Install the notification sink and start connecting to LTE
    fn init(&mut self, events: EventSink<ModemDriverEvent>) -> Result<()>;

    fn modem_info(&mut self) -> Result<ModemInfo>;

    /// Battery voltage in millivolts
    fn battery_voltage(&mut self) -> Result<u16>;

    /// Start fetching network time; the outcome arrives as `ModemDriverEvent::DateTime`
    fn request_date_time(&mut self) -> Result<()>;

    fn firmware_version(&mut self) -> Result<String>;

    /// Power down the radio
    fn power_off(&mut self) -> Result<()>;
}
