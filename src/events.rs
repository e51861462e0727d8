//! # Manager Events
//!
//! Every event published on the bus, grouped by the manager that emits it.
//!
//! Each manager owns one event enum; the bus carries the `Event` sum type
//! and subscribers match on it exhaustively.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::{Consumed, TelemetryBuffers};
use crate::collab::gps::AgpsRequest;
use crate::data::{
    AccelSample, BatterySample, DataType, GpsSample, ModemSample, SensorSample, UiSample,
};
use crate::device_config::{ConfigDelta, DeviceConfig};

/// Identity of an event publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerId {
    App,
    Data,
    Cloud,
    Gps,
    Modem,
    Sensor,
    Ui,
    Output,
    Util,
}

impl ManagerId {
    pub fn name(&self) -> &'static str {
        match self {
            ManagerId::App => "app",
            ManagerId::Data => "data",
            ManagerId::Cloud => "cloud",
            ManagerId::Gps => "gps",
            ManagerId::Modem => "modem",
            ManagerId::Sensor => "sensor",
            ManagerId::Ui => "ui",
            ManagerId::Output => "output",
            ManagerId::Util => "util",
        }
    }
}

/// Application scheduler events
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Start a collection cycle over `types`, closed after `timeout` at the latest
    DataGet { types: Vec<DataType>, timeout: Duration },
    ShutdownReady,
    Error(String),
}

/// Data manager events
#[derive(Debug, Clone)]
pub enum DataEvent {
    /// Read-only snapshot of every buffer lent to the cloud manager
    DataSend(Arc<TelemetryBuffers>),
    /// Copy of the newest button entry for immediate publication
    UiDataSend(UiSample),
    /// Configuration known at boot
    ConfigInit(DeviceConfig),
    /// Configuration changed by a remote delta
    ConfigReady(DeviceConfig),
    /// Report the current configuration to the cloud
    ConfigSend(DeviceConfig),
    ShutdownReady,
    Error(String),
}

/// Cloud manager events
#[derive(Debug, Clone, PartialEq)]
pub enum CloudEvent {
    Connecting,
    Connected,
    Disconnected,
    ConfigReceived(ConfigDelta),
    AgpsDataReceived(Bytes),
    FotaDone,
    /// Buffers released; lists the entries that were published
    SharedDataDone(Consumed),
    ShutdownReady,
    Error(String),
}

/// GPS manager events
#[derive(Debug, Clone, PartialEq)]
pub enum GpsEvent {
    DataReady(GpsSample),
    Timeout,
    Active,
    Inactive,
    AgpsNeeded(AgpsRequest),
    ShutdownReady,
    Error(String),
}

/// Modem manager events
#[derive(Debug, Clone, PartialEq)]
pub enum ModemEvent {
    LteConnecting,
    LteConnected,
    LteDisconnected,
    ModemDataReady(ModemSample),
    BatteryDataReady(BatterySample),
    DateTimeObtained,
    ShutdownReady,
    Error(String),
}

/// Sensor manager events
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    MovementDataReady(AccelSample),
    EnvironmentalDataReady(SensorSample),
    ShutdownReady,
    Error(String),
}

/// UI manager events
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    ButtonDataReady(UiSample),
    ShutdownReady,
    Error(String),
}

/// Output manager events
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    ShutdownReady,
    Error(String),
}

/// Util manager events
#[derive(Debug, Clone, PartialEq)]
pub enum UtilEvent {
    ShutdownRequest,
}

/// Any event carried by the bus
#[derive(Debug, Clone)]
pub enum Event {
    App(AppEvent),
    Data(DataEvent),
    Cloud(CloudEvent),
    Gps(GpsEvent),
    Modem(ModemEvent),
    Sensor(SensorEvent),
    Ui(UiEvent),
    Output(OutputEvent),
    Util(UtilEvent),
}

impl Event {
    /// Manager that published the event
    pub fn source(&self) -> ManagerId {
        match self {
            Event::App(_) => ManagerId::App,
            Event::Data(_) => ManagerId::Data,
            Event::Cloud(_) => ManagerId::Cloud,
            Event::Gps(_) => ManagerId::Gps,
            Event::Modem(_) => ManagerId::Modem,
            Event::Sensor(_) => ManagerId::Sensor,
            Event::Ui(_) => ManagerId::Ui,
            Event::Output(_) => ManagerId::Output,
            Event::Util(_) => ManagerId::Util,
        }
    }

    /// True for any manager's shutdown acknowledgement
    pub fn is_shutdown_ready(&self) -> bool {
        matches!(
            self,
            Event::App(AppEvent::ShutdownReady)
                | Event::Data(DataEvent::ShutdownReady)
                | Event::Cloud(CloudEvent::ShutdownReady)
                | Event::Gps(GpsEvent::ShutdownReady)
                | Event::Modem(ModemEvent::ShutdownReady)
                | Event::Sensor(SensorEvent::ShutdownReady)
                | Event::Ui(UiEvent::ShutdownReady)
                | Event::Output(OutputEvent::ShutdownReady)
        )
    }

    /// Error description if this is any manager's error event
    pub fn error_reason(&self) -> Option<&str> {
        match self {
            Event::App(AppEvent::Error(reason))
            | Event::Data(DataEvent::Error(reason))
            | Event::Cloud(CloudEvent::Error(reason))
            | Event::Gps(GpsEvent::Error(reason))
            | Event::Modem(ModemEvent::Error(reason))
            | Event::Sensor(SensorEvent::Error(reason))
            | Event::Ui(UiEvent::Error(reason))
            | Event::Output(OutputEvent::Error(reason)) => Some(reason),
            _ => None,
        }
    }
}

macro_rules! impl_from_event {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        $(
            impl From<$ty> for Event {
                fn from(event: $ty) -> Self {
                    Event::$variant(event)
                }
            }
        )+
    };
}

impl_from_event!(
    App(AppEvent),
    Data(DataEvent),
    Cloud(CloudEvent),
    Gps(GpsEvent),
    Modem(ModemEvent),
    Sensor(SensorEvent),
    Ui(UiEvent),
    Output(OutputEvent),
    Util(UtilEvent),
);
