//! # Managers
//!
//! The concrete actors of the tracker. Each owns one subsystem's state
//! machine and talks to the others only through the event bus.

pub mod app;
pub mod cloud;
pub mod data;
pub mod gps;
pub mod modem;
pub mod output;
pub mod sensor;
pub mod ui;
pub mod util;

pub use app::{AppManager, AppMessage};
pub use cloud::{CloudLinks, CloudManager, CloudMessage};
pub use data::{DataManager, DataMessage};
pub use gps::{GpsManager, GpsMessage};
pub use modem::{ModemManager, ModemMessage};
pub use output::{OutputManager, OutputMessage};
pub use sensor::{SensorManager, SensorMessage};
pub use ui::{UiManager, UiMessage};
pub use util::{UtilHandle, UtilManager, UtilMessage};
