//! # Collaborators
//!
//! Interfaces to everything outside the tracker core: the cloud transport,
//! hardware drivers, settings storage, the wall clock and the system.
//!
//! Drivers report asynchronous outcomes through an
//! [`EventSink`](crate::manager::EventSink) handed to them at init time.

pub mod clock;
pub mod gps;
pub mod modem;
pub mod sensor;
pub mod store;
pub mod system;
pub mod transport;
pub mod ui;

pub use clock::{ClockSource, SystemClock};
pub use gps::{AgpsRequest, GpsDriver, GpsDriverEvent, GpsFix};
pub use modem::{DateTimeOutcome, ModemDriver, ModemDriverEvent, ModemInfo, Registration};
pub use sensor::{Accelerometer, EnvironmentSensor};
pub use store::{ConfigStore, FileConfigStore};
pub use system::{BootConfirm, RebootHandler};
pub use transport::{CloudTransport, LinkEvent, Topic};
pub use ui::{ButtonPress, Buttons, LedOutput, LedPattern};
