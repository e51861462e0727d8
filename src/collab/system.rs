//! Boot image confirmation and reboot.

use crate::error::Result;

/// Marks the running firmware image as good so it is not rolled back
#[cfg_attr(test, mockall::automock)]
pub trait BootConfirm: Send {
    fn confirm(&mut self) -> Result<()>;
}

/// Restarts the device
#[cfg_attr(test, mockall::automock)]
pub trait RebootHandler: Send {
    fn reboot(&mut self);
}
