//! Monotonic uptime and wall-clock time.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tokio::time::Instant;

use crate::error::Result;

/// Time source shared by the managers
#[cfg_attr(test, mockall::automock)]
pub trait ClockSource: Send + Sync {
    /// Set the wall clock from an external UTC reference
    fn set_utc(&self, utc: DateTime<Utc>) -> Result<()>;

    /// Milliseconds since boot
    fn monotonic_ms(&self) -> i64;

    /// Convert an uptime timestamp to Unix milliseconds, once UTC is known
    fn unix_time_ms(&self, uptime_ms: i64) -> Option<i64>;
}

/// Clock backed by the runtime's monotonic timer
#[derive(Debug)]
pub struct SystemClock {
    boot: Instant,
    /// Unix ms at uptime zero
    offset_ms: Mutex<Option<i64>>,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
            offset_ms: Mutex::new(None),
        }
    }
}

impl ClockSource for SystemClock {
    fn set_utc(&self, utc: DateTime<Utc>) -> Result<()> {
        let offset = utc.timestamp_millis() - self.monotonic_ms();
        *self.offset_ms.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(offset);
        Ok(())
    }

    fn monotonic_ms(&self) -> i64 {
        i64::try_from(self.boot.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    fn unix_time_ms(&self, uptime_ms: i64) -> Option<i64> {
        self.offset_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .map(|offset| offset + uptime_ms)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock whose uptime is set by the test
    #[derive(Debug, Default)]
    pub struct ManualClock {
        now_ms: AtomicI64,
        offset_ms: Mutex<Option<i64>>,
        pub utc_updates: Mutex<Vec<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Clock with UTC already known, mapping uptime 0 to `offset_ms`
        pub fn synced(offset_ms: i64) -> Self {
            let clock = Self::default();
            *clock.offset_ms.lock().unwrap() = Some(offset_ms);
            clock
        }

        pub fn set_now(&self, now_ms: i64) {
            self.now_ms.store(now_ms, Ordering::SeqCst);
        }
    }

    impl ClockSource for ManualClock {
        fn set_utc(&self, utc: DateTime<Utc>) -> Result<()> {
            *self.offset_ms.lock().unwrap() = Some(utc.timestamp_millis() - self.monotonic_ms());
            self.utc_updates.lock().unwrap().push(utc);
            Ok(())
        }

        fn monotonic_ms(&self) -> i64 {
            self.now_ms.load(Ordering::SeqCst)
        }

        fn unix_time_ms(&self, uptime_ms: i64) -> Option<i64> {
            self.offset_ms.lock().unwrap().map(|offset| offset + uptime_ms)
        }
    }
}
