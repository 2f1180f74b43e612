//! Primitive value types shared by every layer of the pipeline.
//!
//! - [`DeviceId`] identifies the physical device an entry came from.
//! - [`TimeStamp`] is a monotonic millisecond clock reading.
//! - [`usage`] holds the HID usage enums (keyboard, consumer, button, dpad).
//! - [`modifier`] holds [`ModifierFlag`], the logical "held modifier" set.

use std::ops::{Add, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod modifier;
pub mod usage;

pub use modifier::ModifierFlag;
pub use usage::{ConsumerKeyCode, DpadDirection, KeyCode, PointingButton};

/// Opaque identifier of a connected HID device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct DeviceId(pub u64);

impl DeviceId {
    /// Synthetic id for device-independent entries such as environment changes.
    pub const VIRTUAL: DeviceId = DeviceId(0);
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device:{}", self.0)
    }
}

/// Milliseconds on a monotonic clock.
///
/// All arithmetic saturates; a time stamp never wraps around.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TimeStamp(pub u64);

impl TimeStamp {
    pub const fn from_millis(milliseconds: u64) -> Self {
        Self(milliseconds)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Elapsed time from `earlier` to `self`, zero if `earlier` is later.
    pub fn duration_since(self, earlier: TimeStamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for TimeStamp {
    type Output = TimeStamp;

    fn add(self, rhs: Duration) -> TimeStamp {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        TimeStamp(self.0.saturating_add(millis))
    }
}

impl Sub<Duration> for TimeStamp {
    type Output = TimeStamp;

    fn sub(self, rhs: Duration) -> TimeStamp {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        TimeStamp(self.0.saturating_sub(millis))
    }
}

impl std::fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
