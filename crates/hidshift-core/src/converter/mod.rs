//! Synthetic event sources that sit in front of the manipulator chain.
//!
//! - [`hid_mapper`]: raw keyboard / mouse HID values to entries.
//! - [`hat`]: game-pad hat switch to d-pad key presses (edge triggered).
//! - [`stick`]: game-pad analog sticks to repeating pointer / wheel motion
//!   (timer driven).

pub mod hat;
pub mod hid_mapper;
pub mod stick;

pub use hat::HatSwitchConverter;
pub use hid_mapper::{make_entries, HidValue};
pub use stick::{GamePadStickConverter, StickAxis, StickParameters, StickTick};
