//! Logical modifier flags.

use serde::{Deserialize, Serialize};

use super::KeyCode;

/// A logical modifier, independent of which physical key produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierFlag {
    CapsLock,
    LeftControl,
    LeftShift,
    LeftOption,
    LeftCommand,
    RightControl,
    RightShift,
    RightOption,
    RightCommand,
    Fn,
}

impl ModifierFlag {
    pub const ALL: [ModifierFlag; 10] = [
        ModifierFlag::CapsLock,
        ModifierFlag::LeftControl,
        ModifierFlag::LeftShift,
        ModifierFlag::LeftOption,
        ModifierFlag::LeftCommand,
        ModifierFlag::RightControl,
        ModifierFlag::RightShift,
        ModifierFlag::RightOption,
        ModifierFlag::RightCommand,
        ModifierFlag::Fn,
    ];

    /// The key that is posted to press or release this modifier.
    pub fn key_code(self) -> KeyCode {
        match self {
            ModifierFlag::CapsLock => KeyCode::CapsLock,
            ModifierFlag::LeftControl => KeyCode::LeftControl,
            ModifierFlag::LeftShift => KeyCode::LeftShift,
            ModifierFlag::LeftOption => KeyCode::LeftOption,
            ModifierFlag::LeftCommand => KeyCode::LeftCommand,
            ModifierFlag::RightControl => KeyCode::RightControl,
            ModifierFlag::RightShift => KeyCode::RightShift,
            ModifierFlag::RightOption => KeyCode::RightOption,
            ModifierFlag::RightCommand => KeyCode::RightCommand,
            ModifierFlag::Fn => KeyCode::Fn,
        }
    }
}
