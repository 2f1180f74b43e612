//! Bookkeeping of which modifiers are logically held.
//!
//! Every pipeline stage (every [`EventQueue`](crate::event::queue::EventQueue))
//! owns one [`ModifierFlagManager`].  Instead of a boolean per modifier it
//! keeps an ordered list of signed records, one per press/release/lock
//! observed, tagged with the device that produced it.  This lets the same
//! modifier be held from two keyboards at once, or by a synthetic press from a
//! manipulator, without one device's release clearing another's press.
//!
//! # Pair erasure
//!
//! An `increase` and a `decrease` for the same `(flag, device_id)` never
//! coexist: as soon as the second half of a pair is appended, the first pair
//! found in the list is removed.  The list therefore stays short, and a
//! release that arrives before its press (possible across queues) cancels
//! the press when it shows up instead of leaving a stuck modifier.
//!
//! Locks (caps lock) are not counted like presses: `increase_lock` replaces
//! any identical lock record, and `decrease_lock` removes matching lock
//! records without being stored itself.

use serde::{Deserialize, Serialize};

use crate::types::{DeviceId, ModifierFlag};

/// Kind of an [`ActiveModifierFlag`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveModifierFlagType {
    Increase,
    Decrease,
    IncreaseLock,
    DecreaseLock,
    IncreaseSticky,
    DecreaseSticky,
}

impl ActiveModifierFlagType {
    fn inverse(self) -> Self {
        match self {
            Self::Increase => Self::Decrease,
            Self::Decrease => Self::Increase,
            Self::IncreaseLock => Self::DecreaseLock,
            Self::DecreaseLock => Self::IncreaseLock,
            Self::IncreaseSticky => Self::DecreaseSticky,
            Self::DecreaseSticky => Self::IncreaseSticky,
        }
    }

    fn is_sticky(self) -> bool {
        matches!(self, Self::IncreaseSticky | Self::DecreaseSticky)
    }
}

/// One signed modifier record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveModifierFlag {
    pub kind: ActiveModifierFlagType,
    pub flag: ModifierFlag,
    pub device_id: DeviceId,
}

impl ActiveModifierFlag {
    pub fn new(kind: ActiveModifierFlagType, flag: ModifierFlag, device_id: DeviceId) -> Self {
        Self {
            kind,
            flag,
            device_id,
        }
    }

    /// `+1` for the increasing kinds, `-1` for the decreasing kinds.
    pub fn count(&self) -> i32 {
        match self.kind {
            ActiveModifierFlagType::Increase
            | ActiveModifierFlagType::IncreaseLock
            | ActiveModifierFlagType::IncreaseSticky => 1,
            ActiveModifierFlagType::Decrease
            | ActiveModifierFlagType::DecreaseLock
            | ActiveModifierFlagType::DecreaseSticky => -1,
        }
    }

    fn is_paired_with(&self, other: &ActiveModifierFlag) -> bool {
        self.kind.inverse() == other.kind
            && self.flag == other.flag
            && self.device_id == other.device_id
    }
}

/// Ordered list of active modifier records for one pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct ModifierFlagManager {
    active_modifier_flags: Vec<ActiveModifierFlag>,
}

impl ModifierFlagManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a press, release, lock or sticky change.
    pub fn push_back_active_modifier_flag(&mut self, record: ActiveModifierFlag) {
        match record.kind {
            ActiveModifierFlagType::Increase
            | ActiveModifierFlagType::Decrease
            | ActiveModifierFlagType::IncreaseSticky
            | ActiveModifierFlagType::DecreaseSticky => {
                self.active_modifier_flags.push(record);
                self.erase_pairs();
            }
            ActiveModifierFlagType::IncreaseLock => {
                self.active_modifier_flags.retain(|f| *f != record);
                self.active_modifier_flags.push(record);
                self.erase_pairs();
            }
            ActiveModifierFlagType::DecreaseLock => {
                self.active_modifier_flags.retain(|f| {
                    !(f.kind == ActiveModifierFlagType::IncreaseLock
                        && f.flag == record.flag
                        && f.device_id == record.device_id)
                });
            }
        }
    }

    /// Removes the first `(x, inverse x)` pair in the list, if any.
    fn erase_pairs(&mut self) {
        let flags = &self.active_modifier_flags;
        let pair = flags.iter().enumerate().find_map(|(i, first)| {
            flags[i + 1..]
                .iter()
                .position(|second| first.is_paired_with(second))
                .map(|offset| (i, i + 1 + offset))
        });
        if let Some((first, second)) = pair {
            self.active_modifier_flags.remove(second);
            self.active_modifier_flags.remove(first);
        }
    }

    /// True when the signed count for `flag` across all devices is positive.
    pub fn is_pressed(&self, flag: ModifierFlag) -> bool {
        self.active_modifier_flags
            .iter()
            .filter(|f| f.flag == flag)
            .map(ActiveModifierFlag::count)
            .sum::<i32>()
            > 0
    }

    pub fn is_sticky_active(&self, flag: ModifierFlag) -> bool {
        self.active_modifier_flags
            .iter()
            .filter(|f| f.flag == flag && f.kind.is_sticky())
            .map(ActiveModifierFlag::count)
            .sum::<i32>()
            > 0
    }

    /// Flags currently pressed, in [`ModifierFlag::ALL`] order.
    pub fn pressed_modifier_flags(&self) -> Vec<ModifierFlag> {
        ModifierFlag::ALL
            .into_iter()
            .filter(|flag| self.is_pressed(*flag))
            .collect()
    }

    pub fn active_modifier_flags(&self) -> &[ActiveModifierFlag] {
        &self.active_modifier_flags
    }

    /// Drops every record of `device_id`, locks included.
    pub fn erase_all_active_modifier_flags(&mut self, device_id: DeviceId) {
        self.active_modifier_flags.retain(|f| f.device_id != device_id);
    }

    /// Drops transient presses of `device_id`, keeping lock and sticky records.
    pub fn erase_all_active_modifier_flags_except_lock(&mut self, device_id: DeviceId) {
        self.active_modifier_flags.retain(|f| {
            f.device_id != device_id
                || matches!(
                    f.kind,
                    ActiveModifierFlagType::IncreaseLock
                        | ActiveModifierFlagType::IncreaseSticky
                        | ActiveModifierFlagType::DecreaseSticky
                )
        });
    }

    pub fn erase_all_sticky_modifier_flags(&mut self) {
        self.active_modifier_flags.retain(|f| !f.kind.is_sticky());
    }

    pub fn reset(&mut self) {
        self.active_modifier_flags.clear();
    }
}
