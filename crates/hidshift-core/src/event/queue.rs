//! FIFO queue of entries for one pipeline stage.
//!
//! Besides the entries, each queue owns the [`ModifierFlagManager`] that
//! reflects everything ever pushed into it.  Pushing a modifier key_down
//! increases its flag, a key_up decreases it, caps-lock state changes toggle
//! the lock, and sticky-modifier events toggle sticky records.  Manipulators
//! read the *output* queue's manager to learn what the next stage will see
//! as held.
//!
//! Entries keep arrival order; the queue never sorts.

use std::collections::VecDeque;

use crate::modifier_flag_manager::{ActiveModifierFlag, ActiveModifierFlagType, ModifierFlagManager};
use crate::types::{DeviceId, ModifierFlag};

use super::{Entry, EntryState, Event, EventOrigin, EventTimeStamp, EventType, StickyModifierKind};

#[derive(Debug, Default)]
pub struct EventQueue {
    entries: VecDeque<Entry>,
    modifier_flag_manager: ModifierFlagManager,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an entry from its fields and appends it.
    pub fn emplace_back_entry(
        &mut self,
        device_id: DeviceId,
        event_time_stamp: EventTimeStamp,
        event: Event,
        event_type: EventType,
        original_event: Event,
        event_origin: EventOrigin,
        state: EntryState,
    ) {
        self.push_back_entry(Entry::with_fields(
            device_id,
            event_time_stamp,
            event,
            event_type,
            original_event,
            event_origin,
            state,
        ));
    }

    /// Appends `entry`, updating the modifier flags it implies.
    pub fn push_back_entry(&mut self, entry: Entry) {
        self.update_modifier_flags(&entry);
        self.entries.push_back(entry);
    }

    /// Puts back an entry that was popped but not resolved.
    ///
    /// Its modifier flags were already counted when it was first pushed.
    pub fn push_front_entry(&mut self, entry: Entry) {
        self.entries.push_front(entry);
    }

    pub fn front(&self) -> Option<&Entry> {
        self.entries.front()
    }

    pub fn pop_front(&mut self) -> Option<Entry> {
        self.entries.pop_front()
    }

    pub fn entries(&self) -> &VecDeque<Entry> {
        &self.entries
    }

    /// Removes and returns every queued entry, leaving the flags untouched.
    pub fn take_entries(&mut self) -> Vec<Entry> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes every entry for which `predicate` returns true.
    pub fn erase_entries<F>(&mut self, mut predicate: F)
    where
        F: FnMut(&Entry) -> bool,
    {
        self.entries.retain(|entry| !predicate(entry));
    }

    pub fn erase_device_entries(&mut self, device_id: DeviceId) {
        self.erase_entries(|entry| entry.device_id() == device_id);
    }

    pub fn modifier_flag_manager(&self) -> &ModifierFlagManager {
        &self.modifier_flag_manager
    }

    pub fn modifier_flag_manager_mut(&mut self) -> &mut ModifierFlagManager {
        &mut self.modifier_flag_manager
    }

    fn update_modifier_flags(&mut self, entry: &Entry) {
        let device_id = entry.device_id();
        let manager = &mut self.modifier_flag_manager;

        match entry.event() {
            Event::KeyCode(key_code) => match key_code.modifier_flag() {
                // Caps lock is tracked through CapsLockStateChanged.
                Some(ModifierFlag::CapsLock) => {}
                Some(flag) => {
                    let kind = match entry.event_type() {
                        EventType::KeyDown => ActiveModifierFlagType::Increase,
                        EventType::KeyUp => ActiveModifierFlagType::Decrease,
                        EventType::Single => return,
                    };
                    manager.push_back_active_modifier_flag(ActiveModifierFlag::new(
                        kind, flag, device_id,
                    ));
                }
                None => {
                    if entry.is_key_up() {
                        manager.erase_all_sticky_modifier_flags();
                    }
                }
            },
            Event::ConsumerKeyCode(_) | Event::PointingButton(_) | Event::DpadButton(_) => {
                if entry.is_key_up() {
                    manager.erase_all_sticky_modifier_flags();
                }
            }
            Event::CapsLockStateChanged(on) => {
                let kind = if *on {
                    ActiveModifierFlagType::IncreaseLock
                } else {
                    ActiveModifierFlagType::DecreaseLock
                };
                manager.push_back_active_modifier_flag(ActiveModifierFlag::new(
                    kind,
                    ModifierFlag::CapsLock,
                    device_id,
                ));
            }
            Event::StickyModifier { flag, kind } => {
                let increase = match kind {
                    StickyModifierKind::On => true,
                    StickyModifierKind::Off => false,
                    StickyModifierKind::Toggle => !manager.is_sticky_active(*flag),
                };
                let kind = if increase {
                    ActiveModifierFlagType::IncreaseSticky
                } else {
                    ActiveModifierFlagType::DecreaseSticky
                };
                manager.push_back_active_modifier_flag(ActiveModifierFlag::new(
                    kind, *flag, device_id,
                ));
            }
            _ => {}
        }
    }
}
