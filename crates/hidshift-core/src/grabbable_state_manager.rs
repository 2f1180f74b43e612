//! Per-device grabbability tracking.
//!
//! The grabber may only take exclusive ownership of a device when doing so
//! cannot strand an in-flight gesture: a held modifier, a held mouse button,
//! or a key the OS is auto-repeating.  This manager observes the raw entries
//! of every device and derives its state from what is currently held:
//!
//! | held                           | state                                        |
//! |--------------------------------|----------------------------------------------|
//! | a key that is auto-repeating   | `UngrabbableTemporarily` / `KeyRepeating`     |
//! | a modifier key                 | `UngrabbableTemporarily` / `ModifierKeyPressed` |
//! | a pointing button              | `UngrabbableTemporarily` / `PointingButtonPressed` |
//! | nothing of the above           | `Grabbable` / `None`                          |
//!
//! The first matching row wins.  A key_down for a key that is already down on
//! the same device is an auto-repeat.
//!
//! Every change is returned exactly once; recomputing the same state (time
//! stamp aside) returns `None`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::queue::EventQueue;
use crate::event::{Entry, Event, EventType};
use crate::types::{ConsumerKeyCode, DeviceId, DpadDirection, KeyCode, PointingButton, TimeStamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrabbableStateKind {
    Grabbable,
    UngrabbableTemporarily,
    DeviceError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UngrabbableReason {
    None,
    KeyRepeating,
    ModifierKeyPressed,
    PointingButtonPressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrabbableState {
    pub device_id: DeviceId,
    pub state: GrabbableStateKind,
    pub reason: UngrabbableReason,
    pub time_stamp: TimeStamp,
}

impl GrabbableState {
    pub fn new(
        device_id: DeviceId,
        state: GrabbableStateKind,
        reason: UngrabbableReason,
        time_stamp: TimeStamp,
    ) -> Self {
        Self {
            device_id,
            state,
            reason,
            time_stamp,
        }
    }

    /// Equality ignoring the time stamp.
    pub fn same_state_as(&self, other: &GrabbableState) -> bool {
        self.device_id == other.device_id && self.state == other.state && self.reason == other.reason
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressedSwitch {
    Key(KeyCode),
    ConsumerKey(ConsumerKeyCode),
    Dpad(DpadDirection),
    PointingButton(PointingButton),
}

impl PressedSwitch {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::KeyCode(key_code) => Some(PressedSwitch::Key(*key_code)),
            Event::ConsumerKeyCode(key_code) => Some(PressedSwitch::ConsumerKey(*key_code)),
            Event::DpadButton(direction) => Some(PressedSwitch::Dpad(*direction)),
            Event::PointingButton(button) => Some(PressedSwitch::PointingButton(*button)),
            _ => None,
        }
    }

    fn is_modifier(self) -> bool {
        matches!(self, PressedSwitch::Key(key_code) if key_code.modifier_flag().is_some())
    }
}

#[derive(Debug, Default)]
struct DeviceSwitches {
    pressed: Vec<PressedSwitch>,
    repeating: Vec<PressedSwitch>,
}

impl DeviceSwitches {
    fn key_down(&mut self, switch: PressedSwitch) {
        if self.pressed.contains(&switch) {
            if !self.repeating.contains(&switch) {
                self.repeating.push(switch);
            }
        } else {
            self.pressed.push(switch);
        }
    }

    fn key_up(&mut self, switch: PressedSwitch) {
        self.pressed.retain(|s| *s != switch);
        self.repeating.retain(|s| *s != switch);
    }

    fn clear(&mut self) {
        self.pressed.clear();
        self.repeating.clear();
    }

    fn derive(&self) -> (GrabbableStateKind, UngrabbableReason) {
        if !self.repeating.is_empty() {
            (GrabbableStateKind::UngrabbableTemporarily, UngrabbableReason::KeyRepeating)
        } else if self.pressed.iter().any(|s| s.is_modifier()) {
            (GrabbableStateKind::UngrabbableTemporarily, UngrabbableReason::ModifierKeyPressed)
        } else if self.pressed.iter().any(|s| matches!(s, PressedSwitch::PointingButton(_))) {
            (GrabbableStateKind::UngrabbableTemporarily, UngrabbableReason::PointingButtonPressed)
        } else {
            (GrabbableStateKind::Grabbable, UngrabbableReason::None)
        }
    }
}

#[derive(Debug, Default)]
pub struct GrabbableStateManager {
    switches: HashMap<DeviceId, DeviceSwitches>,
    states: HashMap<DeviceId, GrabbableState>,
}

impl GrabbableStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes one entry.  Returns the new state if it changed.
    pub fn update(&mut self, entry: &Entry) -> Option<GrabbableState> {
        let device_id = entry.device_id();
        let switches = self.switches.entry(device_id).or_default();

        match entry.event() {
            Event::DeviceKeysAndPointingButtonsAreReleased | Event::DeviceUngrabbed => switches.clear(),
            event => {
                if let Some(switch) = PressedSwitch::from_event(event) {
                    match entry.event_type() {
                        EventType::KeyDown => switches.key_down(switch),
                        EventType::KeyUp => switches.key_up(switch),
                        EventType::Single => {}
                    }
                }
            }
        }

        let (state, reason) = switches.derive();
        self.set(GrabbableState::new(device_id, state, reason, entry.time_stamp()))
    }

    /// Observes every entry of `queue` in order and returns the changes.
    pub fn update_queue(&mut self, queue: &EventQueue) -> Vec<GrabbableState> {
        queue
            .entries()
            .iter()
            .filter_map(|entry| self.update(entry))
            .collect()
    }

    /// Overrides the computed state until the next entry of the device.
    pub fn update_state(
        &mut self,
        device_id: DeviceId,
        state: GrabbableStateKind,
        reason: UngrabbableReason,
        time_stamp: TimeStamp,
    ) -> Option<GrabbableState> {
        self.switches.entry(device_id).or_default();
        self.set(GrabbableState::new(device_id, state, reason, time_stamp))
    }

    /// Forgets what the device holds without computing or reporting a new
    /// state.  Pair with [`Self::update_state`] when a device fails.
    pub fn forget_held_switches(&mut self, device_id: DeviceId) {
        if let Some(switches) = self.switches.get_mut(&device_id) {
            switches.clear();
        }
    }

    pub fn get_grabbable_state(&self, device_id: DeviceId) -> Option<GrabbableState> {
        self.states.get(&device_id).copied()
    }

    pub fn erase_device(&mut self, device_id: DeviceId) {
        self.switches.remove(&device_id);
        self.states.remove(&device_id);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn set(&mut self, new_state: GrabbableState) -> Option<GrabbableState> {
        match self.states.get_mut(&new_state.device_id) {
            Some(current) if current.same_state_as(&new_state) => {
                current.time_stamp = new_state.time_stamp;
                None
            }
            _ => {
                debug!(
                    device = %new_state.device_id,
                    state = ?new_state.state,
                    reason = ?new_state.reason,
                    "grabbable state changed"
                );
                self.states.insert(new_state.device_id, new_state);
                Some(new_state)
            }
        }
    }
}
