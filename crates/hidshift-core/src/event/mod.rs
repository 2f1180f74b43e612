//! Events and queued entries.
//!
//! An [`Event`] describes one thing that happened (a key, a pointer motion, a
//! variable assignment, a device notification).  An [`Entry`] wraps an event
//! with the routing metadata the pipeline needs: the device it came from, when
//! it happened, whether it is a press or a release, the event as first
//! observed, and whether any manipulator has touched it.
//!
//! Entries are moved from queue to queue, never cloned between owners, so the
//! mutable parts (`state`, `valid`, input delay) always have a single owner.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::environment::{FrontmostApplication, InputSourceProperties, VariableValue};
use crate::types::{
    ConsumerKeyCode, DeviceId, DpadDirection, KeyCode, ModifierFlag, PointingButton, TimeStamp,
};

pub mod queue;

/// Relative pointer and wheel movement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointingMotion {
    pub x: i32,
    pub y: i32,
    pub vertical_wheel: i32,
    pub horizontal_wheel: i32,
}

impl PointingMotion {
    pub fn has_wheel(&self) -> bool {
        self.vertical_wheel != 0 || self.horizontal_wheel != 0
    }
}

/// How a sticky modifier event changes the sticky state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickyModifierKind {
    On,
    Off,
    Toggle,
}

/// One input or pipeline occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    KeyCode(KeyCode),
    ConsumerKeyCode(ConsumerKeyCode),
    PointingButton(PointingButton),
    DpadButton(DpadDirection),
    PointingMotion(PointingMotion),
    CapsLockStateChanged(bool),
    SetVariable {
        name: String,
        value: VariableValue,
    },
    SelectInputSource(Vec<InputSourceProperties>),
    ShellCommand(String),
    StickyModifier {
        flag: ModifierFlag,
        kind: StickyModifierKind,
    },
    DeviceKeysAndPointingButtonsAreReleased,
    DeviceUngrabbed,
    FrontmostApplicationChanged(FrontmostApplication),
    InputSourceChanged(InputSourceProperties),
    KeyboardTypeChanged(String),
    StopKeyboardRepeat,
}

impl Event {
    /// True for momentary switches that come as key_down / key_up pairs.
    pub fn has_press_release(&self) -> bool {
        matches!(
            self,
            Event::KeyCode(_)
                | Event::ConsumerKeyCode(_)
                | Event::PointingButton(_)
                | Event::DpadButton(_)
        )
    }

    pub fn modifier_flag(&self) -> Option<ModifierFlag> {
        match self {
            Event::KeyCode(key_code) => key_code.modifier_flag(),
            _ => None,
        }
    }

    pub fn is_pointing_button(&self) -> bool {
        matches!(self, Event::PointingButton(_))
    }

    /// True for events that only update the environment.
    pub fn is_environment_change(&self) -> bool {
        matches!(
            self,
            Event::FrontmostApplicationChanged(_)
                | Event::InputSourceChanged(_)
                | Event::KeyboardTypeChanged(_)
        )
    }
}

impl From<KeyCode> for Event {
    fn from(key_code: KeyCode) -> Self {
        Event::KeyCode(key_code)
    }
}

impl From<ConsumerKeyCode> for Event {
    fn from(key_code: ConsumerKeyCode) -> Self {
        Event::ConsumerKeyCode(key_code)
    }
}

impl From<PointingButton> for Event {
    fn from(button: PointingButton) -> Self {
        Event::PointingButton(button)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    KeyDown,
    KeyUp,
    Single,
}

/// Whether the entry came from a device that is exclusively grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    Observed,
    Grabbed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Original,
    Manipulated,
}

/// Time stamp plus the extra delay a manipulator asked the entry to wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventTimeStamp {
    pub time_stamp: TimeStamp,
    pub input_delay: Duration,
}

impl EventTimeStamp {
    pub fn new(time_stamp: TimeStamp) -> Self {
        Self {
            time_stamp,
            input_delay: Duration::ZERO,
        }
    }

    /// When a waiting entry may be reconsidered.
    pub fn deadline(&self) -> TimeStamp {
        self.time_stamp + self.input_delay
    }
}

/// A queued event with its routing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    device_id: DeviceId,
    event_time_stamp: EventTimeStamp,
    event: Event,
    event_type: EventType,
    original_event: Event,
    event_origin: EventOrigin,
    state: EntryState,
    valid: bool,
}

impl Entry {
    /// Creates an unmanipulated entry whose original event is `event`.
    ///
    /// An event without press/release capability is always typed `Single`.
    pub fn new(
        device_id: DeviceId,
        time_stamp: TimeStamp,
        event: Event,
        event_type: EventType,
        event_origin: EventOrigin,
    ) -> Self {
        let original_event = event.clone();
        Self::with_fields(
            device_id,
            EventTimeStamp::new(time_stamp),
            event,
            event_type,
            original_event,
            event_origin,
            EntryState::Original,
        )
    }

    /// Creates an entry with every field spelled out.
    pub fn with_fields(
        device_id: DeviceId,
        event_time_stamp: EventTimeStamp,
        event: Event,
        event_type: EventType,
        original_event: Event,
        event_origin: EventOrigin,
        state: EntryState,
    ) -> Self {
        let event_type = if event.has_press_release() {
            event_type
        } else {
            EventType::Single
        };
        Self {
            device_id,
            event_time_stamp,
            event,
            event_type,
            original_event,
            event_origin,
            state,
            valid: true,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn event_time_stamp(&self) -> EventTimeStamp {
        self.event_time_stamp
    }

    pub fn time_stamp(&self) -> TimeStamp {
        self.event_time_stamp.time_stamp
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn original_event(&self) -> &Event {
        &self.original_event
    }

    pub fn event_origin(&self) -> EventOrigin {
        self.event_origin
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Marks the entry as consumed; the manager will not forward it.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Asks the manager to hold this entry until `time_stamp + delay`.
    pub fn set_input_delay(&mut self, delay: Duration) {
        self.event_time_stamp.input_delay = delay;
    }

    pub fn is_key_down(&self) -> bool {
        self.event_type == EventType::KeyDown
    }

    pub fn is_key_up(&self) -> bool {
        self.event_type == EventType::KeyUp
    }
}
