//! The `from` side of a basic manipulator: which events trigger it, which
//! modifiers must or may be held, and the simultaneous-press options.

use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::modifier_flag_manager::ModifierFlagManager;
use crate::types::{ConsumerKeyCode, KeyCode, ModifierFlag, PointingButton};

/// One switch a `from` definition listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDefinition {
    KeyCode(KeyCode),
    ConsumerKeyCode(ConsumerKeyCode),
    PointingButton(PointingButton),
}

impl EventDefinition {
    pub fn matches(&self, event: &Event) -> bool {
        match (self, event) {
            (EventDefinition::KeyCode(expected), Event::KeyCode(actual)) => expected == actual,
            (EventDefinition::ConsumerKeyCode(expected), Event::ConsumerKeyCode(actual)) => {
                expected == actual
            }
            (EventDefinition::PointingButton(expected), Event::PointingButton(actual)) => {
                expected == actual
            }
            _ => false,
        }
    }
}

/// A modifier name as written in rules; the generic names cover both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierDefinition {
    Any,
    Control,
    Shift,
    Option,
    Command,
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

impl ModifierDefinition {
    /// Concrete flags that satisfy this definition.
    pub fn flags(self) -> &'static [ModifierFlag] {
        use ModifierFlag as F;
        match self {
            ModifierDefinition::Any => &F::ALL,
            ModifierDefinition::Control => &[F::LeftControl, F::RightControl],
            ModifierDefinition::Shift => &[F::LeftShift, F::RightShift],
            ModifierDefinition::Option => &[F::LeftOption, F::RightOption],
            ModifierDefinition::Command => &[F::LeftCommand, F::RightCommand],
            ModifierDefinition::CapsLock => &[F::CapsLock],
            ModifierDefinition::LeftControl => &[F::LeftControl],
            ModifierDefinition::LeftShift => &[F::LeftShift],
            ModifierDefinition::LeftOption => &[F::LeftOption],
            ModifierDefinition::LeftCommand => &[F::LeftCommand],
            ModifierDefinition::RightControl => &[F::RightControl],
            ModifierDefinition::RightShift => &[F::RightShift],
            ModifierDefinition::RightOption => &[F::RightOption],
            ModifierDefinition::RightCommand => &[F::RightCommand],
            ModifierDefinition::Fn => &[F::Fn],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FromModifiersDefinition {
    #[serde(default)]
    pub mandatory: Vec<ModifierDefinition>,
    #[serde(default)]
    pub optional: Vec<ModifierDefinition>,
}

impl FromModifiersDefinition {
    /// Checks the held modifiers against this definition.
    ///
    /// Returns the held flags that satisfied `mandatory` (they are released
    /// around the posted events), or `None` when a mandatory modifier is
    /// missing or an unlisted modifier is held.
    pub fn test(&self, manager: &ModifierFlagManager) -> Option<Vec<ModifierFlag>> {
        let pressed = manager.pressed_modifier_flags();

        let mut matched = Vec::new();
        for definition in &self.mandatory {
            let hits: Vec<ModifierFlag> = definition
                .flags()
                .iter()
                .copied()
                .filter(|flag| pressed.contains(flag))
                .collect();
            if hits.is_empty() {
                return None;
            }
            for flag in hits {
                if !matched.contains(&flag) {
                    matched.push(flag);
                }
            }
        }

        if self.optional.contains(&ModifierDefinition::Any) {
            return Some(matched);
        }

        let unexpected = pressed.iter().any(|flag| {
            !matched.contains(flag) && !self.optional.iter().any(|o| o.flags().contains(flag))
        });
        if unexpected {
            None
        } else {
            Some(matched)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrder {
    #[default]
    Insensitive,
    Strict,
    StrictInverse,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUpWhen {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimultaneousOptions {
    /// Cancel the combination when an unrelated key goes down mid-gesture.
    pub detect_key_down_uninterruptedly: bool,
    pub key_down_order: KeyOrder,
    pub key_up_order: KeyOrder,
    pub key_up_when: KeyUpWhen,
    pub to_after_key_up: Vec<super::to_event::ToEventDefinition>,
}

impl KeyOrder {
    /// Whether the `position`-th observed event may be definition `index` of `count`.
    pub fn allows(self, position: usize, index: usize, count: usize) -> bool {
        match self {
            KeyOrder::Insensitive => true,
            KeyOrder::Strict => index == position,
            KeyOrder::StrictInverse => index + position + 1 == count,
        }
    }
}

/// The complete `from` side of a basic manipulator.
#[derive(Debug, Clone, PartialEq)]
pub struct FromEventDefinition {
    pub event_definitions: Vec<EventDefinition>,
    pub modifiers: FromModifiersDefinition,
    pub simultaneous_options: SimultaneousOptions,
}

impl FromEventDefinition {
    pub fn single(definition: EventDefinition) -> Self {
        Self {
            event_definitions: vec![definition],
            modifiers: FromModifiersDefinition::default(),
            simultaneous_options: SimultaneousOptions::default(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: FromModifiersDefinition) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn is_simultaneous(&self) -> bool {
        self.event_definitions.len() > 1
    }

    /// Index of the definition that `event` matches, if any.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.event_definitions.iter().position(|d| d.matches(event))
    }
}
