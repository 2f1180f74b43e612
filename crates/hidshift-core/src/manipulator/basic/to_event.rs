//! The `to` side of a basic manipulator: what gets posted.

use crate::environment::{InputSourceProperties, VariableValue};
use crate::event::{Event, StickyModifierKind};
use crate::types::{ConsumerKeyCode, KeyCode, ModifierFlag, PointingButton};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToEvent {
    KeyCode(KeyCode),
    ConsumerKeyCode(ConsumerKeyCode),
    PointingButton(PointingButton),
    ShellCommand(String),
    SelectInputSource(Vec<InputSourceProperties>),
    SetVariable { name: String, value: VariableValue },
    StickyModifier { flag: ModifierFlag, kind: StickyModifierKind },
}

/// One posted event plus the modifiers wrapped around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToEventDefinition {
    pub event: ToEvent,
    pub modifiers: Vec<ModifierFlag>,
}

impl ToEventDefinition {
    pub fn new(event: ToEvent) -> Self {
        Self {
            event,
            modifiers: Vec::new(),
        }
    }

    pub fn key(key_code: KeyCode) -> Self {
        Self::new(ToEvent::KeyCode(key_code))
    }

    pub fn with_modifiers(mut self, modifiers: Vec<ModifierFlag>) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn make_event(&self) -> Event {
        match &self.event {
            ToEvent::KeyCode(key_code) => Event::KeyCode(*key_code),
            ToEvent::ConsumerKeyCode(key_code) => Event::ConsumerKeyCode(*key_code),
            ToEvent::PointingButton(button) => Event::PointingButton(*button),
            ToEvent::ShellCommand(command) => Event::ShellCommand(command.clone()),
            ToEvent::SelectInputSource(sources) => Event::SelectInputSource(sources.clone()),
            ToEvent::SetVariable { name, value } => Event::SetVariable {
                name: name.clone(),
                value: value.clone(),
            },
            ToEvent::StickyModifier { flag, kind } => Event::StickyModifier {
                flag: *flag,
                kind: *kind,
            },
        }
    }

    /// True when the posted event is itself a modifier key.
    pub fn is_modifier_key(&self) -> bool {
        matches!(&self.event, ToEvent::KeyCode(key_code) if key_code.modifier_flag().is_some())
    }
}
