//! Serde shapes of the JSON rule format and their conversion into
//! manipulators.
//!
//! The shapes mirror the file format one to one; `build` methods validate
//! them and produce the runtime types.  Lists that the format allows to be
//! written as a single object (`"to": {…}`) use [`OneOrMany`].

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::condition::{
    Condition, ConditionError, ConditionManager, DeviceConditionKind, DeviceIdentifiersMatcher,
    InputSourceMatcher, Polarity, RegexCache,
};
use crate::environment::{InputSourceProperties, VariableValue};
use crate::event::StickyModifierKind;
use crate::manipulator::basic::from_event::{
    EventDefinition, FromEventDefinition, FromModifiersDefinition, KeyOrder, KeyUpWhen,
    ModifierDefinition, SimultaneousOptions,
};
use crate::manipulator::basic::to_event::{ToEvent, ToEventDefinition};
use crate::manipulator::basic::{BasicManipulator, BasicParameters, ToDelayedAction, ToIfOtherKeyPressed};
use crate::manipulator::mouse_basic::{MouseBasicManipulator, MouseFlip, MouseSwap};
use crate::manipulator::mouse_motion_to_scroll::MouseMotionToScrollManipulator;
use crate::manipulator::Manipulator;
use crate::types::{ConsumerKeyCode, KeyCode, ModifierFlag, PointingButton};

use super::RuleErrorKind;

/// `Many` is tried first so that `[]` is an empty list, not one default item.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RuleDefinition {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub manipulators: Vec<ManipulatorDefinition>,
}

impl RuleDefinition {
    /// Builds every manipulator of the rule, or none of them.
    pub fn build(
        self,
        defaults: &BasicParameters,
        cache: &mut RegexCache,
    ) -> Result<Vec<Manipulator>, RuleErrorKind> {
        self.manipulators
            .into_iter()
            .map(|definition| definition.build(defaults, cache))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManipulatorDefinition {
    Basic(BasicDefinition),
    MouseBasic(MouseBasicDefinition),
    MouseMotionToScroll(MouseMotionToScrollDefinition),
}

impl ManipulatorDefinition {
    pub fn build(self, defaults: &BasicParameters, cache: &mut RegexCache) -> Result<Manipulator, RuleErrorKind> {
        match self {
            ManipulatorDefinition::Basic(basic) => Ok(basic.build(defaults, cache)?.into()),
            ManipulatorDefinition::MouseBasic(mouse) => Ok(mouse.build(cache)?.into()),
            ManipulatorDefinition::MouseMotionToScroll(scroll) => Ok(scroll.build(cache)?.into()),
        }
    }
}

// ── basic ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BasicDefinition {
    pub from: FromDefinition,
    #[serde(default)]
    pub to: OneOrMany<ToDefinition>,
    #[serde(default)]
    pub to_after_key_up: OneOrMany<ToDefinition>,
    #[serde(default)]
    pub to_if_alone: OneOrMany<ToDefinition>,
    #[serde(default)]
    pub to_if_held_down: OneOrMany<ToDefinition>,
    #[serde(default)]
    pub to_delayed_action: Option<ToDelayedActionDefinition>,
    #[serde(default)]
    pub to_if_other_key_pressed: OneOrMany<ToIfOtherKeyPressedDefinition>,
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
    #[serde(default)]
    pub parameters: ParametersDefinition,
}

impl BasicDefinition {
    pub fn build(self, defaults: &BasicParameters, cache: &mut RegexCache) -> Result<BasicManipulator, RuleErrorKind> {
        let from = self.from.build()?;
        let to = build_to_list(self.to)?;
        let parameters = self.parameters.apply(defaults);

        let mut manipulator = BasicManipulator::new(from, to, parameters)
            .with_to_after_key_up(build_to_list(self.to_after_key_up)?)
            .with_to_if_alone(build_to_list(self.to_if_alone)?)
            .with_to_if_held_down(build_to_list(self.to_if_held_down)?)
            .with_to_if_other_key_pressed(
                self.to_if_other_key_pressed
                    .into_vec()
                    .into_iter()
                    .map(ToIfOtherKeyPressedDefinition::build)
                    .collect::<Result<_, _>>()?,
            )
            .with_conditions(build_conditions(self.conditions, cache)?);

        if let Some(action) = self.to_delayed_action {
            manipulator = manipulator.with_to_delayed_action(ToDelayedAction {
                to_if_invoked: build_to_list(action.to_if_invoked)?,
                to_if_canceled: build_to_list(action.to_if_canceled)?,
            });
        }

        Ok(manipulator)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ToDelayedActionDefinition {
    #[serde(default)]
    pub to_if_invoked: OneOrMany<ToDefinition>,
    #[serde(default)]
    pub to_if_canceled: OneOrMany<ToDefinition>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToIfOtherKeyPressedDefinition {
    #[serde(default)]
    pub other_keys: OneOrMany<FromEventItem>,
    #[serde(default)]
    pub to: OneOrMany<ToDefinition>,
}

impl ToIfOtherKeyPressedDefinition {
    pub fn build(self) -> Result<ToIfOtherKeyPressed, RuleErrorKind> {
        let other_keys = self
            .other_keys
            .into_vec()
            .iter()
            .map(|item| {
                item.event_definition()?.ok_or_else(|| {
                    RuleErrorKind::InvalidFromEvent("empty `other_keys` item".to_string())
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(ToIfOtherKeyPressed {
            other_keys,
            to: build_to_list(self.to)?,
        })
    }
}

/// Per-manipulator overrides, keyed as in the file format.
#[derive(Debug, Default, Deserialize)]
pub struct ParametersDefinition {
    #[serde(rename = "basic.simultaneous_threshold_milliseconds", default)]
    pub simultaneous_threshold_milliseconds: Option<u64>,
    #[serde(rename = "basic.to_if_alone_timeout_milliseconds", default)]
    pub to_if_alone_timeout_milliseconds: Option<u64>,
    #[serde(rename = "basic.to_if_held_down_threshold_milliseconds", default)]
    pub to_if_held_down_threshold_milliseconds: Option<u64>,
    #[serde(rename = "basic.to_delayed_action_delay_milliseconds", default)]
    pub to_delayed_action_delay_milliseconds: Option<u64>,
}

impl ParametersDefinition {
    pub fn apply(&self, defaults: &BasicParameters) -> BasicParameters {
        BasicParameters {
            simultaneous_threshold_milliseconds: self
                .simultaneous_threshold_milliseconds
                .unwrap_or(defaults.simultaneous_threshold_milliseconds),
            to_if_alone_timeout_milliseconds: self
                .to_if_alone_timeout_milliseconds
                .unwrap_or(defaults.to_if_alone_timeout_milliseconds),
            to_if_held_down_threshold_milliseconds: self
                .to_if_held_down_threshold_milliseconds
                .unwrap_or(defaults.to_if_held_down_threshold_milliseconds),
            to_delayed_action_delay_milliseconds: self
                .to_delayed_action_delay_milliseconds
                .unwrap_or(defaults.to_delayed_action_delay_milliseconds),
        }
    }
}

// ── from ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct FromEventItem {
    #[serde(default)]
    pub key_code: Option<KeyCode>,
    #[serde(default)]
    pub consumer_key_code: Option<ConsumerKeyCode>,
    #[serde(default)]
    pub pointing_button: Option<PointingButton>,
}

impl FromEventItem {
    fn event_definition(&self) -> Result<Option<EventDefinition>, RuleErrorKind> {
        let mut found = Vec::new();
        if let Some(key_code) = self.key_code {
            found.push(EventDefinition::KeyCode(key_code));
        }
        if let Some(key_code) = self.consumer_key_code {
            found.push(EventDefinition::ConsumerKeyCode(key_code));
        }
        if let Some(button) = self.pointing_button {
            found.push(EventDefinition::PointingButton(button));
        }
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            _ => Err(RuleErrorKind::InvalidFromEvent(
                "more than one event in one `from` item".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SimultaneousOptionsDefinition {
    #[serde(default)]
    pub detect_key_down_uninterruptedly: bool,
    #[serde(default)]
    pub key_down_order: KeyOrder,
    #[serde(default)]
    pub key_up_order: KeyOrder,
    #[serde(default)]
    pub key_up_when: KeyUpWhen,
    #[serde(default)]
    pub to_after_key_up: OneOrMany<ToDefinition>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FromDefinition {
    #[serde(flatten)]
    pub event: FromEventItem,
    #[serde(default)]
    pub simultaneous: Vec<FromEventItem>,
    #[serde(default)]
    pub simultaneous_options: SimultaneousOptionsDefinition,
    #[serde(default)]
    pub modifiers: FromModifiersDefinition,
}

impl FromDefinition {
    pub fn build(self) -> Result<FromEventDefinition, RuleErrorKind> {
        let single = self.event.event_definition()?;

        let event_definitions = match (single, self.simultaneous.is_empty()) {
            (Some(definition), true) => vec![definition],
            (None, false) => {
                let mut definitions = Vec::with_capacity(self.simultaneous.len());
                for item in &self.simultaneous {
                    let definition = item.event_definition()?.ok_or_else(|| {
                        RuleErrorKind::InvalidFromEvent("empty `simultaneous` item".to_string())
                    })?;
                    if definitions.contains(&definition) {
                        return Err(RuleErrorKind::InvalidFromEvent(
                            "duplicate event in `simultaneous`".to_string(),
                        ));
                    }
                    definitions.push(definition);
                }
                definitions
            }
            (Some(_), false) => {
                return Err(RuleErrorKind::InvalidFromEvent(
                    "both a single event and `simultaneous` are set".to_string(),
                ))
            }
            (None, true) => {
                return Err(RuleErrorKind::InvalidFromEvent("no event specified".to_string()))
            }
        };

        let options = self.simultaneous_options;
        Ok(FromEventDefinition {
            event_definitions,
            modifiers: self.modifiers,
            simultaneous_options: SimultaneousOptions {
                detect_key_down_uninterruptedly: options.detect_key_down_uninterruptedly,
                key_down_order: options.key_down_order,
                key_up_order: options.key_up_order,
                key_up_when: options.key_up_when,
                to_after_key_up: build_to_list(options.to_after_key_up)?,
            },
        })
    }
}

// ── to ────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SetVariableDefinition {
    pub name: String,
    pub value: VariableValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToDefinition {
    #[serde(default)]
    pub key_code: Option<KeyCode>,
    #[serde(default)]
    pub consumer_key_code: Option<ConsumerKeyCode>,
    #[serde(default)]
    pub pointing_button: Option<PointingButton>,
    #[serde(default)]
    pub shell_command: Option<String>,
    #[serde(default)]
    pub select_input_source: Option<OneOrMany<InputSourceProperties>>,
    #[serde(default)]
    pub set_variable: Option<SetVariableDefinition>,
    #[serde(default)]
    pub sticky_modifier: Option<BTreeMap<ModifierFlag, StickyModifierKind>>,
    #[serde(default)]
    pub modifiers: OneOrMany<ModifierDefinition>,
}

/// Generic modifier names press the left-hand key.
fn to_modifier_flag(definition: ModifierDefinition) -> Result<ModifierFlag, RuleErrorKind> {
    match definition {
        ModifierDefinition::Any => Err(RuleErrorKind::InvalidToEvent(
            "`any` is not a modifier that can be pressed".to_string(),
        )),
        ModifierDefinition::Control => Ok(ModifierFlag::LeftControl),
        ModifierDefinition::Shift => Ok(ModifierFlag::LeftShift),
        ModifierDefinition::Option => Ok(ModifierFlag::LeftOption),
        ModifierDefinition::Command => Ok(ModifierFlag::LeftCommand),
        concrete => concrete
            .flags()
            .first()
            .copied()
            .ok_or_else(|| RuleErrorKind::InvalidToEvent(format!("unknown modifier {concrete:?}"))),
    }
}

impl ToDefinition {
    pub fn build(self) -> Result<ToEventDefinition, RuleErrorKind> {
        let mut events = Vec::new();
        if let Some(key_code) = self.key_code {
            events.push(ToEvent::KeyCode(key_code));
        }
        if let Some(key_code) = self.consumer_key_code {
            events.push(ToEvent::ConsumerKeyCode(key_code));
        }
        if let Some(button) = self.pointing_button {
            events.push(ToEvent::PointingButton(button));
        }
        if let Some(command) = self.shell_command {
            events.push(ToEvent::ShellCommand(command));
        }
        if let Some(sources) = self.select_input_source {
            events.push(ToEvent::SelectInputSource(sources.into_vec()));
        }
        if let Some(variable) = self.set_variable {
            events.push(ToEvent::SetVariable {
                name: variable.name,
                value: variable.value,
            });
        }
        if let Some(sticky) = self.sticky_modifier {
            let mut entries = sticky.into_iter();
            let (flag, kind) = match (entries.next(), entries.next()) {
                (Some(entry), None) => entry,
                _ => {
                    return Err(RuleErrorKind::InvalidStickyModifier(
                        "exactly one modifier is required".to_string(),
                    ))
                }
            };
            events.push(ToEvent::StickyModifier { flag, kind });
        }

        let event = match (events.pop(), events.is_empty()) {
            (Some(event), true) => event,
            (Some(_), false) => {
                return Err(RuleErrorKind::InvalidToEvent(
                    "more than one event in one `to` item".to_string(),
                ))
            }
            (None, _) => return Err(RuleErrorKind::InvalidToEvent("no event specified".to_string())),
        };

        let modifiers = self
            .modifiers
            .into_vec()
            .into_iter()
            .map(to_modifier_flag)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ToEventDefinition::new(event).with_modifiers(modifiers))
    }
}

fn build_to_list(list: OneOrMany<ToDefinition>) -> Result<Vec<ToEventDefinition>, RuleErrorKind> {
    list.into_vec().into_iter().map(ToDefinition::build).collect()
}

// ── mouse_basic ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct MouseBasicDefinition {
    #[serde(default)]
    pub flip: Vec<MouseFlip>,
    #[serde(default)]
    pub swap: Vec<MouseSwap>,
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
}

impl MouseBasicDefinition {
    pub fn build(self, cache: &mut RegexCache) -> Result<MouseBasicManipulator, RuleErrorKind> {
        Ok(MouseBasicManipulator::new(self.flip, self.swap)
            .with_conditions(build_conditions(self.conditions, cache)?))
    }
}

// ── mouse_motion_to_scroll ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct MouseMotionToScrollFromDefinition {
    #[serde(default)]
    pub modifiers: FromModifiersDefinition,
}

#[derive(Debug, Default, Deserialize)]
pub struct MouseMotionToScrollDefinition {
    #[serde(default)]
    pub from: MouseMotionToScrollFromDefinition,
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
}

impl MouseMotionToScrollDefinition {
    pub fn build(self, cache: &mut RegexCache) -> Result<MouseMotionToScrollManipulator, RuleErrorKind> {
        Ok(MouseMotionToScrollManipulator::new(self.from.modifiers)
            .with_conditions(build_conditions(self.conditions, cache)?))
    }
}

// ── conditions ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct FrontmostApplicationDefinition {
    #[serde(default)]
    pub bundle_identifiers: Vec<String>,
    #[serde(default)]
    pub file_paths: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InputSourceConditionDefinition {
    #[serde(default)]
    pub input_sources: Vec<InputSourceProperties>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceConditionDefinition {
    #[serde(default)]
    pub identifiers: Vec<DeviceIdentifiersMatcher>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KeyboardTypeDefinition {
    #[serde(default)]
    pub keyboard_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    pub value: VariableValue,
}

#[derive(Debug, Deserialize)]
pub struct EventChangedDefinition {
    pub value: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionDefinition {
    FrontmostApplicationIf(FrontmostApplicationDefinition),
    FrontmostApplicationUnless(FrontmostApplicationDefinition),
    InputSourceIf(InputSourceConditionDefinition),
    InputSourceUnless(InputSourceConditionDefinition),
    DeviceIf(DeviceConditionDefinition),
    DeviceUnless(DeviceConditionDefinition),
    DeviceExistsIf(DeviceConditionDefinition),
    DeviceExistsUnless(DeviceConditionDefinition),
    KeyboardTypeIf(KeyboardTypeDefinition),
    KeyboardTypeUnless(KeyboardTypeDefinition),
    VariableIf(VariableDefinition),
    VariableUnless(VariableDefinition),
    EventChangedIf(EventChangedDefinition),
    EventChangedUnless(EventChangedDefinition),
}

fn compile_all(patterns: &[String], cache: &mut RegexCache) -> Result<Vec<regex::Regex>, ConditionError> {
    patterns.iter().map(|p| cache.get_or_compile(p)).collect()
}

fn compile_optional(pattern: &Option<String>, cache: &mut RegexCache) -> Result<Option<regex::Regex>, ConditionError> {
    pattern.as_deref().map(|p| cache.get_or_compile(p)).transpose()
}

fn frontmost_application(
    polarity: Polarity,
    definition: FrontmostApplicationDefinition,
    cache: &mut RegexCache,
) -> Result<Condition, ConditionError> {
    Ok(Condition::FrontmostApplication {
        polarity,
        bundle_identifiers: compile_all(&definition.bundle_identifiers, cache)?,
        file_paths: compile_all(&definition.file_paths, cache)?,
    })
}

fn input_source(
    polarity: Polarity,
    definition: InputSourceConditionDefinition,
    cache: &mut RegexCache,
) -> Result<Condition, ConditionError> {
    let mut input_sources = Vec::with_capacity(definition.input_sources.len());
    for props in &definition.input_sources {
        input_sources.push(InputSourceMatcher {
            language: compile_optional(&props.language, cache)?,
            input_source_id: compile_optional(&props.input_source_id, cache)?,
            input_mode_id: compile_optional(&props.input_mode_id, cache)?,
        });
    }
    Ok(Condition::InputSource {
        polarity,
        input_sources,
    })
}

fn device(kind: DeviceConditionKind, definition: DeviceConditionDefinition) -> Condition {
    Condition::Device {
        kind,
        identifiers: definition.identifiers,
    }
}

impl ConditionDefinition {
    pub fn build(self, cache: &mut RegexCache) -> Result<Condition, ConditionError> {
        use ConditionDefinition as D;

        match self {
            D::FrontmostApplicationIf(d) => frontmost_application(Polarity::If, d, cache),
            D::FrontmostApplicationUnless(d) => frontmost_application(Polarity::Unless, d, cache),
            D::InputSourceIf(d) => input_source(Polarity::If, d, cache),
            D::InputSourceUnless(d) => input_source(Polarity::Unless, d, cache),
            D::DeviceIf(d) => Ok(device(DeviceConditionKind::If, d)),
            D::DeviceUnless(d) => Ok(device(DeviceConditionKind::Unless, d)),
            D::DeviceExistsIf(d) => Ok(device(DeviceConditionKind::ExistsIf, d)),
            D::DeviceExistsUnless(d) => Ok(device(DeviceConditionKind::ExistsUnless, d)),
            D::KeyboardTypeIf(d) => Ok(Condition::KeyboardType {
                polarity: Polarity::If,
                keyboard_types: d.keyboard_types,
            }),
            D::KeyboardTypeUnless(d) => Ok(Condition::KeyboardType {
                polarity: Polarity::Unless,
                keyboard_types: d.keyboard_types,
            }),
            D::VariableIf(d) => Ok(Condition::Variable {
                polarity: Polarity::If,
                name: d.name,
                value: d.value,
            }),
            D::VariableUnless(d) => Ok(Condition::Variable {
                polarity: Polarity::Unless,
                name: d.name,
                value: d.value,
            }),
            D::EventChangedIf(d) => Ok(Condition::EventChanged {
                polarity: Polarity::If,
                value: d.value,
            }),
            D::EventChangedUnless(d) => Ok(Condition::EventChanged {
                polarity: Polarity::Unless,
                value: d.value,
            }),
        }
    }
}

fn build_conditions(
    definitions: Vec<ConditionDefinition>,
    cache: &mut RegexCache,
) -> Result<ConditionManager, RuleErrorKind> {
    let conditions = definitions
        .into_iter()
        .map(|d| d.build(cache))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ConditionManager::new(conditions))
}
