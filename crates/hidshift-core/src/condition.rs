//! Conditions that gate manipulators on environment facts.
//!
//! A [`Condition`] is a pure predicate over `(entry, environment)`.  The set
//! of kinds is closed (it is defined by the rule schema), so conditions are a
//! plain enum matched in [`Condition::evaluate`].
//!
//! Patterns are compiled once when the rule is built.  [`RegexCache`] hands
//! out the same compiled [`Regex`] for identical pattern strings across all
//! rules of a rule set.
//!
//! Evaluation can fail (e.g. a device condition for a device the environment
//! does not know).  [`ConditionManager::is_fulfilled`] turns any such failure
//! into "not fulfilled" so a broken condition only disables its own rule.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::environment::{DeviceProperties, Environment, InputSourceProperties, VariableValue};
use crate::event::{Entry, EntryState};
use crate::types::DeviceId;

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{0} is not a connected device")]
    UnknownDevice(DeviceId),
}

/// Compiled patterns keyed by their source string.
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: HashMap<String, Regex>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&mut self, pattern: &str) -> Result<Regex, ConditionError> {
        if let Some(regex) = self.compiled.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern).map_err(|source| ConditionError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.compiled.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    If,
    Unless,
}

impl Polarity {
    fn apply(self, matched: bool) -> bool {
        match self {
            Polarity::If => matched,
            Polarity::Unless => !matched,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceConditionKind {
    /// The entry's device matches.
    If,
    /// The entry's device does not match.
    Unless,
    /// Some connected device matches.
    ExistsIf,
    /// No connected device matches.
    ExistsUnless,
}

/// Device properties a device condition compares; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentifiersMatcher {
    #[serde(default)]
    pub vendor_id: Option<u32>,
    #[serde(default)]
    pub product_id: Option<u32>,
    #[serde(default)]
    pub location_id: Option<u32>,
    #[serde(default)]
    pub is_keyboard: Option<bool>,
    #[serde(default)]
    pub is_pointing_device: Option<bool>,
    #[serde(default)]
    pub is_game_pad: Option<bool>,
    #[serde(default)]
    pub is_built_in: Option<bool>,
}

impl DeviceIdentifiersMatcher {
    pub fn matches(&self, device: &DeviceProperties) -> bool {
        fn field<T: PartialEq>(expected: &Option<T>, actual: &Option<T>) -> bool {
            expected.as_ref().map_or(true, |e| actual.as_ref() == Some(e))
        }
        fn flag(expected: Option<bool>, actual: bool) -> bool {
            expected.map_or(true, |e| e == actual)
        }

        field(&self.vendor_id, &device.vendor_id)
            && field(&self.product_id, &device.product_id)
            && field(&self.location_id, &device.location_id)
            && flag(self.is_keyboard, device.is_keyboard)
            && flag(self.is_pointing_device, device.is_pointing_device)
            && flag(self.is_game_pad, device.is_game_pad)
            && flag(self.is_built_in, device.is_built_in)
    }
}

/// Per-field patterns for input source conditions; unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct InputSourceMatcher {
    pub language: Option<Regex>,
    pub input_source_id: Option<Regex>,
    pub input_mode_id: Option<Regex>,
}

impl InputSourceMatcher {
    pub fn matches(&self, properties: &InputSourceProperties) -> bool {
        fn field(pattern: &Option<Regex>, value: &Option<String>) -> bool {
            match pattern {
                None => true,
                Some(regex) => value.as_deref().is_some_and(|v| regex.is_match(v)),
            }
        }

        field(&self.language, &properties.language)
            && field(&self.input_source_id, &properties.input_source_id)
            && field(&self.input_mode_id, &properties.input_mode_id)
    }
}

#[derive(Debug, Clone)]
pub enum Condition {
    FrontmostApplication {
        polarity: Polarity,
        bundle_identifiers: Vec<Regex>,
        file_paths: Vec<Regex>,
    },
    InputSource {
        polarity: Polarity,
        input_sources: Vec<InputSourceMatcher>,
    },
    Device {
        kind: DeviceConditionKind,
        identifiers: Vec<DeviceIdentifiersMatcher>,
    },
    KeyboardType {
        polarity: Polarity,
        keyboard_types: Vec<String>,
    },
    Variable {
        polarity: Polarity,
        name: String,
        value: VariableValue,
    },
    /// Tests whether an earlier manipulator already changed the entry.
    EventChanged { polarity: Polarity, value: bool },
}

impl Condition {
    pub fn evaluate(&self, entry: &Entry, environment: &Environment) -> Result<bool, ConditionError> {
        match self {
            Condition::FrontmostApplication {
                polarity,
                bundle_identifiers,
                file_paths,
            } => {
                let matched = environment.frontmost_application().is_some_and(|app| {
                    any_match(bundle_identifiers, app.bundle_identifier.as_deref())
                        || any_match(file_paths, app.file_path.as_deref())
                });
                Ok(polarity.apply(matched))
            }

            Condition::InputSource {
                polarity,
                input_sources,
            } => {
                let matched = environment
                    .input_source_properties()
                    .is_some_and(|props| input_sources.iter().any(|m| m.matches(props)));
                Ok(polarity.apply(matched))
            }

            Condition::Device { kind, identifiers } => match kind {
                DeviceConditionKind::If | DeviceConditionKind::Unless => {
                    let device = environment
                        .device(entry.device_id())
                        .ok_or(ConditionError::UnknownDevice(entry.device_id()))?;
                    let matched = identifiers.iter().any(|m| m.matches(device));
                    Ok(if *kind == DeviceConditionKind::If {
                        matched
                    } else {
                        !matched
                    })
                }
                DeviceConditionKind::ExistsIf | DeviceConditionKind::ExistsUnless => {
                    let exists = environment
                        .devices()
                        .any(|device| identifiers.iter().any(|m| m.matches(device)));
                    Ok(if *kind == DeviceConditionKind::ExistsIf {
                        exists
                    } else {
                        !exists
                    })
                }
            },

            Condition::KeyboardType {
                polarity,
                keyboard_types,
            } => {
                let matched = environment
                    .keyboard_type()
                    .is_some_and(|current| keyboard_types.iter().any(|t| t == current));
                Ok(polarity.apply(matched))
            }

            Condition::Variable {
                polarity,
                name,
                value,
            } => Ok(polarity.apply(environment.variable(name) == *value)),

            Condition::EventChanged { polarity, value } => {
                let changed = entry.state() == EntryState::Manipulated;
                Ok(polarity.apply(changed == *value))
            }
        }
    }
}

fn any_match(patterns: &[Regex], value: Option<&str>) -> bool {
    value.is_some_and(|v| patterns.iter().any(|regex| regex.is_match(v)))
}

/// All conditions of one manipulator; every one must hold.
#[derive(Debug, Clone, Default)]
pub struct ConditionManager {
    conditions: Vec<Condition>,
}

impl ConditionManager {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// True when every condition holds; evaluation errors count as false.
    pub fn is_fulfilled(&self, entry: &Entry, environment: &Environment) -> bool {
        self.conditions.iter().all(|condition| {
            match condition.evaluate(entry, environment) {
                Ok(fulfilled) => fulfilled,
                Err(e) => {
                    debug!("condition not fulfilled: {e}");
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::FrontmostApplication;
    use crate::event::{Event, EventOrigin, EventType};
    use crate::types::{KeyCode, TimeStamp};

    fn key_down(device: u64) -> Entry {
        Entry::new(
            DeviceId(device),
            TimeStamp(1000),
            Event::KeyCode(KeyCode::A),
            EventType::KeyDown,
            EventOrigin::Grabbed,
        )
    }

    fn environment_with_app(bundle_identifier: &str) -> Environment {
        let mut env = Environment::new();
        env.set_frontmost_application(FrontmostApplication {
            bundle_identifier: Some(bundle_identifier.to_string()),
            file_path: Some("/Applications/Terminal.app".to_string()),
        });
        env
    }

    #[test]
    fn test_regex_cache_reuses_compiled_patterns() {
        // Arrange
        let mut cache = RegexCache::new();

        // Act
        cache.get_or_compile("^com\\.apple\\.").expect("valid");
        cache.get_or_compile("^com\\.apple\\.").expect("valid");
        cache.get_or_compile("Terminal$").expect("valid");

        // Assert
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalid_pattern_is_a_construction_error() {
        let mut cache = RegexCache::new();
        let result = cache.get_or_compile("(unclosed");
        assert!(matches!(result, Err(ConditionError::InvalidPattern { .. })));
    }

    #[test]
    fn test_frontmost_application_if_and_unless() {
        // Arrange
        let mut cache = RegexCache::new();
        let pattern = cache.get_or_compile("^com\\.apple\\.Terminal$").expect("valid");
        let env = environment_with_app("com.apple.Terminal");
        let entry = key_down(1);

        let if_condition = Condition::FrontmostApplication {
            polarity: Polarity::If,
            bundle_identifiers: vec![pattern.clone()],
            file_paths: vec![],
        };
        let unless_condition = Condition::FrontmostApplication {
            polarity: Polarity::Unless,
            bundle_identifiers: vec![pattern],
            file_paths: vec![],
        };

        // Act / Assert
        assert!(if_condition.evaluate(&entry, &env).expect("ok"));
        assert!(!unless_condition.evaluate(&entry, &env).expect("ok"));
    }

    #[test]
    fn test_frontmost_application_matches_file_path() {
        let mut cache = RegexCache::new();
        let condition = Condition::FrontmostApplication {
            polarity: Polarity::If,
            bundle_identifiers: vec![],
            file_paths: vec![cache.get_or_compile("Terminal\\.app$").expect("valid")],
        };
        let env = environment_with_app("com.example.other");

        assert!(condition.evaluate(&key_down(1), &env).expect("ok"));
    }

    #[test]
    fn test_unset_variable_matches_integer_zero() {
        let condition = Condition::Variable {
            polarity: Polarity::If,
            name: "layer".to_string(),
            value: VariableValue::Integer(0),
        };
        assert!(condition.evaluate(&key_down(1), &Environment::new()).expect("ok"));
    }

    #[test]
    fn test_device_condition_for_unknown_device_is_not_fulfilled() {
        // Arrange
        let condition = Condition::Device {
            kind: DeviceConditionKind::Unless,
            identifiers: vec![DeviceIdentifiersMatcher {
                vendor_id: Some(0x05ac),
                ..Default::default()
            }],
        };
        let manager = ConditionManager::new(vec![condition.clone()]);
        let env = Environment::new();

        // Act
        let raw = condition.evaluate(&key_down(9), &env);
        let fulfilled = manager.is_fulfilled(&key_down(9), &env);

        // Assert
        assert!(matches!(raw, Err(ConditionError::UnknownDevice(DeviceId(9)))));
        assert!(!fulfilled);
    }

    #[test]
    fn test_device_if_matches_entry_device_properties() {
        let mut env = Environment::new();
        env.insert_device(DeviceProperties {
            device_id: DeviceId(3),
            vendor_id: Some(0x05ac),
            product_id: Some(0x0250),
            is_keyboard: true,
            ..Default::default()
        });
        let condition = Condition::Device {
            kind: DeviceConditionKind::If,
            identifiers: vec![DeviceIdentifiersMatcher {
                vendor_id: Some(0x05ac),
                is_keyboard: Some(true),
                ..Default::default()
            }],
        };

        assert!(condition.evaluate(&key_down(3), &env).expect("ok"));
    }

    #[test]
    fn test_device_exists_ignores_entry_device() {
        let mut env = Environment::new();
        env.insert_device(DeviceProperties {
            device_id: DeviceId(4),
            is_game_pad: true,
            ..Default::default()
        });
        let exists_if = Condition::Device {
            kind: DeviceConditionKind::ExistsIf,
            identifiers: vec![DeviceIdentifiersMatcher {
                is_game_pad: Some(true),
                ..Default::default()
            }],
        };

        assert!(exists_if.evaluate(&key_down(99), &env).expect("ok"));
    }

    #[test]
    fn test_event_changed_reads_entry_state() {
        let condition = Condition::EventChanged {
            polarity: Polarity::If,
            value: false,
        };
        assert!(condition.evaluate(&key_down(1), &Environment::new()).expect("ok"));
    }

    #[test]
    fn test_input_source_matcher_requires_every_set_field() {
        let mut cache = RegexCache::new();
        let matcher = InputSourceMatcher {
            language: Some(cache.get_or_compile("^en$").expect("valid")),
            input_source_id: Some(cache.get_or_compile("US$").expect("valid")),
            input_mode_id: None,
        };
        let us = InputSourceProperties {
            language: Some("en".to_string()),
            input_source_id: Some("com.apple.keylayout.US".to_string()),
            input_mode_id: None,
        };
        let dvorak = InputSourceProperties {
            input_source_id: Some("com.apple.keylayout.Dvorak".to_string()),
            ..us.clone()
        };

        assert!(matcher.matches(&us));
        assert!(!matcher.matches(&dvorak));
    }

    #[test]
    fn test_empty_condition_manager_is_always_fulfilled() {
        let manager = ConditionManager::default();
        assert!(manager.is_fulfilled(&key_down(1), &Environment::new()));
    }
}
