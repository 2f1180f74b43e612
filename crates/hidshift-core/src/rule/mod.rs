//! Building manipulators from JSON rule files.
//!
//! A rule file is a JSON array of rules (or an object with a `"rules"`
//! array):
//!
//! ```json
//! [
//!   {
//!     "description": "caps lock to escape when alone, control when held",
//!     "manipulators": [
//!       {
//!         "type": "basic",
//!         "from": { "key_code": "caps_lock", "modifiers": { "optional": ["any"] } },
//!         "to": [{ "key_code": "left_control" }],
//!         "to_if_alone": [{ "key_code": "escape" }]
//!       }
//!     ]
//!   }
//! ]
//! ```
//!
//! Each rule is built all-or-nothing.  A rule that fails to parse or
//! validate is reported in [`LoadedRules::errors`] and skipped; the other
//! rules still load.  Building is deterministic and has no side effects.

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::condition::{ConditionError, RegexCache};
use crate::manipulator::basic::BasicParameters;
use crate::manipulator::manager::ManipulatorManager;
use crate::manipulator::Manipulator;

pub mod definition;

use definition::RuleDefinition;

/// Why a single rule was rejected.
#[derive(Debug, Error)]
pub enum RuleErrorKind {
    #[error("malformed rule: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid `from`: {0}")]
    InvalidFromEvent(String),

    #[error("invalid `to`: {0}")]
    InvalidToEvent(String),

    #[error("invalid `sticky_modifier`: {0}")]
    InvalidStickyModifier(String),

    #[error("invalid condition: {0}")]
    Condition(#[from] ConditionError),
}

#[derive(Debug, Error)]
#[error("rule #{index} `{description}`: {kind}")]
pub struct RuleError {
    pub index: usize,
    pub description: String,
    #[source]
    pub kind: RuleErrorKind,
}

/// Errors that reject the whole rule file.
#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("rule file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rule file must be an array of rules or an object with a `rules` array")]
    NotAnArray,
}

/// Result of loading a rule file.
#[derive(Debug, Default)]
pub struct LoadedRules {
    pub manipulators: Vec<Manipulator>,
    pub errors: Vec<RuleError>,
}

impl LoadedRules {
    pub fn into_manager(self) -> ManipulatorManager {
        ManipulatorManager::new(self.manipulators)
    }
}

/// Parses `json` and builds the manipulators of every valid rule.
///
/// `defaults` supplies the timing parameters a manipulator does not
/// override.
pub fn load_rules(json: &str, defaults: &BasicParameters) -> Result<LoadedRules, RuleSetError> {
    let root: Value = serde_json::from_str(json)?;
    let rules = match root {
        Value::Array(rules) => rules,
        Value::Object(mut object) => match object.remove("rules") {
            Some(Value::Array(rules)) => rules,
            _ => return Err(RuleSetError::NotAnArray),
        },
        _ => return Err(RuleSetError::NotAnArray),
    };

    let mut cache = RegexCache::new();
    let mut loaded = LoadedRules::default();

    for (index, value) in rules.into_iter().enumerate() {
        let description = value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let built = serde_json::from_value::<RuleDefinition>(value)
            .map_err(RuleErrorKind::from)
            .and_then(|rule| rule.build(defaults, &mut cache));

        match built {
            Ok(manipulators) => loaded.manipulators.extend(manipulators),
            Err(kind) => {
                warn!(index, %description, "skipping rule: {kind}");
                loaded.errors.push(RuleError {
                    index,
                    description,
                    kind,
                });
            }
        }
    }

    info!(
        manipulators = loaded.manipulators.len(),
        skipped = loaded.errors.len(),
        "rules loaded"
    );
    Ok(loaded)
}
