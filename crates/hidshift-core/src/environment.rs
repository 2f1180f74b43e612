//! Pipeline-scoped facts that conditions read.
//!
//! The [`Environment`] is owned by the pipeline and mutated only through the
//! setters below, always from the pipeline's own task.  Conditions receive a
//! shared reference and never write to it.
//!
//! When a snapshot path is configured with
//! [`Environment::enable_json_output`], every mutation mirrors the whole
//! environment into a pretty-printed JSON file for external inspection.
//! Snapshot failures are logged and otherwise ignored: the file is a
//! diagnostic aid, not part of the event path.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::Event;
use crate::types::DeviceId;

/// Identity of the application that currently has keyboard focus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontmostApplication {
    #[serde(default)]
    pub bundle_identifier: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Properties of the active keyboard input source (layout / IME).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSourceProperties {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub input_source_id: Option<String>,
    #[serde(default)]
    pub input_mode_id: Option<String>,
}

/// Value of a named variable set by rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

impl Default for VariableValue {
    /// Unset variables read as integer zero.
    fn default() -> Self {
        VariableValue::Integer(0)
    }
}

/// Descriptive properties of a connected device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub device_id: DeviceId,
    #[serde(default)]
    pub vendor_id: Option<u32>,
    #[serde(default)]
    pub product_id: Option<u32>,
    #[serde(default)]
    pub location_id: Option<u32>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub is_keyboard: bool,
    #[serde(default)]
    pub is_pointing_device: bool,
    #[serde(default)]
    pub is_game_pad: bool,
    #[serde(default)]
    pub is_built_in: bool,
}

/// Externally observed facts plus rule variables.
#[derive(Debug, Default)]
pub struct Environment {
    frontmost_application: Option<FrontmostApplication>,
    input_source_properties: Option<InputSourceProperties>,
    keyboard_type: Option<String>,
    variables: HashMap<String, VariableValue>,
    devices: HashMap<DeviceId, DeviceProperties>,
    json_output_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct EnvironmentSnapshot<'a> {
    frontmost_application: &'a Option<FrontmostApplication>,
    input_source_properties: &'a Option<InputSourceProperties>,
    keyboard_type: &'a Option<String>,
    variables: BTreeMap<&'a str, &'a VariableValue>,
    devices: Vec<&'a DeviceProperties>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn frontmost_application(&self) -> Option<&FrontmostApplication> {
        self.frontmost_application.as_ref()
    }

    pub fn input_source_properties(&self) -> Option<&InputSourceProperties> {
        self.input_source_properties.as_ref()
    }

    pub fn keyboard_type(&self) -> Option<&str> {
        self.keyboard_type.as_deref()
    }

    /// Returns the variable's value, or integer zero when it was never set.
    pub fn variable(&self, name: &str) -> VariableValue {
        self.variables.get(name).cloned().unwrap_or_default()
    }

    pub fn device(&self, device_id: DeviceId) -> Option<&DeviceProperties> {
        self.devices.get(&device_id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceProperties> {
        self.devices.values()
    }

    // ── Setters ──────────────────────────────────────────────────────────────

    pub fn set_frontmost_application(&mut self, application: FrontmostApplication) {
        self.frontmost_application = Some(application);
        self.write_json_output();
    }

    pub fn set_input_source_properties(&mut self, properties: InputSourceProperties) {
        self.input_source_properties = Some(properties);
        self.write_json_output();
    }

    pub fn set_keyboard_type(&mut self, keyboard_type: impl Into<String>) {
        self.keyboard_type = Some(keyboard_type.into());
        self.write_json_output();
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: VariableValue) {
        self.variables.insert(name.into(), value);
        self.write_json_output();
    }

    pub fn insert_device(&mut self, properties: DeviceProperties) {
        self.devices.insert(properties.device_id, properties);
        self.write_json_output();
    }

    pub fn remove_device(&mut self, device_id: DeviceId) {
        if self.devices.remove(&device_id).is_some() {
            self.write_json_output();
        }
    }

    /// Applies an environment-changing event that travelled through a queue.
    ///
    /// Returns `true` when the event was an environment change.
    pub fn apply_event(&mut self, event: &Event) -> bool {
        match event {
            Event::SetVariable { name, value } => self.set_variable(name.clone(), value.clone()),
            Event::FrontmostApplicationChanged(application) => {
                self.set_frontmost_application(application.clone())
            }
            Event::InputSourceChanged(properties) => {
                self.set_input_source_properties(properties.clone())
            }
            Event::KeyboardTypeChanged(keyboard_type) => {
                self.set_keyboard_type(keyboard_type.clone())
            }
            _ => return false,
        }
        true
    }

    // ── Diagnostic snapshot ──────────────────────────────────────────────────

    /// Mirrors the environment to `path` now and after every later change.
    pub fn enable_json_output(&mut self, path: impl AsRef<Path>) {
        self.json_output_path = Some(path.as_ref().to_path_buf());
        self.write_json_output();
    }

    pub fn disable_json_output(&mut self) {
        self.json_output_path = None;
    }

    fn snapshot(&self) -> EnvironmentSnapshot<'_> {
        let mut devices: Vec<&DeviceProperties> = self.devices.values().collect();
        devices.sort_by_key(|d| d.device_id);
        EnvironmentSnapshot {
            frontmost_application: &self.frontmost_application,
            input_source_properties: &self.input_source_properties,
            keyboard_type: &self.keyboard_type,
            variables: self
                .variables
                .iter()
                .map(|(name, value)| (name.as_str(), value))
                .collect(),
            devices,
        }
    }

    fn write_json_output(&self) {
        let Some(path) = &self.json_output_path else {
            return;
        };
        let json = match serde_json::to_string_pretty(&self.snapshot()) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize environment snapshot: {e}");
                return;
            }
        };
        match std::fs::write(path, json) {
            Ok(()) => debug!(path = %path.display(), "environment snapshot written"),
            Err(e) => warn!(path = %path.display(), "failed to write environment snapshot: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_variable_reads_as_integer_zero() {
        let env = Environment::new();
        assert_eq!(env.variable("mode"), VariableValue::Integer(0));
    }

    #[test]
    fn test_apply_event_updates_variables_and_frontmost_application() {
        // Arrange
        let mut env = Environment::new();
        let app = FrontmostApplication {
            bundle_identifier: Some("com.example.editor".to_string()),
            file_path: None,
        };

        // Act
        let applied_variable = env.apply_event(&Event::SetVariable {
            name: "vi_mode".to_string(),
            value: VariableValue::Bool(true),
        });
        let applied_app = env.apply_event(&Event::FrontmostApplicationChanged(app.clone()));
        let applied_motion = env.apply_event(&Event::DeviceUngrabbed);

        // Assert
        assert!(applied_variable);
        assert!(applied_app);
        assert!(!applied_motion);
        assert_eq!(env.variable("vi_mode"), VariableValue::Bool(true));
        assert_eq!(env.frontmost_application(), Some(&app));
    }

    #[test]
    fn test_device_directory_insert_and_remove() {
        let mut env = Environment::new();
        env.insert_device(DeviceProperties {
            device_id: DeviceId(7),
            is_keyboard: true,
            ..Default::default()
        });
        assert!(env.device(DeviceId(7)).is_some());

        env.remove_device(DeviceId(7));
        assert!(env.device(DeviceId(7)).is_none());
    }

    #[test]
    fn test_json_output_mirrors_changes_to_file() {
        // Arrange
        let path = std::env::temp_dir().join(format!(
            "hidshift-environment-{}.json",
            std::process::id()
        ));
        let mut env = Environment::new();
        env.enable_json_output(&path);

        // Act
        env.set_variable("layer", VariableValue::Integer(2));
        env.set_keyboard_type("ansi");

        // Assert
        let content = std::fs::read_to_string(&path).expect("snapshot should exist");
        let value: serde_json::Value = serde_json::from_str(&content).expect("valid json");
        assert_eq!(value["variables"]["layer"], 2);
        assert_eq!(value["keyboard_type"], "ansi");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unwritable_json_output_does_not_panic() {
        let mut env = Environment::new();
        env.enable_json_output("/nonexistent-directory/hidshift/env.json");
        env.set_variable("x", VariableValue::Integer(1));
        assert_eq!(env.variable("x"), VariableValue::Integer(1));
    }
}
