//! Device data model.
//!
//! Devices are loaded once per request batch from an external catalog and
//! stay immutable while a resolution runs. Every field is plain data; the
//! only behavior here is simple derived accessors.

use serde::{Deserialize, Serialize};

/// Inclusive numeric range accepted by a command argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub minimum: f64,
    pub maximum: f64,
    /// Unit label, empty when dimensionless.
    #[serde(default)]
    pub unit: String,
}

impl ValueRange {
    /// Create a new range with an empty unit.
    pub fn new(minimum: f64, maximum: f64) -> Self {
        Self {
            minimum,
            maximum,
            unit: String::new(),
        }
    }

    /// Set the unit label.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// One enumerated value accepted by a command argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueOption {
    pub value: String,
    #[serde(default)]
    pub description: String,
}

impl ValueOption {
    /// Create an option with an empty description.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: String::new(),
        }
    }

    /// Set the human description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One controllable command exposed by a device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Declared argument type (e.g. "integer", "string"), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_range: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_options: Vec<ValueOption>,
}

impl CommandSpec {
    /// Create a command spec with just an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the human description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the declared argument type.
    pub fn with_value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = Some(value_type.into());
        self
    }

    /// Set the numeric range.
    pub fn with_value_range(mut self, range: ValueRange) -> Self {
        self.value_range = Some(range);
        self
    }

    /// Set the enumerated values.
    pub fn with_value_options(mut self, options: Vec<ValueOption>) -> Self {
        self.value_options = options;
        self
    }
}

/// A resolvable smart-home device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    /// Room the device is assigned to; empty when unassigned.
    #[serde(default)]
    pub room: String,
    /// Catalog category, canonicalized through the taxonomy during gating.
    #[serde(default)]
    pub category: String,
    /// Links the device to a capability spec in the spec index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandSpec>,
}

impl Device {
    /// Create a device with the given id and name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            room: String::new(),
            category: String::new(),
            profile_id: None,
            commands: Vec::new(),
        }
    }

    /// Set the room assignment.
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    /// Set the catalog category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the capability-spec profile id.
    pub fn with_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = Some(profile_id.into());
        self
    }

    /// Set the per-device command specs.
    pub fn with_commands(mut self, commands: Vec<CommandSpec>) -> Self {
        self.commands = commands;
        self
    }

    /// Label used in user-facing option examples.
    ///
    /// Prefers "room/name", falls back to the bare name, then to the id.
    pub fn label(&self) -> String {
        let name = if self.name.is_empty() {
            self.id.as_str()
        } else {
            self.name.as_str()
        };
        if self.room.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.room, name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_builder() {
        let device = Device::new("lamp-1", "主灯")
            .with_room("客厅")
            .with_category("Light")
            .with_profile("p-light")
            .with_commands(vec![CommandSpec::new("switch-on").with_description("turn on")]);

        assert_eq!(device.id, "lamp-1");
        assert_eq!(device.room, "客厅");
        assert_eq!(device.profile_id.as_deref(), Some("p-light"));
        assert_eq!(device.commands.len(), 1);
    }

    #[test]
    fn test_device_label() {
        let full = Device::new("d1", "主灯").with_room("客厅");
        assert_eq!(full.label(), "客厅/主灯");

        let no_room = Device::new("d2", "主灯");
        assert_eq!(no_room.label(), "主灯");

        let bare = Device::new("d3", "");
        assert_eq!(bare.label(), "d3");
    }

    #[test]
    fn test_command_spec_serde_roundtrip() {
        let spec = CommandSpec::new("set-level")
            .with_description("adjust brightness")
            .with_value_type("integer")
            .with_value_range(ValueRange::new(0.0, 100.0).with_unit("%"));

        let text = serde_json::to_string(&spec).unwrap();
        let back: CommandSpec = serde_json::from_str(&text).unwrap();
        assert_eq!(back, spec);
    }
}
