//! Capability spec index.
//!
//! A profile describes the capability surface shared by every device
//! manufactured against it. The index maps profile ids to capability docs
//! and is the source of truth for bulk target selection and compatibility
//! signatures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use lares_core::Result;

use crate::model::{Device, ValueOption, ValueRange};

/// Searchable description of one capability inside a profile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CapabilityDoc {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Declared argument type, when the profile states one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_range: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_options: Vec<ValueOption>,
    /// Option descriptions lifted out for corpus building.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_descriptions: Vec<String>,
}

impl CapabilityDoc {
    /// Create a doc with just an id.
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

    /// Set the enumerated values and derive their descriptions.
    pub fn with_value_options(mut self, options: Vec<ValueOption>) -> Self {
        self.value_descriptions = options
            .iter()
            .filter(|option| !option.description.is_empty())
            .map(|option| option.description.clone())
            .collect();
        self.value_options = options;
        self
    }
}

/// Profile-id keyed capability index.
#[derive(Debug, Clone, Default)]
pub struct SpecIndex {
    profiles: HashMap<String, Vec<CapabilityDoc>>,
}

impl SpecIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the docs for one profile, replacing any previous entry.
    pub fn insert(&mut self, profile_id: impl Into<String>, docs: Vec<CapabilityDoc>) {
        self.profiles.insert(profile_id.into(), docs);
    }

    /// Docs declared by a profile.
    pub fn get(&self, profile_id: &str) -> Option<&[CapabilityDoc]> {
        self.profiles.get(profile_id).map(Vec::as_slice)
    }

    /// Docs declared by a device's profile, if it has one.
    pub fn docs_for(&self, device: &Device) -> Option<&[CapabilityDoc]> {
        device
            .profile_id
            .as_deref()
            .and_then(|profile_id| self.get(profile_id))
    }

    /// One capability doc for a device, looked up by id.
    pub fn doc_for_capability(&self, device: &Device, capability_id: &str) -> Option<&CapabilityDoc> {
        self.docs_for(device)?
            .iter()
            .find(|doc| doc.id == capability_id)
    }

    /// Whether a profile declares a capability.
    pub fn profile_declares(&self, profile_id: &str, capability_id: &str) -> bool {
        self.get(profile_id)
            .is_some_and(|docs| docs.iter().any(|doc| doc.id == capability_id))
    }

    /// Number of profiles in the index.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether the index holds no profiles.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Load an index from the capability spec wire format.
    ///
    /// Expects a JSON array of `{profileId, capabilities: [...]}` entries.
    /// Entries without a profile id and capabilities without an id are
    /// skipped; a non-array root yields an empty index. Only outright
    /// undecodable JSON is an error.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_json_value(&value))
    }

    /// Load an index from an already-decoded spec payload.
    pub fn from_json_value(value: &Value) -> Self {
        let mut index = Self::new();
        let Some(entries) = value.as_array() else {
            warn!("capability spec root is not an array, loading empty index");
            return index;
        };

        for entry in entries {
            let Some(profile_id) = entry.get("profileId").and_then(Value::as_str) else {
                continue;
            };
            if profile_id.is_empty() {
                continue;
            }

            let mut docs = Vec::new();
            if let Some(capabilities) = entry.get("capabilities").and_then(Value::as_array) {
                for capability in capabilities {
                    if let Some(doc) = parse_capability(capability) {
                        docs.push(doc);
                    }
                }
            }
            index.insert(profile_id, docs);
        }
        index
    }
}

fn parse_capability(value: &Value) -> Option<CapabilityDoc> {
    let id = value.get("id").and_then(Value::as_str)?;
    if id.is_empty() {
        return None;
    }

    let mut doc = CapabilityDoc::new(id);
    if let Some(description) = value.get("description").and_then(Value::as_str) {
        doc.description = description.to_string();
    }
    if let Some(value_type) = value.get("type").and_then(Value::as_str) {
        doc.value_type = Some(value_type.to_string());
    }
    if let Some(range) = value.get("value_range") {
        doc.value_range = parse_value_range(range);
    }
    if let Some(options) = value.get("value_list").and_then(Value::as_array) {
        let parsed: Vec<ValueOption> = options.iter().filter_map(parse_value_option).collect();
        doc = doc.with_value_options(parsed);
    }
    Some(doc)
}

fn parse_value_range(value: &Value) -> Option<ValueRange> {
    let minimum = value.get("minimum").and_then(Value::as_f64)?;
    let maximum = value.get("maximum").and_then(Value::as_f64)?;

    // The unit field is a string in most profiles but a list in some
    // vendor exports; the first entry wins there.
    let unit = match value.get("unit") {
        Some(Value::String(unit)) => unit.clone(),
        Some(Value::Array(units)) => units
            .iter()
            .find_map(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };

    Some(ValueRange {
        minimum,
        maximum,
        unit,
    })
}

fn parse_value_option(value: &Value) -> Option<ValueOption> {
    let option_value = value.get("value").and_then(Value::as_str)?;
    let description = value
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(ValueOption {
        value: option_value.to_string(),
        description: description.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_spec() -> Value {
        json!([
            {
                "profileId": "p-light",
                "capabilities": [
                    {
                        "id": "cap-on",
                        "description": "enable",
                        "type": "string",
                        "value_list": [
                            { "value": "high", "description": "high" },
                            { "value": "low" }
                        ]
                    },
                    {
                        "id": "cap-level",
                        "description": "adjust",
                        "type": "integer",
                        "value_range": { "minimum": 0, "maximum": 100, "unit": "%" }
                    }
                ]
            },
            {
                "profileId": "p-fan",
                "capabilities": [
                    {
                        "id": "cap-speed",
                        "description": "adjust fan speed",
                        "value_range": { "minimum": 0, "maximum": 100, "unit": ["%", "step"] }
                    },
                    { "description": "missing id, skipped" }
                ]
            }
        ])
    }

    #[test]
    fn test_load_spec_index() {
        let index = SpecIndex::from_json_value(&sample_spec());
        assert_eq!(index.len(), 2);

        let docs = index.get("p-light").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "cap-on");
        assert_eq!(docs[0].value_descriptions, vec!["high".to_string()]);
        assert_eq!(docs[1].value_range.as_ref().unwrap().unit, "%");
    }

    #[test]
    fn test_unit_list_takes_first_entry() {
        let index = SpecIndex::from_json_value(&sample_spec());
        let docs = index.get("p-fan").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].value_range.as_ref().unwrap().unit, "%");
    }

    #[test]
    fn test_non_array_root_yields_empty_index() {
        let index = SpecIndex::from_json_value(&json!({ "profileId": "p1" }));
        assert!(index.is_empty());
    }

    #[test]
    fn test_undecodable_json_is_an_error() {
        assert!(SpecIndex::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_profile_declares() {
        let index = SpecIndex::from_json_value(&sample_spec());
        assert!(index.profile_declares("p-light", "cap-on"));
        assert!(!index.profile_declares("p-light", "cap-speed"));
        assert!(!index.profile_declares("p-missing", "cap-on"));
    }

    #[test]
    fn test_docs_for_device() {
        let index = SpecIndex::from_json_value(&sample_spec());
        let device = Device::new("d1", "Lamp").with_profile("p-light");
        assert_eq!(index.docs_for(&device).unwrap().len(), 2);

        let unlinked = Device::new("d2", "Lamp");
        assert!(index.docs_for(&unlinked).is_none());
    }
}
