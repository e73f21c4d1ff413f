//! External catalog adapter.
//!
//! Turns SmartThings-style device listings into [`Device`] records. The
//! adapter is intentionally forgiving: items missing a device id are
//! skipped, everything else falls back to sensible defaults.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::category::CATEGORY_UNKNOWN;
use crate::model::{CommandSpec, Device};

/// Devices loaded from one catalog fetch.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub devices: Vec<Device>,
    pub loaded_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    /// Wrap a device list with the current load time.
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices,
            loaded_at: Utc::now(),
        }
    }
}

/// Map catalog items to devices.
///
/// `rooms` maps room ids to display names; unknown room ids leave the room
/// field empty.
pub fn devices_from_catalog(items: &[Value], rooms: &HashMap<String, String>) -> Vec<Device> {
    let mut devices = Vec::new();

    for item in items {
        let Some(id) = item.get("deviceId").and_then(Value::as_str) else {
            debug!("catalog item without deviceId skipped");
            continue;
        };
        if id.is_empty() {
            continue;
        }

        let name = ["label", "name"]
            .iter()
            .find_map(|key| item.get(*key).and_then(Value::as_str))
            .filter(|text| !text.is_empty())
            .unwrap_or(id);

        let room = item
            .get("roomId")
            .and_then(Value::as_str)
            .and_then(|room_id| rooms.get(room_id))
            .cloned()
            .unwrap_or_default();

        let category = first_category(item).unwrap_or(CATEGORY_UNKNOWN);

        let mut device = Device::new(id, name)
            .with_room(room)
            .with_category(category);

        if let Some(profile_id) = item
            .get("profile")
            .and_then(|profile| profile.get("id"))
            .and_then(Value::as_str)
        {
            device = device.with_profile(profile_id);
        }

        if let Some(commands) = item.get("commands") {
            if let Ok(specs) = serde_json::from_value::<Vec<CommandSpec>>(commands.clone()) {
                device = device.with_commands(specs);
            }
        }

        devices.push(device);
    }

    debug!(count = devices.len(), "catalog mapped");
    devices
}

fn first_category(item: &Value) -> Option<&str> {
    item.get("components")?
        .as_array()?
        .iter()
        .filter_map(|component| component.get("categories")?.as_array())
        .flatten()
        .find_map(|category| category.get("name")?.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn room_map() -> HashMap<String, String> {
        HashMap::from([("r1".to_string(), "客厅".to_string())])
    }

    #[test]
    fn test_maps_full_item() {
        let items = vec![json!({
            "deviceId": "d1",
            "label": "Ceiling Light",
            "name": "light-1",
            "roomId": "r1",
            "components": [ { "categories": [ { "name": "Light" } ] } ],
            "profile": { "id": "p1" }
        })];

        let devices = devices_from_catalog(&items, &room_map());
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(device.id, "d1");
        assert_eq!(device.name, "Ceiling Light");
        assert_eq!(device.room, "客厅");
        assert_eq!(device.category, "Light");
        assert_eq!(device.profile_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_name_falls_back_to_name_then_id() {
        let items = vec![
            json!({ "deviceId": "d1", "name": "light-1" }),
            json!({ "deviceId": "d2" }),
        ];

        let devices = devices_from_catalog(&items, &HashMap::new());
        assert_eq!(devices[0].name, "light-1");
        assert_eq!(devices[1].name, "d2");
    }

    #[test]
    fn test_missing_category_defaults_to_unknown() {
        let items = vec![json!({ "deviceId": "d1", "label": "Gadget" })];
        let devices = devices_from_catalog(&items, &HashMap::new());
        assert_eq!(devices[0].category, CATEGORY_UNKNOWN);
    }

    #[test]
    fn test_items_without_device_id_are_skipped() {
        let items = vec![json!({ "label": "ghost" }), json!({ "deviceId": "d1" })];
        let devices = devices_from_catalog(&items, &HashMap::new());
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "d1");
    }

    #[test]
    fn test_unknown_room_id_leaves_room_empty() {
        let items = vec![json!({ "deviceId": "d1", "roomId": "r-missing" })];
        let devices = devices_from_catalog(&items, &room_map());
        assert_eq!(devices[0].room, "");
    }

    #[test]
    fn test_snapshot_records_load_time() {
        let snapshot = CatalogSnapshot::new(vec![Device::new("d1", "Lamp")]);
        assert_eq!(snapshot.devices.len(), 1);
        assert!(snapshot.loaded_at <= Utc::now());
    }
}
