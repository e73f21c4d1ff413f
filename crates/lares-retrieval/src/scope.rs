//! Room-scope filtering.
//!
//! Room terms arrive in mixed widths and spacings ("客厅（主）", " Living  Room "),
//! so both sides are normalized before comparison. When a command mentions a
//! room no device is filed under, the resolver falls back to scanning device
//! names for room substrings. Include filtering is best-effort and never
//! empties the pool; exclusions are always honored.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use lares_devices::Device;
use lares_parser::QueryIR;

/// Meta flag set when include filtering was abandoned to keep the pool alive.
pub const META_INCLUDE_FALLBACK: &str = "scope_include_fallback";

/// Meta key listing devices whose name matched several room terms at once.
pub const META_AMBIGUOUS_DEVICES: &str = "scope_ambiguous_devices";

/// Normalize a room term: fold full-width punctuation, collapse whitespace,
/// lower-case.
pub fn normalize_room(text: &str) -> String {
    let folded: String = text.chars().map(fold_char).collect();
    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn fold_char(c: char) -> char {
    match c {
        '（' => '(',
        '）' => ')',
        '【' => '[',
        '】' => ']',
        '－' | '—' | '–' => '-',
        '　' => ' ',
        _ => c,
    }
}

/// Apply the IR's include/exclude room sets to the device pool.
///
/// Returns the surviving devices plus a meta map describing any fallback
/// taken. The include filter reverts to the post-exclude list rather than
/// returning nothing.
pub fn apply_scope_filters(
    devices: &[Device],
    ir: &QueryIR,
) -> (Vec<Device>, BTreeMap<String, Value>) {
    let include: BTreeSet<String> = ir
        .scope_include
        .iter()
        .map(|room| normalize_room(room))
        .filter(|room| !room.is_empty())
        .collect();
    let exclude: BTreeSet<String> = ir
        .scope_exclude
        .iter()
        .map(|room| normalize_room(room))
        .filter(|room| !room.is_empty())
        .collect();

    let known_rooms: BTreeSet<String> = devices
        .iter()
        .map(|device| normalize_room(&device.room))
        .filter(|room| !room.is_empty())
        .collect();

    // Room terms the user said but no device is filed under. Their presence
    // switches on name-derived room extraction.
    let fallback_mode = include
        .iter()
        .chain(exclude.iter())
        .any(|room| !known_rooms.contains(room));

    let mut scan_terms: BTreeSet<String> = known_rooms.clone();
    scan_terms.extend(include.iter().cloned());
    scan_terms.extend(exclude.iter().cloned());
    // Only multi-character terms take part in name scanning.
    scan_terms.retain(|term| term.chars().count() > 1);

    let mut meta = BTreeMap::new();
    let mut ambiguous_ids: Vec<String> = Vec::new();

    let rooms: Vec<Option<String>> = devices
        .iter()
        .map(|device| {
            let (room, ambiguous) = effective_room(device, fallback_mode, &scan_terms);
            if ambiguous {
                ambiguous_ids.push(device.id.clone());
            }
            room
        })
        .collect();

    let after_exclude: Vec<(&Device, &Option<String>)> = devices
        .iter()
        .zip(rooms.iter())
        .filter(|(_, room)| match room {
            Some(room) => !exclude.contains(room),
            None => true,
        })
        .collect();

    let survivors: Vec<Device> = if include.is_empty() {
        after_exclude.iter().map(|(device, _)| (*device).clone()).collect()
    } else {
        let matched: Vec<Device> = after_exclude
            .iter()
            .filter(|(_, room)| room.as_ref().is_some_and(|room| include.contains(room)))
            .map(|(device, _)| (*device).clone())
            .collect();
        if matched.is_empty() {
            meta.insert(META_INCLUDE_FALLBACK.to_string(), Value::Bool(true));
            after_exclude.iter().map(|(device, _)| (*device).clone()).collect()
        } else {
            matched
        }
    };

    if !ambiguous_ids.is_empty() {
        meta.insert(
            META_AMBIGUOUS_DEVICES.to_string(),
            Value::from(ambiguous_ids),
        );
    }

    (survivors, meta)
}

/// Resolve the room a device effectively belongs to.
///
/// Outside fallback mode this is the explicit room field. In fallback mode
/// a single room term found inside the device name overrides an empty or
/// conflicting room field; several distinct matches are ambiguous and the
/// extraction is discarded.
fn effective_room(
    device: &Device,
    fallback_mode: bool,
    scan_terms: &BTreeSet<String>,
) -> (Option<String>, bool) {
    let explicit = normalize_room(&device.room);
    if !fallback_mode {
        return (non_empty(explicit), false);
    }

    let name = normalize_room(&device.name);
    let mut derived: BTreeSet<&str> = scan_terms
        .iter()
        .map(String::as_str)
        .filter(|room| name.contains(room))
        .collect();
    derived.remove(explicit.as_str());

    if explicit.is_empty() || !derived.is_empty() {
        match derived.len() {
            0 => (non_empty(explicit), false),
            1 => (
                derived.iter().next().map(|room| (*room).to_string()),
                false,
            ),
            _ => (non_empty(explicit), true),
        }
    } else {
        (Some(explicit), false)
    }
}

fn non_empty(room: String) -> Option<String> {
    if room.is_empty() {
        None
    } else {
        Some(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lares_parser::{compile_ir, ParsedCommand, Quantifier, ScopeSlot, TargetSlot};

    fn ir(include: &[&str], exclude: &[&str]) -> QueryIR {
        let command = ParsedCommand::new(
            "打开",
            ScopeSlot {
                include: include.iter().map(|s| s.to_string()).collect(),
                exclude: exclude.iter().map(|s| s.to_string()).collect(),
            },
            TargetSlot {
                quantifier: Quantifier::All,
                ..TargetSlot::default()
            },
        );
        compile_ir(&command, "")
    }

    fn pool() -> Vec<Device> {
        vec![
            Device::new("d1", "主灯").with_room("客厅"),
            Device::new("d2", "台灯").with_room("卧室"),
            Device::new("d3", "吸顶灯").with_room("书房"),
        ]
    }

    #[test]
    fn test_include_keeps_matching_rooms() {
        let (devices, meta) = apply_scope_filters(&pool(), &ir(&["客厅"], &[]));
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "d1");
        assert!(meta.is_empty());
    }

    #[test]
    fn test_exclude_removes_rooms() {
        let (devices, _) = apply_scope_filters(&pool(), &ir(&[], &["卧室"]));
        let ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d3"]);
    }

    #[test]
    fn test_include_fails_open() {
        let (devices, meta) = apply_scope_filters(&pool(), &ir(&["阳台"], &[]));
        assert_eq!(devices.len(), 3);
        assert_eq!(meta.get(META_INCLUDE_FALLBACK), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_wildcard_scope_is_no_filter() {
        let (devices, meta) = apply_scope_filters(&pool(), &ir(&["*"], &[]));
        assert_eq!(devices.len(), 3);
        assert!(meta.is_empty());
    }

    #[test]
    fn test_unknown_room_derived_from_device_name() {
        let devices = vec![
            Device::new("d1", "阳台灯"),
            Device::new("d2", "台灯").with_room("卧室"),
        ];

        // "阳台" is not a registered room, but d1's name carries it.
        let (survivors, meta) = apply_scope_filters(&devices, &ir(&["阳台"], &[]));
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].id, "d1");
        assert!(!meta.contains_key(META_INCLUDE_FALLBACK));
    }

    #[test]
    fn test_name_derived_room_honors_exclude() {
        let devices = vec![
            Device::new("d1", "阳台灯"),
            Device::new("d2", "台灯").with_room("卧室"),
        ];

        let (survivors, _) = apply_scope_filters(&devices, &ir(&[], &["阳台"]));
        let ids: Vec<&str> = survivors.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d2"]);
    }

    #[test]
    fn test_single_char_terms_do_not_scan_names() {
        let devices = vec![
            Device::new("d1", "客厅灯"),
            Device::new("d2", "台灯").with_room("卧室"),
        ];

        let (survivors, meta) = apply_scope_filters(&devices, &ir(&["厅"], &[]));
        assert_eq!(survivors.len(), 2);
        assert_eq!(meta.get(META_INCLUDE_FALLBACK), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_ambiguous_name_extraction_is_discarded() {
        let devices = vec![
            Device::new("d1", "客厅卧室两用灯"),
            Device::new("d2", "台灯").with_room("卧室"),
        ];

        let (survivors, meta) = apply_scope_filters(&devices, &ir(&["客厅"], &[]));
        // Two distinct room terms match inside d1's name; the extraction is
        // dropped instead of guessed, so include falls back to the full pool.
        assert_eq!(survivors.len(), 2);
        assert_eq!(meta.get(META_INCLUDE_FALLBACK), Some(&Value::Bool(true)));
        let flagged = meta.get(META_AMBIGUOUS_DEVICES).unwrap();
        assert_eq!(flagged, &Value::from(vec!["d1"]));
    }

    #[test]
    fn test_normalize_folds_width_and_whitespace() {
        assert_eq!(normalize_room("客厅（主）"), "客厅(主)");
        assert_eq!(normalize_room(" Living  Room "), "living room");
        assert_eq!(normalize_room("书房　－A"), "书房 -a");

        let devices = vec![Device::new("d1", "主灯").with_room("客厅（主）")];
        let (survivors, _) = apply_scope_filters(&devices, &ir(&["客厅(主)"], &[]));
        assert_eq!(survivors.len(), 1);
    }
}
