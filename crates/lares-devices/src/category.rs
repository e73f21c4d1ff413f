//! Device category taxonomy.
//!
//! Free-text type hints ("light", " Lamp ", "smartthings:air-conditioner")
//! are canonicalized into a closed category set before gating. Matching is
//! case-, whitespace-, and separator-insensitive: inputs are compacted to
//! their alphanumeric characters and compared against an alias table, then
//! against category substrings to handle namespaced hints.

use crate::model::Device;

/// Catch-all category for anything outside the closed set.
pub const CATEGORY_UNKNOWN: &str = "Unknown";

/// The closed category set.
pub const CATEGORIES: &[&str] = &[
    "AirConditioner",
    "Blind",
    "Charger",
    "Fan",
    "Hub",
    "Light",
    "NetworkAudio",
    "SmartPlug",
    "Switch",
    "Television",
    "Washer",
    CATEGORY_UNKNOWN,
];

/// Compact alias -> canonical category.
const ALIASES: &[(&str, &str)] = &[
    ("light", "Light"),
    ("lamp", "Light"),
    ("lighting", "Light"),
    ("blind", "Blind"),
    ("shade", "Blind"),
    ("curtain", "Blind"),
    ("airconditioner", "AirConditioner"),
    ("ac", "AirConditioner"),
    ("switch", "Switch"),
    ("plug", "SmartPlug"),
    ("smartplug", "SmartPlug"),
    ("outlet", "SmartPlug"),
    ("television", "Television"),
    ("tv", "Television"),
    ("audio", "NetworkAudio"),
    ("speaker", "NetworkAudio"),
    ("sound", "NetworkAudio"),
    ("networkaudio", "NetworkAudio"),
    ("fan", "Fan"),
    ("washer", "Washer"),
    ("washingmachine", "Washer"),
    ("charger", "Charger"),
    ("charging", "Charger"),
    ("hub", "Hub"),
    ("other", CATEGORY_UNKNOWN),
    ("others", CATEGORY_UNKNOWN),
    ("unknown", CATEGORY_UNKNOWN),
];

/// Lower-cased alphanumeric characters only.
fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Canonicalize a free-text type hint.
///
/// Returns `None` when the hint is empty or matches nothing in the closed
/// set. Canonical names map to themselves, so the function is idempotent.
pub fn map_type_to_category(text: &str) -> Option<&'static str> {
    let key = compact(text);
    if key.is_empty() {
        return None;
    }

    for (alias, category) in ALIASES {
        if *alias == key {
            return Some(category);
        }
    }

    // Namespaced hints like "smartthings:air-conditioner" compact to
    // "smartthingsairconditioner"; accept when a canonical key is embedded.
    for category in CATEGORIES {
        if key.contains(&compact(category)) {
            return Some(category);
        }
    }

    None
}

/// Keep devices whose category resolves to `category`.
///
/// An unmappable or catch-all category disables the filter. When the filter
/// would remove every device, the original list is returned instead:
/// gating alone must never empty the candidate pool.
pub fn filter_by_category(devices: &[Device], category: &str) -> Vec<Device> {
    let Some(target) = map_type_to_category(category) else {
        return devices.to_vec();
    };
    if target == CATEGORY_UNKNOWN {
        return devices.to_vec();
    }

    let filtered: Vec<Device> = devices
        .iter()
        .filter(|device| map_type_to_category(&device.category) == Some(target))
        .cloned()
        .collect();

    if filtered.is_empty() {
        devices.to_vec()
    } else {
        filtered
    }
}
