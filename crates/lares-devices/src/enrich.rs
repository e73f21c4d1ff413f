//! Description enrichment and corpus document rendering.
//!
//! The vector corpus indexes one document per (device, capability) pair.
//! Descriptions are widened with verb synonyms so that "打开" can land on a
//! capability documented as "enable".

use crate::model::Device;
use crate::spec::CapabilityDoc;

/// Verb synonym table keyed by substrings of the capability description.
const VERB_SYNONYMS: &[(&str, &[&str])] = &[
    ("enable", &["turn on", "on", "start"]),
    ("disable", &["turn off", "off", "stop"]),
    ("set", &["adjust", "change", "configure"]),
    ("电源启用", &["打开", "开", "开启", "启动", "on"]),
    ("电源关闭", &["关", "关掉", "停止", "off"]),
    ("调", &["调节", "调整", "设置", "调到", "设为"]),
];

/// Append verb synonyms for every table key found in the description.
///
/// Synonyms are deduplicated and keep their table order; the original text
/// always comes first.
pub fn enrich_description(description: &str) -> String {
    let lowered = description.to_lowercase();
    let mut additions: Vec<&str> = Vec::new();

    for (key, synonyms) in VERB_SYNONYMS {
        if !lowered.contains(key) {
            continue;
        }
        for synonym in *synonyms {
            if !additions.contains(synonym) {
                additions.push(synonym);
            }
        }
    }

    if additions.is_empty() {
        return description.to_string();
    }

    let mut text = description.to_string();
    for addition in additions {
        text.push(' ');
        text.push_str(addition);
    }
    text
}

/// Corpus document for one (device, capability) pair.
pub fn capability_document(device: &Device, doc: &CapabilityDoc) -> String {
    let mut text = String::new();
    push_part(&mut text, &device.category);
    push_part(&mut text, &doc.id);
    push_part(&mut text, &enrich_description(&doc.description));
    for description in &doc.value_descriptions {
        push_part(&mut text, description);
    }
    text
}

/// Corpus document for a device without a usable capability spec.
pub fn fallback_document(device: &Device) -> String {
    let mut text = String::new();
    push_part(&mut text, &device.name);
    push_part(&mut text, &device.room);
    push_part(&mut text, &device.category);
    text
}

fn push_part(buffer: &mut String, part: &str) {
    if part.is_empty() {
        return;
    }
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(part);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValueOption;

    #[test]
    fn test_enrich_appends_synonyms() {
        assert_eq!(enrich_description("enable"), "enable turn on on start");
        assert_eq!(enrich_description("disable"), "disable turn off off stop");
        assert_eq!(
            enrich_description("电源启用"),
            "电源启用 打开 开 开启 启动 on"
        );
    }

    #[test]
    fn test_enrich_leaves_unmatched_text_alone() {
        assert_eq!(enrich_description("oscillate"), "oscillate");
        assert_eq!(enrich_description(""), "");
    }

    #[test]
    fn test_enrich_deduplicates_across_keys() {
        // "set" appears inside "setting"; synonyms are added once.
        let enriched = enrich_description("setting setting");
        assert_eq!(enriched, "setting setting adjust change configure");
    }

    #[test]
    fn test_capability_document_layout() {
        let device = Device::new("lamp-1", "Lamp")
            .with_room("Living")
            .with_category("Light");
        let doc = CapabilityDoc::new("cap-on")
            .with_description("enable")
            .with_value_options(vec![ValueOption::new("high").with_description("high")]);

        assert_eq!(
            capability_document(&device, &doc),
            "Light cap-on enable turn on on start high"
        );
    }

    #[test]
    fn test_fallback_document_layout() {
        let device = Device::new("lamp-1", "Lamp")
            .with_room("Living")
            .with_category("Light");
        assert_eq!(fallback_document(&device), "Lamp Living Light");

        let sparse = Device::new("d2", "Sensor");
        assert_eq!(fallback_document(&sparse), "Sensor");
    }
}
