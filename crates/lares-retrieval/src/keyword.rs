//! Lexical device search.
//!
//! Scores devices against the IR over four signals: target name, room,
//! category, and action-vs-command-description. The strongest signal is
//! the base score; every further nonzero signal adds a flat bonus, capped
//! so lexical totals stay comparable across devices.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use lares_devices::category::{map_type_to_category, CATEGORY_UNKNOWN};
use lares_devices::Device;
use lares_parser::QueryIR;

use crate::candidate::Candidate;
use crate::scope::normalize_room;
use crate::text::similarity;

pub const NAME_EXACT: f64 = 1.0;
pub const NAME_SUBSTRING: f64 = 0.85;
/// Scale for fuzzy name matches above [`NAME_FUZZY_THRESHOLD`].
pub const NAME_FUZZY: f64 = 0.7;
pub const NAME_FUZZY_THRESHOLD: f64 = 0.6;

pub const ROOM_EXACT: f64 = 0.6;
pub const ROOM_SUBSTRING: f64 = 0.54;
/// Scale for fuzzy room matches above [`ROOM_FUZZY_THRESHOLD`].
pub const ROOM_FUZZY: f64 = 0.4;
pub const ROOM_FUZZY_THRESHOLD: f64 = 0.7;

pub const TYPE_MATCH: f64 = 0.5;
pub const ACTION_MATCH: f64 = 0.3;

/// Flat bonus per additional nonzero signal beyond the strongest.
pub const EXTRA_SIGNAL_BONUS: f64 = 0.3;
/// Combined score ceiling.
pub const SCORE_CAP: f64 = 1.5;

pub const DEFAULT_TOP_K: usize = 10;

/// Keyword-channel searcher.
#[derive(Debug, Clone)]
pub struct KeywordSearcher {
    top_k: usize,
}

impl Default for KeywordSearcher {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl KeywordSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the result truncation size.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Score every device against the IR; zero-score devices are dropped.
    pub fn search(&self, ir: &QueryIR, devices: &[Device]) -> Vec<Candidate> {
        let include: BTreeSet<String> = ir
            .scope_include
            .iter()
            .map(|room| normalize_room(room))
            .filter(|room| !room.is_empty())
            .collect();

        let mut candidates: Vec<Candidate> = devices
            .iter()
            .filter_map(|device| self.score_device(ir, &include, device))
            .collect();

        candidates.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(Ordering::Equal)
        });
        candidates.truncate(self.top_k);
        candidates
    }

    fn score_device(
        &self,
        ir: &QueryIR,
        include: &BTreeSet<String>,
        device: &Device,
    ) -> Option<Candidate> {
        let mut signals: Vec<(f64, &'static str)> = Vec::new();

        if let Some(hint) = ir.name_hint.as_deref() {
            if let Some(signal) = name_signal(hint, &device.name) {
                signals.push(signal);
            }
        }
        if let Some(signal) = room_signal(include, &device.room) {
            signals.push(signal);
        }
        if let Some(signal) = type_signal(&ir.type_hint, &device.category) {
            signals.push(signal);
        }
        if let Some(signal) = action_signal(&ir.action, device) {
            signals.push(signal);
        }

        if signals.is_empty() {
            return None;
        }

        let base = signals
            .iter()
            .map(|(score, _)| *score)
            .fold(0.0f64, f64::max);
        let extras = (signals.len() - 1) as f64 * EXTRA_SIGNAL_BONUS;
        let total = (base + extras).min(SCORE_CAP);

        let mut candidate = Candidate::device(&device.id)
            .with_keyword_score(total)
            .with_total_score(total);
        for (_, reason) in &signals {
            candidate = candidate.with_reason(*reason);
        }
        Some(candidate)
    }
}

fn name_signal(hint: &str, device_name: &str) -> Option<(f64, &'static str)> {
    let query = hint.trim().to_lowercase();
    let name = device_name.trim().to_lowercase();
    if query.is_empty() || name.is_empty() {
        return None;
    }
    if query == name {
        return Some((NAME_EXACT, "name_exact"));
    }
    if name.contains(&query) || query.contains(&name) {
        return Some((NAME_SUBSTRING, "name_substring"));
    }
    let sim = similarity(&query, &name);
    if sim > NAME_FUZZY_THRESHOLD {
        return Some((NAME_FUZZY * sim, "name_fuzzy"));
    }
    None
}

fn room_signal(include: &BTreeSet<String>, device_room: &str) -> Option<(f64, &'static str)> {
    let room = normalize_room(device_room);
    if room.is_empty() || include.is_empty() {
        return None;
    }

    let mut best: Option<(f64, &'static str)> = None;
    for term in include {
        let signal = if *term == room {
            Some((ROOM_EXACT, "room_exact"))
        } else if room.contains(term.as_str()) || term.contains(room.as_str()) {
            Some((ROOM_SUBSTRING, "room_substring"))
        } else {
            let sim = similarity(term, &room);
            if sim > ROOM_FUZZY_THRESHOLD {
                Some((ROOM_FUZZY * sim, "room_fuzzy"))
            } else {
                None
            }
        };
        if let Some((score, reason)) = signal {
            if best.map_or(true, |(best_score, _)| score > best_score) {
                best = Some((score, reason));
            }
        }
    }
    best
}

fn type_signal(type_hint: &str, device_category: &str) -> Option<(f64, &'static str)> {
    let wanted = map_type_to_category(type_hint)?;
    if wanted == CATEGORY_UNKNOWN {
        return None;
    }
    if map_type_to_category(device_category) == Some(wanted) {
        return Some((TYPE_MATCH, "type_match"));
    }
    None
}

fn action_signal(action: &str, device: &Device) -> Option<(f64, &'static str)> {
    let action = action.trim().to_lowercase();
    if action.is_empty() {
        return None;
    }
    for command in &device.commands {
        let description = command.description.trim().to_lowercase();
        if description.is_empty() {
            continue;
        }
        if action.contains(&description)
            || description.contains(&action)
            || similarity(&action, &description) > NAME_FUZZY_THRESHOLD
        {
            return Some((ACTION_MATCH, "action_match"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use lares_devices::CommandSpec;
    use lares_parser::{compile_ir, ParsedCommand, ScopeSlot, TargetSlot};

    fn ir(action: &str, include: &[&str], name: &str, type_hint: &str) -> QueryIR {
        let command = ParsedCommand::new(
            action,
            ScopeSlot {
                include: include.iter().map(|s| s.to_string()).collect(),
                exclude: Vec::new(),
            },
            TargetSlot {
                name: name.to_string(),
                type_hint: type_hint.to_string(),
                ..TargetSlot::default()
            },
        );
        compile_ir(&command, "")
    }

    #[test]
    fn test_exact_name_outranks_substring() {
        let devices = vec![
            Device::new("d1", "主灯").with_room("客厅"),
            Device::new("d2", "客厅主灯副灯").with_room("客厅"),
        ];
        let searcher = KeywordSearcher::new();

        let hits = searcher.search(&ir("", &["*"], "主灯", "Unknown"), &devices);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entity_id, "d1");
        assert!((hits[0].keyword_score - NAME_EXACT).abs() < 1e-9);
        assert!((hits[1].keyword_score - NAME_SUBSTRING).abs() < 1e-9);
        assert_eq!(hits[0].reasons, vec!["name_exact"]);
    }

    #[test]
    fn test_fuzzy_name_match() {
        let devices = vec![Device::new("d1", "大白台灯")];
        let searcher = KeywordSearcher::new();

        let hits = searcher.search(&ir("", &["*"], "大白灯", "Unknown"), &devices);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].reasons, vec!["name_fuzzy"]);
        assert!(hits[0].keyword_score > 0.5);
        assert!(hits[0].keyword_score < NAME_SUBSTRING);
    }

    #[test]
    fn test_signals_combine_with_flat_bonus() {
        let devices = vec![Device::new("d1", "客厅主灯")
            .with_room("客厅")
            .with_category("Light")];
        let searcher = KeywordSearcher::new();

        let hits = searcher.search(&ir("", &["客厅"], "主灯", "Light"), &devices);
        // name substring base, plus room and type bonuses.
        let expected = NAME_SUBSTRING + 2.0 * EXTRA_SIGNAL_BONUS;
        assert!((hits[0].keyword_score - expected).abs() < 1e-9);
        assert_eq!(hits[0].reasons.len(), 3);
    }

    #[test]
    fn test_combined_score_is_capped() {
        let devices = vec![Device::new("d1", "主灯")
            .with_room("客厅")
            .with_category("Light")
            .with_commands(vec![CommandSpec::new("cap-on").with_description("打开")])];
        let searcher = KeywordSearcher::new();

        let hits = searcher.search(&ir("打开", &["客厅"], "主灯", "Light"), &devices);
        // Four signals would exceed the cap without clamping.
        assert!((hits[0].keyword_score - SCORE_CAP).abs() < 1e-9);
    }

    #[test]
    fn test_zero_score_devices_are_dropped() {
        let devices = vec![
            Device::new("d1", "空调").with_room("卧室").with_category("AirConditioner"),
            Device::new("d2", "主灯").with_room("客厅").with_category("Light"),
        ];
        let searcher = KeywordSearcher::new();

        let hits = searcher.search(&ir("", &["*"], "主灯", "Light"), &devices);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, "d2");
    }

    #[test]
    fn test_top_k_truncation() {
        let devices: Vec<Device> = (0..5)
            .map(|i| Device::new(format!("d{i}"), "主灯").with_room("客厅"))
            .collect();
        let searcher = KeywordSearcher::new().with_top_k(2);

        let hits = searcher.search(&ir("", &["*"], "主灯", "Unknown"), &devices);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_room_only_signal() {
        let devices = vec![Device::new("d1", "吸顶灯").with_room("客厅")];
        let searcher = KeywordSearcher::new();

        let hits = searcher.search(&ir("", &["客厅"], "*", "Unknown"), &devices);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].keyword_score - ROOM_EXACT).abs() < 1e-9);
        assert_eq!(hits[0].reasons, vec!["room_exact"]);
    }
}
