//! Wire-format command parser.
//!
//! Model output is a JSON array of command objects with short keys:
//! `a` action, `s` scope, `n` name, `t` type, `q` quantifier, `c` count.
//! Parsing never fails. Malformed payloads degrade to the UNKNOWN sentinel,
//! malformed individual commands are dropped without aborting the batch,
//! and every anomaly is reported as a stable error tag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use lares_devices::category::{map_type_to_category, CATEGORY_UNKNOWN};

use crate::command::{
    ParsedCommand, Quantifier, ScopeSlot, TargetSlot, SCOPE_WILDCARD, UNKNOWN_ACTION,
};
use crate::metrics::ParserMetrics;

/// Default truncation limit for raw text in log lines.
pub const DEFAULT_MAX_LOG_CHARS: usize = 400;

/// Stable error tags surfaced in [`ParseOutcome::errors`].
pub mod tags {
    pub const OUTPUT_NOT_STRING: &str = "output_not_string";
    pub const OUTPUT_EMPTY: &str = "output_empty";
    pub const JSON_DECODE_ERROR: &str = "json_decode_error";
    pub const JSON_NOT_ARRAY_OF_OBJECTS: &str = "json_not_array_of_objects";
    pub const LEGACY_INPUT_USED: &str = "legacy_input_used";
    pub const ONLY_TAKE_FIRST: &str = "only_take_first";
    pub const FALLBACK_UNKNOWN: &str = "fallback_unknown";

    pub const OBJECT_ACTION_EMPTY: &str = "object_action_empty";
    pub const OBJECT_ACTION_UNKNOWN: &str = "object_action_unknown";
    pub const OBJECT_SCOPE_EMPTY: &str = "object_scope_empty";
    pub const OBJECT_SCOPE_EXCLUDE_EMPTY: &str = "object_scope_exclude_empty";
    pub const OBJECT_TYPE_INVALID: &str = "object_type_invalid";
    pub const OBJECT_QUANTIFIER_INVALID: &str = "object_quantifier_invalid";
    pub const OBJECT_COUNT_INVALID: &str = "object_count_invalid";

    // Legacy string-format tags
    pub const COMMAND_NOT_STRING: &str = "command_not_string";
    pub const COMMAND_EMPTY: &str = "command_empty";
    pub const COMMAND_NOT_THREE_SEGMENTS: &str = "command_not_three_segments";
    pub const ACTION_INVALID: &str = "action_invalid";
    pub const SCOPE_EMPTY: &str = "scope_empty";
    pub const SCOPE_EXCLUDE_EMPTY: &str = "scope_exclude_empty";
    pub const TARGET_EMPTY: &str = "target_empty";
    pub const TARGET_SEGMENT_COUNT: &str = "target_segment_count";
    pub const TARGET_NAME_EMPTY: &str = "target_name_empty";
    pub const TARGET_TYPE_INVALID: &str = "target_type_invalid";
    pub const TARGET_QUANTIFIER_INVALID: &str = "target_quantifier_invalid";
    pub const TARGET_NUMBER_INVALID: &str = "target_number_invalid";
}

/// Parser tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Accept the legacy `action-scope-name#Type#q[#count]` string arrays.
    pub allow_legacy_input: bool,
    /// Keep only the first command of a batch.
    pub only_take_first: bool,
    /// Truncation limit for raw text in log lines.
    pub max_log_chars: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            allow_legacy_input: false,
            only_take_first: false,
            max_log_chars: DEFAULT_MAX_LOG_CHARS,
        }
    }
}

impl ParserConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle acceptance of the legacy string format.
    pub fn with_legacy_input(mut self, allow: bool) -> Self {
        self.allow_legacy_input = allow;
        self
    }

    /// Toggle keeping only the first command of a batch.
    pub fn with_only_take_first(mut self, only: bool) -> Self {
        self.only_take_first = only;
        self
    }

    /// Set the log truncation limit.
    pub fn with_max_log_chars(mut self, max_log_chars: usize) -> Self {
        self.max_log_chars = max_log_chars;
        self
    }
}

/// Outcome of one parse call. Always holds at least one command.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub commands: Vec<ParsedCommand>,
    /// Stable tags for every anomaly the parser saw, in encounter order.
    pub errors: Vec<&'static str>,
    /// True when a command was dropped or the sentinel was produced.
    pub degraded: bool,
}

/// The strict structured-command parser.
///
/// Owns its cumulative [`ParserMetrics`]; there is no process-wide state.
#[derive(Debug, Default)]
pub struct CommandParser {
    config: ParserConfig,
    metrics: ParserMetrics,
}

impl CommandParser {
    /// Create a parser with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser with an explicit configuration.
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            metrics: ParserMetrics::default(),
        }
    }

    /// Cumulative metrics since this parser was created.
    pub fn metrics(&self) -> &ParserMetrics {
        &self.metrics
    }

    /// Parse raw model output text.
    pub fn parse(&mut self, raw: &str) -> ParseOutcome {
        let mut errors: Vec<&'static str> = Vec::new();

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            errors.push(tags::OUTPUT_EMPTY);
            return self.finalize(raw, Vec::new(), errors, false);
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => {
                errors.push(tags::JSON_DECODE_ERROR);
                return self.finalize(raw, Vec::new(), errors, false);
            }
        };

        let Some(items) = value.as_array() else {
            errors.push(tags::JSON_NOT_ARRAY_OF_OBJECTS);
            return self.finalize(raw, Vec::new(), errors, false);
        };

        let (commands, dropped) = self.parse_items(items, &mut errors);
        self.finalize(raw, commands, errors, dropped)
    }

    /// Parse a payload that may not be a string yet.
    pub fn parse_value(&mut self, payload: &Value) -> ParseOutcome {
        match payload {
            Value::String(text) => self.parse(text),
            Value::Array(items) => self.parse_values(items),
            other => {
                let errors = vec![tags::OUTPUT_NOT_STRING];
                self.finalize(&other.to_string(), Vec::new(), errors, false)
            }
        }
    }

    /// Parse an already-decoded array of command objects.
    pub fn parse_values(&mut self, items: &[Value]) -> ParseOutcome {
        let mut errors: Vec<&'static str> = Vec::new();
        let (commands, dropped) = self.parse_items(items, &mut errors);
        let raw = Value::Array(items.to_vec()).to_string();
        self.finalize(&raw, commands, errors, dropped)
    }

    fn parse_items(
        &self,
        items: &[Value],
        errors: &mut Vec<&'static str>,
    ) -> (Vec<ParsedCommand>, bool) {
        let mut commands = Vec::new();
        let mut dropped = false;

        if items.iter().all(Value::is_object) {
            for item in items {
                if let Some(object) = item.as_object() {
                    match self.validate_object(object, errors) {
                        Some(command) => commands.push(command),
                        None => dropped = true,
                    }
                }
            }
            return (commands, dropped);
        }

        let any_object = items.iter().any(Value::is_object);
        let any_string = items.iter().any(Value::is_string);
        if self.config.allow_legacy_input && any_string && !any_object {
            errors.push(tags::LEGACY_INPUT_USED);
            for item in items {
                match item.as_str() {
                    Some(text) => match self.validate_legacy(text, errors) {
                        Some(command) => commands.push(command),
                        None => dropped = true,
                    },
                    None => {
                        errors.push(tags::COMMAND_NOT_STRING);
                        dropped = true;
                    }
                }
            }
            return (commands, dropped);
        }

        errors.push(tags::JSON_NOT_ARRAY_OF_OBJECTS);
        (commands, dropped)
    }

    fn validate_object(
        &self,
        object: &Map<String, Value>,
        errors: &mut Vec<&'static str>,
    ) -> Option<ParsedCommand> {
        let action_raw = object.get("a").and_then(Value::as_str).unwrap_or("");
        let action = sanitize_action(action_raw);
        if action.is_empty() {
            errors.push(tags::OBJECT_ACTION_EMPTY);
            return Some(ParsedCommand::unknown());
        }
        if action == UNKNOWN_ACTION {
            errors.push(tags::OBJECT_ACTION_UNKNOWN);
            return Some(ParsedCommand::unknown());
        }

        let scope = match self.parse_object_scope(object.get("s"), errors) {
            Some(scope) => scope,
            None => return None,
        };

        let name = object
            .get("n")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(SCOPE_WILDCARD);

        let type_raw = object
            .get("t")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        let type_hint = if type_raw.is_empty() {
            CATEGORY_UNKNOWN.to_string()
        } else {
            match map_type_to_category(type_raw) {
                Some(category) => category.to_string(),
                None => {
                    errors.push(tags::OBJECT_TYPE_INVALID);
                    CATEGORY_UNKNOWN.to_string()
                }
            }
        };

        let quantifier_raw = object
            .get("q")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        let quantifier = if quantifier_raw.is_empty() {
            Quantifier::One
        } else {
            match Quantifier::parse(quantifier_raw) {
                Some(quantifier) => quantifier,
                None => {
                    errors.push(tags::OBJECT_QUANTIFIER_INVALID);
                    Quantifier::One
                }
            }
        };

        let count = match object.get("c") {
            None | Some(Value::Null) => None,
            Some(value) => match parse_count(value) {
                Some(count) => Some(count),
                None => {
                    errors.push(tags::OBJECT_COUNT_INVALID);
                    None
                }
            },
        };

        Some(ParsedCommand::new(
            action,
            scope,
            TargetSlot {
                name: name.to_string(),
                type_hint,
                quantifier,
                count,
            },
        ))
    }

    fn parse_object_scope(
        &self,
        scope: Option<&Value>,
        errors: &mut Vec<&'static str>,
    ) -> Option<ScopeSlot> {
        let joined = match scope {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(","),
            _ => String::new(),
        };

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for entry in joined.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if let Some(rest) = entry.strip_prefix('!') {
                let room = rest.trim();
                if room.is_empty() {
                    errors.push(tags::OBJECT_SCOPE_EXCLUDE_EMPTY);
                    return None;
                }
                exclude.push(room.to_string());
            } else {
                include.push(entry.to_string());
            }
        }

        if include.is_empty() && exclude.is_empty() {
            errors.push(tags::OBJECT_SCOPE_EMPTY);
            include.push(SCOPE_WILDCARD.to_string());
        } else if include.is_empty() {
            include.push(SCOPE_WILDCARD.to_string());
        }

        Some(ScopeSlot { include, exclude })
    }

    fn validate_legacy(
        &self,
        text: &str,
        errors: &mut Vec<&'static str>,
    ) -> Option<ParsedCommand> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            errors.push(tags::COMMAND_EMPTY);
            return None;
        }

        let segments: Vec<&str> = trimmed.split('-').collect();
        if segments.len() != 3 {
            errors.push(tags::COMMAND_NOT_THREE_SEGMENTS);
            return None;
        }

        let action = segments[0].trim();
        if action.is_empty() {
            errors.push(tags::ACTION_INVALID);
            return None;
        }

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        let scope_entries: Vec<&str> = segments[1]
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();
        if scope_entries.is_empty() {
            errors.push(tags::SCOPE_EMPTY);
            return None;
        }
        for entry in scope_entries {
            if let Some(rest) = entry.strip_prefix('!') {
                let room = rest.trim();
                if room.is_empty() {
                    errors.push(tags::SCOPE_EXCLUDE_EMPTY);
                    return None;
                }
                exclude.push(room.to_string());
            } else {
                include.push(entry.to_string());
            }
        }
        if include.is_empty() {
            include.push(SCOPE_WILDCARD.to_string());
        }

        let target = segments[2].trim();
        if target.is_empty() {
            errors.push(tags::TARGET_EMPTY);
            return None;
        }
        let parts: Vec<&str> = target.split('#').collect();
        if parts.len() != 3 && parts.len() != 4 {
            errors.push(tags::TARGET_SEGMENT_COUNT);
            return None;
        }

        let name = parts[0].trim();
        if name.is_empty() {
            errors.push(tags::TARGET_NAME_EMPTY);
            return None;
        }

        let type_hint = match map_type_to_category(parts[1]) {
            Some(category) => category.to_string(),
            None => {
                errors.push(tags::TARGET_TYPE_INVALID);
                CATEGORY_UNKNOWN.to_string()
            }
        };

        let quantifier = match Quantifier::parse(parts[2]) {
            Some(quantifier) => quantifier,
            None => {
                errors.push(tags::TARGET_QUANTIFIER_INVALID);
                Quantifier::One
            }
        };

        let count = if parts.len() == 4 {
            match parts[3].trim().parse::<u32>().ok().filter(|count| *count > 0) {
                Some(count) => Some(count),
                None => {
                    errors.push(tags::TARGET_NUMBER_INVALID);
                    None
                }
            }
        } else {
            None
        };

        Some(ParsedCommand::new(
            action,
            ScopeSlot { include, exclude },
            TargetSlot {
                name: name.to_string(),
                type_hint,
                quantifier,
                count,
            },
        ))
    }

    fn finalize(
        &mut self,
        raw: &str,
        mut commands: Vec<ParsedCommand>,
        mut errors: Vec<&'static str>,
        dropped: bool,
    ) -> ParseOutcome {
        if self.config.only_take_first && commands.len() > 1 {
            commands.truncate(1);
            errors.push(tags::ONLY_TAKE_FIRST);
        }
        if commands.is_empty() {
            commands.push(ParsedCommand::unknown());
            errors.push(tags::FALLBACK_UNKNOWN);
        }

        let unknown = commands.iter().any(ParsedCommand::is_unknown);
        let degraded = dropped || unknown;
        self.metrics.record(degraded, unknown);

        debug!(
            "command_parser parsed={} degraded={} errors={:?} degraded_count={} unknown_ratio={:.3} raw={}",
            commands.len(),
            degraded,
            errors,
            self.metrics.degraded_outputs,
            self.metrics.unknown_ratio(),
            sanitize_for_log(raw, self.config.max_log_chars),
        );

        ParseOutcome {
            commands,
            errors,
            degraded,
        }
    }
}

/// Strip the structural delimiters the canonical rendering relies on.
fn sanitize_action(action: &str) -> String {
    action
        .trim()
        .chars()
        .filter(|c| *c != '-' && *c != '#')
        .collect()
}

fn parse_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .filter(|count| *count > 0 && *count <= u64::from(u32::MAX))
            .map(|count| count as u32),
        Value::String(text) => text.trim().parse::<u32>().ok().filter(|count| *count > 0),
        _ => None,
    }
}

fn sanitize_for_log(raw: &str, max_chars: usize) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if cleaned.chars().count() <= max_chars {
        return cleaned;
    }
    let truncated: String = cleaned.chars().take(max_chars).collect();
    format!("{truncated}...")
}
