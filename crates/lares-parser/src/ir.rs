//! IR compiler.
//!
//! Flattens one [`ParsedCommand`] into the retrieval-facing [`QueryIR`].
//! This is a pure structural transform: no device lookup, no collaborator
//! calls. The orchestrator later backfills inferred names and categories.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::command::{ParsedCommand, Quantifier, SCOPE_WILDCARD};

/// Reference tag recorded when the user points back at the previous device.
pub const REFERENCE_LAST: &str = "last-mentioned";

/// Target-name literal the model emits for that anaphora.
pub const NAME_LAST: &str = "@last";

/// Meta key carrying the optional `any`-quantifier count.
pub const META_COUNT: &str = "count";

/// Retrieval-facing intermediate representation of one command.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryIR {
    /// The user's utterance; falls back to the serialized command form.
    pub raw: String,
    /// Device-name hint. `None` when wildcarded or referential.
    pub name_hint: Option<String>,
    /// Free-text action. Empty for the UNKNOWN sentinel.
    pub action: String,
    pub scope_include: BTreeSet<String>,
    pub scope_exclude: BTreeSet<String>,
    pub quantifier: Quantifier,
    pub type_hint: String,
    /// Unresolved references such as [`REFERENCE_LAST`].
    pub references: Vec<String>,
    /// Free-form side channel, e.g. [`META_COUNT`].
    pub meta: BTreeMap<String, Value>,
}

impl QueryIR {
    /// Whether this command resolves through the bulk path.
    pub fn is_bulk(&self) -> bool {
        self.quantifier.is_bulk()
    }

    /// Whether the command points back at the previously resolved device.
    pub fn wants_last_mentioned(&self) -> bool {
        self.references.iter().any(|r| r == REFERENCE_LAST)
    }
}

/// Compile one parsed command against the utterance it came from.
pub fn compile_ir(command: &ParsedCommand, utterance: &str) -> QueryIR {
    let action = if command.is_unknown() {
        String::new()
    } else {
        command.action.clone()
    };

    let mut references = Vec::new();
    let name = command.target.name.trim();
    let name_hint = if name == NAME_LAST {
        references.push(REFERENCE_LAST.to_string());
        None
    } else if name.is_empty() || name == SCOPE_WILDCARD {
        None
    } else {
        Some(name.to_string())
    };

    // An include set of exactly {"*"} means "no include filter". A wildcard
    // mixed in with concrete rooms is contradictory; the rooms win.
    let mut scope_include: BTreeSet<String> = command
        .scope
        .include
        .iter()
        .map(|room| room.trim().to_string())
        .filter(|room| !room.is_empty())
        .collect();
    if scope_include.iter().all(|room| room == SCOPE_WILDCARD) {
        scope_include.clear();
    } else {
        scope_include.retain(|room| room != SCOPE_WILDCARD);
    }

    let scope_exclude: BTreeSet<String> = command
        .scope
        .exclude
        .iter()
        .map(|room| room.trim().to_string())
        .filter(|room| !room.is_empty())
        .collect();

    let mut meta = BTreeMap::new();
    if let Some(count) = command.target.count {
        meta.insert(META_COUNT.to_string(), Value::from(count));
    }

    let raw = if utterance.trim().is_empty() {
        command.raw.clone()
    } else {
        utterance.to_string()
    };

    QueryIR {
        raw,
        name_hint,
        action,
        scope_include,
        scope_exclude,
        quantifier: command.target.quantifier,
        type_hint: command.target.type_hint.clone(),
        references,
        meta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ScopeSlot, TargetSlot};

    fn command(action: &str, include: &[&str], exclude: &[&str], target: TargetSlot) -> ParsedCommand {
        ParsedCommand::new(
            action,
            ScopeSlot {
                include: include.iter().map(|s| s.to_string()).collect(),
                exclude: exclude.iter().map(|s| s.to_string()).collect(),
            },
            target,
        )
    }

    #[test]
    fn test_compile_named_single_target() {
        let command = command(
            "打开",
            &["客厅"],
            &[],
            TargetSlot {
                name: "主灯".to_string(),
                type_hint: "Light".to_string(),
                quantifier: Quantifier::One,
                count: None,
            },
        );
        let ir = compile_ir(&command, "打开客厅的主灯");

        assert_eq!(ir.raw, "打开客厅的主灯");
        assert_eq!(ir.action, "打开");
        assert_eq!(ir.name_hint.as_deref(), Some("主灯"));
        assert!(ir.scope_include.contains("客厅"));
        assert_eq!(ir.scope_include.len(), 1);
        assert!(ir.scope_exclude.is_empty());
        assert_eq!(ir.quantifier, Quantifier::One);
        assert_eq!(ir.type_hint, "Light");
        assert!(ir.references.is_empty());
        assert!(!ir.is_bulk());
    }

    #[test]
    fn test_compile_unknown_collapses_action() {
        let ir = compile_ir(&ParsedCommand::unknown(), "今天天气怎么样");
        assert!(ir.action.is_empty());
        assert!(ir.name_hint.is_none());
        assert_eq!(ir.type_hint, "Unknown");
    }

    #[test]
    fn test_compile_last_reference() {
        let command = command(
            "关闭",
            &["*"],
            &[],
            TargetSlot {
                name: "@last".to_string(),
                ..TargetSlot::default()
            },
        );
        let ir = compile_ir(&command, "把它关掉");

        assert!(ir.name_hint.is_none());
        assert_eq!(ir.references, vec![REFERENCE_LAST.to_string()]);
        assert!(ir.wants_last_mentioned());
    }

    #[test]
    fn test_compile_wildcard_scope_is_empty() {
        let command = command("打开", &["*"], &[], TargetSlot::default());
        let ir = compile_ir(&command, "开灯");
        assert!(ir.scope_include.is_empty());
    }

    #[test]
    fn test_compile_mixed_wildcard_keeps_rooms() {
        let command = command("打开", &["*", "客厅"], &["卧室"], TargetSlot::default());
        let ir = compile_ir(&command, "");

        assert_eq!(ir.scope_include.len(), 1);
        assert!(ir.scope_include.contains("客厅"));
        assert!(ir.scope_exclude.contains("卧室"));
        // Empty utterance falls back to the serialized command.
        assert_eq!(ir.raw, command.raw);
    }

    #[test]
    fn test_compile_count_lands_in_meta() {
        let command = command(
            "打开",
            &["*"],
            &[],
            TargetSlot {
                quantifier: Quantifier::Any,
                count: Some(2),
                ..TargetSlot::default()
            },
        );
        let ir = compile_ir(&command, "随便开两盏灯");

        // `any` carries a count but still resolves through the single path.
        assert!(!ir.is_bulk());
        assert_eq!(ir.meta.get(META_COUNT), Some(&Value::from(2u32)));
    }
}
