//! Structured command model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Action text of the UNKNOWN sentinel.
pub const UNKNOWN_ACTION: &str = "UNKNOWN";

/// Canonical rendering of the UNKNOWN sentinel.
pub const UNKNOWN_COMMAND: &str = "UNKNOWN-*-*#Unknown#one";

/// Room wildcard used when no scope was given.
pub const SCOPE_WILDCARD: &str = "*";

/// How many devices a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantifier {
    /// A single device.
    #[default]
    One,
    /// Every matching device.
    All,
    /// An arbitrary subset, optionally bounded by a count.
    Any,
    /// Every matching device except named exclusions.
    Except,
}

impl Quantifier {
    /// Wire spelling of the quantifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::One => "one",
            Self::All => "all",
            Self::Any => "any",
            Self::Except => "except",
        }
    }

    /// Parse the wire spelling, case-insensitively.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "one" => Some(Self::One),
            "all" => Some(Self::All),
            "any" => Some(Self::Any),
            "except" => Some(Self::Except),
            _ => None,
        }
    }

    /// Whether this quantifier routes to the bulk resolution engine.
    pub fn is_bulk(&self) -> bool {
        matches!(self, Self::All | Self::Except)
    }
}

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Room scope of one command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScopeSlot {
    /// Rooms to include; may hold the `*` wildcard.
    pub include: Vec<String>,
    /// Rooms to exclude.
    pub exclude: Vec<String>,
}

impl ScopeSlot {
    /// Scope covering every room.
    pub fn wildcard() -> Self {
        Self {
            include: vec![SCOPE_WILDCARD.to_string()],
            exclude: Vec::new(),
        }
    }

    /// Scope including the given rooms.
    pub fn include_rooms(rooms: Vec<String>) -> Self {
        Self {
            include: rooms,
            exclude: Vec::new(),
        }
    }

    /// Whether the include list is exactly the wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.include.len() == 1 && self.include[0] == SCOPE_WILDCARD
    }
}

/// Target slot of one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSlot {
    /// Device name; `*` when unspecified, `@last` for a back-reference.
    pub name: String,
    /// Canonical category or "Unknown".
    pub type_hint: String,
    pub quantifier: Quantifier,
    /// Positive device count, only meaningful for the `any` quantifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl Default for TargetSlot {
    fn default() -> Self {
        Self {
            name: SCOPE_WILDCARD.to_string(),
            type_hint: "Unknown".to_string(),
            quantifier: Quantifier::One,
            count: None,
        }
    }
}

/// One validated atomic command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Free-text action; [`UNKNOWN_ACTION`] marks the sentinel.
    pub action: String,
    pub scope: ScopeSlot,
    pub target: TargetSlot,
    /// Canonical `action-scope-name#Type#quantifier[#count]` rendering,
    /// kept for logging and dedup.
    pub raw: String,
}

impl ParsedCommand {
    /// Build a command and its canonical rendering.
    pub fn new(action: impl Into<String>, scope: ScopeSlot, target: TargetSlot) -> Self {
        let action = action.into();
        let raw = render_raw(&action, &scope, &target);
        Self {
            action,
            scope,
            target,
            raw,
        }
    }

    /// The UNKNOWN sentinel.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_ACTION, ScopeSlot::wildcard(), TargetSlot::default())
    }

    /// Whether this command is the UNKNOWN sentinel.
    pub fn is_unknown(&self) -> bool {
        self.action == UNKNOWN_ACTION
    }
}

fn render_raw(action: &str, scope: &ScopeSlot, target: &TargetSlot) -> String {
    let mut scope_parts: Vec<String> = scope.include.to_vec();
    scope_parts.extend(scope.exclude.iter().map(|room| format!("!{room}")));
    if scope_parts.is_empty() {
        scope_parts.push(SCOPE_WILDCARD.to_string());
    }

    let mut raw = format!(
        "{}-{}-{}#{}#{}",
        action,
        scope_parts.join(","),
        target.name,
        target.type_hint,
        target.quantifier
    );
    if let Some(count) = target.count {
        raw.push('#');
        raw.push_str(&count.to_string());
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantifier_parse() {
        assert_eq!(Quantifier::parse("one"), Some(Quantifier::One));
        assert_eq!(Quantifier::parse(" ALL "), Some(Quantifier::All));
        assert_eq!(Quantifier::parse("except"), Some(Quantifier::Except));
        assert_eq!(Quantifier::parse("maybe"), None);
        assert_eq!(Quantifier::parse(""), None);
    }

    #[test]
    fn test_quantifier_bulk_routing() {
        assert!(Quantifier::All.is_bulk());
        assert!(Quantifier::Except.is_bulk());
        assert!(!Quantifier::One.is_bulk());
        assert!(!Quantifier::Any.is_bulk());
    }

    #[test]
    fn test_unknown_sentinel_rendering() {
        let command = ParsedCommand::unknown();
        assert!(command.is_unknown());
        assert_eq!(command.raw, UNKNOWN_COMMAND);
    }

    #[test]
    fn test_raw_rendering_with_exclusions_and_count() {
        let command = ParsedCommand::new(
            "关闭",
            ScopeSlot {
                include: vec!["*".to_string()],
                exclude: vec!["卧室".to_string()],
            },
            TargetSlot {
                name: "*".to_string(),
                type_hint: "Light".to_string(),
                quantifier: Quantifier::Except,
                count: None,
            },
        );
        assert_eq!(command.raw, "关闭-*,!卧室-*#Light#except");

        let counted = ParsedCommand::new(
            "打开",
            ScopeSlot::wildcard(),
            TargetSlot {
                name: "*".to_string(),
                type_hint: "Light".to_string(),
                quantifier: Quantifier::Any,
                count: Some(2),
            },
        );
        assert_eq!(counted.raw, "打开-*-*#Light#any#2");
    }

    #[test]
    fn test_scope_wildcard_detection() {
        assert!(ScopeSlot::wildcard().is_wildcard());
        assert!(!ScopeSlot::include_rooms(vec!["客厅".to_string()]).is_wildcard());
    }
}
