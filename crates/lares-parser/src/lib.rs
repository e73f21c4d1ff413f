//! Command parsing for natural-language device control.
//!
//! Provides:
//! - Structured command model (action, scope, target, quantifier)
//! - Strict wire-format parser with stable error tags and UNKNOWN fallback
//! - IR compiler flattening commands for retrieval
//! - System prompt and pinned regression corpus for the command model
//! - Cumulative parser metrics

pub mod command;
pub mod ir;
pub mod metrics;
pub mod parser;
pub mod prompt;

// Re-export commonly used types
pub use command::{
    ParsedCommand, Quantifier, ScopeSlot, TargetSlot, SCOPE_WILDCARD, UNKNOWN_ACTION,
    UNKNOWN_COMMAND,
};
pub use ir::{compile_ir, QueryIR, META_COUNT, NAME_LAST, REFERENCE_LAST};
pub use metrics::ParserMetrics;
pub use parser::{CommandParser, ParseOutcome, ParserConfig};
pub use prompt::{default_system_prompt, regression_cases, RegressionCase};
