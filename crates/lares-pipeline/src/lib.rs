//! Command-to-device resolution pipeline.
//!
//! Provides:
//! - The [`Pipeline`] orchestrator running the full funnel per command
//! - Multi-command aggregation with per-command failure isolation
//! - Conversation state for "last-mentioned" back-references
//! - Pipeline configuration with an arbitration env override

pub mod config;
pub mod orchestrator;
pub mod state;

// Re-export commonly used types
pub use config::{PipelineConfig, DEFAULT_ARBITRATION, ENV_BULK_ARBITRATION};
pub use orchestrator::{CommandResolution, MultiRetrievalResult, Pipeline};
pub use state::ConversationState;
