//! Core primitives shared by every Lares crate.
//!
//! Provides:
//! - The unified error type and result alias
//! - The language-model collaborator trait and a scripted mock
//! - Tracing setup for embedders and tests

pub mod error;
pub mod llm;
pub mod telemetry;

// Re-export commonly used types
pub use error::{Error, Result};
pub use llm::{LlmClient, MockLlmClient};

/// Commonly used imports for downstream crates.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::llm::LlmClient;
}
