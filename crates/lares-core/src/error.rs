//! Error types shared across all Lares crates.

use thiserror::Error;

/// Convenient result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the resolution pipeline.
///
/// Collaborator failures ([`Error::Llm`], [`Error::Embedding`]) are the only
/// errors a healthy pipeline surfaces at runtime; everything structural
/// degrades into hints and tags instead (see the parser and retrieval
/// crates).
#[derive(Debug, Error)]
pub enum Error {
    /// The language-model collaborator failed or returned a bad status.
    #[error("LLM error: {0}")]
    Llm(String),

    /// The embedding collaborator failed or returned malformed vectors.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A spec, catalog, or configuration input was malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Anything that does not fit the variants above.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an LLM collaborator error.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Create an embedding collaborator error.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create an invalid-input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error originated in an external collaborator.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, Self::Llm(_) | Self::Embedding(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
