//! Language-model collaborator interface.
//!
//! The pipeline never talks to a provider directly. It calls the three
//! methods below and treats them as opaque, potentially slow operations.
//! API keys, transport, retries, and timeouts all belong to the
//! implementation behind the trait.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// External language-model client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Parse free text into a structured value using the model's default
    /// instructions.
    async fn parse(&self, text: &str) -> Result<Value>;

    /// Parse free text into a structured value under a caller-supplied
    /// system prompt.
    async fn parse_with_prompt(&self, text: &str, system_prompt: &str) -> Result<Value>;

    /// Generate raw text under a caller-supplied system prompt.
    async fn generate_with_prompt(&self, text: &str, system_prompt: &str) -> Result<String>;
}

/// Scripted client for tests and offline development.
///
/// `generate_with_prompt` serializes the preset registered for the input
/// text (an empty array when none is registered), which matches the wire
/// format the command parser consumes. `parse_with_prompt` replies with the
/// configured arbitration value and records the prompt it saw.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    generate_presets: HashMap<String, Value>,
    parse_presets: HashMap<String, Value>,
    prompt_reply: Option<Value>,
    fail_with: Option<String>,
    last_prompt: RwLock<Option<String>>,
    last_input: RwLock<Option<String>>,
}

impl MockLlmClient {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the value `generate_with_prompt` should serialize for
    /// `text`.
    pub fn with_generation(mut self, text: impl Into<String>, value: Value) -> Self {
        self.generate_presets.insert(text.into(), value);
        self
    }

    /// Register the value `parse` should return for `text`.
    pub fn with_parse(mut self, text: impl Into<String>, value: Value) -> Self {
        self.parse_presets.insert(text.into(), value);
        self
    }

    /// Set the reply `parse_with_prompt` returns for every call.
    pub fn with_prompt_reply(mut self, value: Value) -> Self {
        self.prompt_reply = Some(value);
        self
    }

    /// Make every call fail with an [`Error::Llm`] carrying `message`.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// The system prompt most recently passed to `parse_with_prompt` or
    /// `generate_with_prompt`.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.read().ok().and_then(|g| g.clone())
    }

    /// The input text most recently passed to any method.
    pub fn last_input(&self) -> Option<String> {
        self.last_input.read().ok().and_then(|g| g.clone())
    }

    fn record(&self, input: &str, prompt: Option<&str>) {
        if let Ok(mut guard) = self.last_input.write() {
            *guard = Some(input.to_string());
        }
        if let Some(prompt) = prompt {
            if let Ok(mut guard) = self.last_prompt.write() {
                *guard = Some(prompt.to_string());
            }
        }
    }

    fn check_failure(&self) -> Result<()> {
        match &self.fail_with {
            Some(message) => Err(Error::llm(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn parse(&self, text: &str) -> Result<Value> {
        self.check_failure()?;
        self.record(text, None);
        Ok(self
            .parse_presets
            .get(text)
            .cloned()
            .unwrap_or_else(|| json!({ "confidence": 0.0 })))
    }

    async fn parse_with_prompt(&self, text: &str, system_prompt: &str) -> Result<Value> {
        self.check_failure()?;
        self.record(text, Some(system_prompt));
        Ok(self.prompt_reply.clone().unwrap_or(Value::Null))
    }

    async fn generate_with_prompt(&self, text: &str, system_prompt: &str) -> Result<String> {
        self.check_failure()?;
        self.record(text, Some(system_prompt));
        let value = self
            .generate_presets
            .get(text)
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok(serde_json::to_string(&value)?)
    }
}
