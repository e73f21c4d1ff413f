//! Scored candidates and per-command retrieval results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hints surfaced on a [`RetrievalResult`] for the caller to act on.
pub mod hints {
    /// Several candidates scored within the close-match threshold.
    pub const MULTIPLE_CLOSE_MATCHES: &str = "multiple_close_matches";
    /// The result carries a clarification question instead of a selection.
    pub const NEED_CLARIFICATION: &str = "need_clarification";
    /// Nothing matched the command at all.
    pub const NO_TARGETS: &str = "no_targets";
    /// The bulk target set exceeded a hard limit and was cut off.
    pub const TOO_MANY_TARGETS: &str = "too_many_targets";
    /// The selected capability does not cover every scoped device.
    pub const PARTIAL_COVERAGE: &str = "partial_coverage";
}

/// Kind of entity a candidate points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Device,
    Group,
}

impl Default for EntityKind {
    fn default() -> Self {
        Self::Device
    }
}

/// One scored resolution candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candidate {
    pub entity_id: String,
    pub entity_kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_id: Option<String>,
    pub keyword_score: f64,
    pub vector_score: f64,
    pub total_score: f64,
    /// Why this candidate scored the way it did, e.g. "name_exact".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl Candidate {
    /// Create a device candidate with zeroed scores.
    pub fn device(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_kind: EntityKind::Device,
            ..Self::default()
        }
    }

    /// Create a group candidate with zeroed scores.
    pub fn group(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_kind: EntityKind::Group,
            ..Self::default()
        }
    }

    /// Attach a capability id.
    pub fn with_capability(mut self, capability_id: impl Into<String>) -> Self {
        self.capability_id = Some(capability_id.into());
        self
    }

    /// Set the keyword-channel score.
    pub fn with_keyword_score(mut self, score: f64) -> Self {
        self.keyword_score = score;
        self
    }

    /// Set the vector-channel score.
    pub fn with_vector_score(mut self, score: f64) -> Self {
        self.vector_score = score;
        self
    }

    /// Set the fused total score.
    pub fn with_total_score(mut self, score: f64) -> Self {
        self.total_score = score;
        self
    }

    /// Append a reason tag.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }
}

/// One capability option offered during bulk arbitration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityOption {
    pub capability_id: String,
    pub description: String,
    /// Aggregated evidence score.
    pub score: f64,
    /// Top per-hit scores backing this option.
    pub evidence: Vec<f64>,
    /// Score normalized across all options.
    pub probability: f64,
    /// Devices whose profile declares this capability.
    pub support_count: usize,
    pub total_devices: usize,
    /// `support_count / total_devices`.
    pub coverage: f64,
    /// A few device labels for display.
    pub examples: Vec<String>,
}

/// Devices sharing one compatibility signature for a capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub device_ids: Vec<String>,
}

/// Terminal, per-command output of the resolution pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
    /// Group id -> ordered device-id batches for execution chunking.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub batches: BTreeMap<String, Vec<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CapabilityOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_capability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

impl RetrievalResult {
    /// An empty result tagged with a hint.
    pub fn empty_with_hint(hint: impl Into<String>) -> Self {
        Self {
            hint: Some(hint.into()),
            ..Self::default()
        }
    }

    /// Set or replace the hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Best-ranked candidate, if any.
    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// True when nothing was resolved.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.groups.is_empty() && self.options.is_empty()
    }
}
