//! Score fusion across the keyword and vector channels.
//!
//! Keyword hits are device-level; vector hits are (device, capability)
//! level. Fusion applies the device's keyword score to each of its
//! capability rows, keeps standalone keyword rows for devices the vector
//! channel never saw, and weights the channels by whether category gating
//! managed to narrow the pool. Everything here returns new candidate
//! vectors; rows are never patched in place.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use lares_devices::{CapabilityDoc, Device, SpecIndex};
use lares_parser::QueryIR;

use crate::candidate::{Candidate, EntityKind};
use crate::scope::normalize_room;
use crate::text::{contains_cjk, similarity};

pub const DEFAULT_KEYWORD_WEIGHT: f64 = 1.0;
pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.3;
/// Weights used when gating had no usable category.
pub const FALLBACK_KEYWORD_WEIGHT: f64 = 1.2;
pub const FALLBACK_VECTOR_WEIGHT: f64 = 0.2;

/// Flat bonus for candidates whose device room is in the include set.
pub const ROOM_MATCH_BONUS: f64 = 0.2;

/// Default relative-score cutoff applied after normalization.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.3;

pub const REASON_ROOM_MATCH: &str = "room_match";
pub const REASON_CAPABILITY_FORCED: &str = "capability_forced";

/// Channel weights for one fusion pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub keyword: f64,
    pub vector: f64,
}

impl FusionWeights {
    /// Weights for a gated pool.
    pub fn standard() -> Self {
        Self {
            keyword: DEFAULT_KEYWORD_WEIGHT,
            vector: DEFAULT_VECTOR_WEIGHT,
        }
    }

    /// Weights leaning on lexical signal when the type is unresolved.
    pub fn lexical_fallback() -> Self {
        Self {
            keyword: FALLBACK_KEYWORD_WEIGHT,
            vector: FALLBACK_VECTOR_WEIGHT,
        }
    }

    /// Pick the profile for a gating outcome.
    pub fn for_category(category: Option<&str>) -> Self {
        if category.is_some() {
            Self::standard()
        } else {
            Self::lexical_fallback()
        }
    }
}

/// Merge keyword and vector hits over (entity, capability) pairs.
pub fn merge_and_score(
    keyword: &[Candidate],
    vector: &[Candidate],
    weights: FusionWeights,
) -> Vec<Candidate> {
    let mut keyword_by_device: HashMap<&str, &Candidate> = HashMap::new();
    for hit in keyword {
        keyword_by_device
            .entry(hit.entity_id.as_str())
            .and_modify(|best| {
                if hit.keyword_score > best.keyword_score {
                    *best = hit;
                }
            })
            .or_insert(hit);
    }

    let mut fused: Vec<Candidate> = Vec::new();
    let mut devices_with_vector: HashSet<&str> = HashSet::new();

    for hit in vector {
        devices_with_vector.insert(hit.entity_id.as_str());
        let lexical = keyword_by_device.get(hit.entity_id.as_str());
        let keyword_score = lexical.map(|c| c.keyword_score).unwrap_or(0.0);
        let total = keyword_score * weights.keyword + hit.vector_score * weights.vector;

        let mut candidate = Candidate {
            entity_id: hit.entity_id.clone(),
            entity_kind: hit.entity_kind,
            capability_id: hit.capability_id.clone(),
            keyword_score,
            vector_score: hit.vector_score,
            total_score: total,
            reasons: Vec::new(),
        };
        candidate.reasons = match lexical {
            Some(lexical) => union_reasons(&lexical.reasons, &hit.reasons),
            None => hit.reasons.clone(),
        };
        fused.push(candidate);
    }

    let mut standalone_seen: HashSet<&str> = HashSet::new();
    for hit in keyword {
        if devices_with_vector.contains(hit.entity_id.as_str()) {
            continue;
        }
        if !standalone_seen.insert(hit.entity_id.as_str()) {
            continue;
        }
        let mut candidate = hit.clone();
        candidate.vector_score = 0.0;
        candidate.total_score = hit.keyword_score * weights.keyword;
        fused.push(candidate);
    }

    fused.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(Ordering::Equal)
    });
    fused
}

/// Add the flat room bonus to candidates whose device sits in an included
/// room.
pub fn apply_room_bonus(
    candidates: Vec<Candidate>,
    ir: &QueryIR,
    devices: &[Device],
) -> Vec<Candidate> {
    let include: BTreeSet<String> = ir
        .scope_include
        .iter()
        .map(|room| normalize_room(room))
        .filter(|room| !room.is_empty())
        .collect();
    if include.is_empty() {
        return candidates;
    }

    let rooms: HashMap<&str, String> = devices
        .iter()
        .map(|device| (device.id.as_str(), normalize_room(&device.room)))
        .collect();

    candidates
        .into_iter()
        .map(|mut candidate| {
            let in_room = rooms
                .get(candidate.entity_id.as_str())
                .is_some_and(|room| !room.is_empty() && include.contains(room));
            if in_room {
                candidate.total_score += ROOM_MATCH_BONUS;
                if !candidate.reasons.iter().any(|r| r == REASON_ROOM_MATCH) {
                    candidate.reasons.push(REASON_ROOM_MATCH.to_string());
                }
            }
            candidate
        })
        .collect()
}

/// Keep the best-scoring row per entity, preserving encounter order.
pub fn dedup_per_entity(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut slot_by_entity: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        match slot_by_entity.get(&candidate.entity_id) {
            Some(&slot) => {
                if candidate.total_score > out[slot].total_score {
                    out[slot] = candidate;
                }
            }
            None => {
                slot_by_entity.insert(candidate.entity_id.clone(), out.len());
                out.push(candidate);
            }
        }
    }
    out
}

/// Min-max normalize total scores into `[0, 1]`; all-equal scores map to 1.0.
pub fn normalize_scores(candidates: Vec<Candidate>) -> Vec<Candidate> {
    if candidates.is_empty() {
        return candidates;
    }
    let max = candidates
        .iter()
        .map(|c| c.total_score)
        .fold(f64::NEG_INFINITY, f64::max);
    let min = candidates
        .iter()
        .map(|c| c.total_score)
        .fold(f64::INFINITY, f64::min);
    let span = max - min;

    candidates
        .into_iter()
        .map(|mut candidate| {
            candidate.total_score = if span <= f64::EPSILON {
                1.0
            } else {
                (candidate.total_score - min) / span
            };
            candidate
        })
        .collect()
}

/// Drop candidates below a relative-score threshold.
pub fn filter_by_threshold(candidates: Vec<Candidate>, threshold: f64) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|candidate| candidate.total_score >= threshold)
        .collect()
}

/// Pick the capability whose description best matches an action text.
///
/// Containment either way is a strong signal; enumerated value descriptions
/// found inside the action are nearly as strong; otherwise fuzzy similarity
/// decides. Nothing above 0.3 means no guess.
pub fn guess_capability(action: &str, docs: &[CapabilityDoc]) -> Option<String> {
    let action = action.trim().to_lowercase();
    if action.is_empty() || docs.is_empty() {
        return None;
    }

    let mut best: Option<(f64, &CapabilityDoc)> = None;
    for doc in docs {
        let description = doc.description.trim().to_lowercase();
        let mut score = 0.0f64;
        if !description.is_empty() {
            score = if action.contains(&description) || description.contains(&action) {
                0.9
            } else {
                similarity(&action, &description)
            };
        }
        for value in &doc.value_descriptions {
            let value = value.trim().to_lowercase();
            if !value.is_empty() && action.contains(&value) {
                score = score.max(0.8);
            }
        }
        if best.map_or(true, |(best_score, _)| score > best_score) {
            best = Some((score, doc));
        }
    }

    best.filter(|(score, _)| *score > 0.3)
        .map(|(_, doc)| doc.id.clone())
}

/// Fill missing capability ids on device candidates from the spec index.
pub fn backfill_capability_ids(
    candidates: Vec<Candidate>,
    action: &str,
    devices: &[Device],
    specs: &SpecIndex,
) -> Vec<Candidate> {
    let by_id: HashMap<&str, &Device> = devices
        .iter()
        .map(|device| (device.id.as_str(), device))
        .collect();

    candidates
        .into_iter()
        .map(|mut candidate| {
            if candidate.capability_id.is_none() && candidate.entity_kind == EntityKind::Device {
                if let Some(device) = by_id.get(candidate.entity_id.as_str()) {
                    if let Some(docs) = specs.docs_for(device) {
                        candidate.capability_id = guess_capability(action, docs);
                    }
                }
            }
            candidate
        })
        .collect()
}

/// Policy deciding when numeric commands force a capability re-guess.
///
/// Numeric parameter commands ("亮度调到50%") are capability-sensitive: the
/// vector channel may have picked a plausible but wrong capability, so the
/// id is re-derived from the action text instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericGuessPolicy {
    pub enabled: bool,
    /// Only trigger on CJK text.
    pub require_cjk: bool,
    /// Marker substrings that trigger alongside plain digits.
    pub markers: Vec<String>,
}

impl Default for NumericGuessPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            require_cjk: true,
            markers: vec!["%".to_string(), "取消".to_string()],
        }
    }
}

impl NumericGuessPolicy {
    /// Whether this query text should force a capability re-guess.
    pub fn should_force(&self, text: &str) -> bool {
        if !self.enabled {
            return false;
        }
        if self.require_cjk && !contains_cjk(text) {
            return false;
        }
        text.chars().any(|c| c.is_ascii_digit())
            || self
                .markers
                .iter()
                .any(|marker| !marker.is_empty() && text.contains(marker.as_str()))
    }
}

/// Re-derive capability ids for device candidates from the action text.
pub fn force_capability_guess(
    candidates: Vec<Candidate>,
    action: &str,
    devices: &[Device],
    specs: &SpecIndex,
) -> Vec<Candidate> {
    let by_id: HashMap<&str, &Device> = devices
        .iter()
        .map(|device| (device.id.as_str(), device))
        .collect();

    candidates
        .into_iter()
        .map(|mut candidate| {
            if candidate.entity_kind != EntityKind::Device {
                return candidate;
            }
            let Some(device) = by_id.get(candidate.entity_id.as_str()) else {
                return candidate;
            };
            let Some(docs) = specs.docs_for(device) else {
                return candidate;
            };
            if let Some(capability) = guess_capability(action, docs) {
                if candidate.capability_id.as_deref() != Some(capability.as_str()) {
                    candidate.capability_id = Some(capability);
                    candidate
                        .reasons
                        .push(REASON_CAPABILITY_FORCED.to_string());
                }
            }
            candidate
        })
        .collect()
}

fn union_reasons(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for reason in a.iter().chain(b.iter()) {
        if seen.insert(reason.as_str()) {
            out.push(reason.clone());
        }
    }
    out
}
