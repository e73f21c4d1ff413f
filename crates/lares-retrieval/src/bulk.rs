//! Bulk resolution for all/except commands.
//!
//! A bulk command targets a whole class of devices, so the unit of
//! resolution is a capability, not a device. The engine aggregates vector
//! evidence per capability, arbitrates ambiguous aggregates through the
//! LLM, partitions the supporting devices into compatibility groups, and
//! chunks each group into execution batches.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use lares_core::{LlmClient, Result};
use lares_devices::{CapabilityDoc, Device, SpecIndex};
use lares_parser::QueryIR;

use crate::candidate::{hints, Candidate, CapabilityOption, Group, RetrievalResult};
use crate::vector::{vector_query, VectorSearcher};

pub const DEFAULT_OPTIONS_TOP_N: usize = 5;
pub const DEFAULT_OPTIONS_SEARCH_K: usize = 80;
pub const DEFAULT_EVIDENCE_PER_CAPABILITY: usize = 3;
pub const DEFAULT_BATCH_SIZE: i64 = 20;
pub const DEFAULT_TOP1_RATIO_THRESHOLD: f64 = 0.55;
pub const DEFAULT_MARGIN_THRESHOLD: f64 = 0.15;
pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 0.8;
pub const DEFAULT_MAX_TARGETS: usize = 200;
pub const DEFAULT_MAX_GROUPS: usize = 20;

/// Example device labels carried per option.
pub const MAX_OPTION_EXAMPLES: usize = 3;
/// Options surfaced on a clarification result.
pub const CLARIFICATION_OPTION_LIMIT: usize = 3;

pub const REASON_BULK: &str = "bulk";

/// Meta keys recorded on a bulk result.
pub mod meta_keys {
    pub const TOP1_RATIO: &str = "top1_ratio";
    pub const MARGIN: &str = "margin";
    pub const COVERAGE: &str = "coverage";
    pub const SUPPORT_COUNT: &str = "support_count";
    pub const TOTAL_DEVICES: &str = "total_devices";
}

/// Tunables for the bulk resolution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Capability options kept after evidence aggregation.
    pub options_top_n: usize,
    /// Vector-search breadth for evidence gathering.
    pub options_search_k: usize,
    /// Evidence scores summed per capability.
    pub evidence_per_capability: usize,
    /// Devices per execution batch; non-positive means one batch.
    pub batch_size: i64,
    pub top1_ratio_threshold: f64,
    pub margin_threshold: f64,
    pub coverage_threshold: f64,
    /// Hard ceiling on selected target devices.
    pub max_targets: usize,
    /// Hard ceiling on compatibility groups.
    pub max_groups: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            options_top_n: DEFAULT_OPTIONS_TOP_N,
            options_search_k: DEFAULT_OPTIONS_SEARCH_K,
            evidence_per_capability: DEFAULT_EVIDENCE_PER_CAPABILITY,
            batch_size: DEFAULT_BATCH_SIZE,
            top1_ratio_threshold: DEFAULT_TOP1_RATIO_THRESHOLD,
            margin_threshold: DEFAULT_MARGIN_THRESHOLD,
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
            max_targets: DEFAULT_MAX_TARGETS,
            max_groups: DEFAULT_MAX_GROUPS,
        }
    }
}

impl BulkConfig {
    pub fn with_options_top_n(mut self, options_top_n: usize) -> Self {
        self.options_top_n = options_top_n;
        self
    }

    pub fn with_options_search_k(mut self, options_search_k: usize) -> Self {
        self.options_search_k = options_search_k;
        self
    }

    pub fn with_evidence_per_capability(mut self, evidence_per_capability: usize) -> Self {
        self.evidence_per_capability = evidence_per_capability;
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_top1_ratio_threshold(mut self, threshold: f64) -> Self {
        self.top1_ratio_threshold = threshold;
        self
    }

    pub fn with_margin_threshold(mut self, threshold: f64) -> Self {
        self.margin_threshold = threshold;
        self
    }

    pub fn with_coverage_threshold(mut self, threshold: f64) -> Self {
        self.coverage_threshold = threshold;
        self
    }

    pub fn with_max_targets(mut self, max_targets: usize) -> Self {
        self.max_targets = max_targets;
        self
    }

    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups;
        self
    }
}

/// Resolves all/except commands into compatibility groups and batches.
#[derive(Debug, Default)]
pub struct BulkResolver {
    config: BulkConfig,
}

enum ArbitrationReply {
    Choice(usize),
    Question(String),
    Unusable,
}

impl BulkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BulkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Resolve a bulk command over an already scoped and gated device pool.
    ///
    /// `arbiter` handles low-confidence capability selection; pass `None`
    /// to answer ambiguity with a clarification result instead. Collaborator
    /// errors from the searcher or arbiter propagate.
    pub async fn resolve(
        &self,
        ir: &QueryIR,
        gated: &[Device],
        searcher: &dyn VectorSearcher,
        arbiter: Option<&dyn LlmClient>,
        top_k: usize,
    ) -> Result<RetrievalResult> {
        let specs = searcher.spec_index();
        let total_devices = gated.len();

        // Evidence aggregation over the gated pool.
        let gated_ids: BTreeSet<String> = gated.iter().map(|d| d.id.clone()).collect();
        let hits = searcher
            .search(vector_query(ir), self.config.options_search_k, Some(&gated_ids))
            .await?;

        let by_id: HashMap<&str, &Device> =
            gated.iter().map(|device| (device.id.as_str(), device)).collect();
        let mut evidence: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut descriptions: HashMap<String, String> = HashMap::new();
        for hit in &hits {
            let Some(capability) = hit.capability_id.as_ref() else {
                continue;
            };
            evidence
                .entry(capability.clone())
                .or_default()
                .push(hit.vector_score);
            if !descriptions.contains_key(capability) {
                if let Some(device) = by_id.get(hit.entity_id.as_str()) {
                    if let Some(doc) = specs.doc_for_capability(device, capability) {
                        descriptions.insert(capability.clone(), doc.description.clone());
                    }
                }
            }
        }

        if evidence.is_empty() {
            debug!("bulk_resolve no capability evidence, pool={}", total_devices);
            return Ok(RetrievalResult::empty_with_hint(hints::NO_TARGETS));
        }

        let mut ranked: Vec<(String, f64, Vec<f64>)> = evidence
            .into_iter()
            .map(|(capability, mut scores)| {
                scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
                scores.truncate(self.config.evidence_per_capability);
                let sum: f64 = scores.iter().sum();
                (capability, sum, scores)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked.truncate(self.config.options_top_n);

        let kept_total: f64 = ranked.iter().map(|(_, sum, _)| sum).sum();
        let options: Vec<CapabilityOption> = ranked
            .into_iter()
            .map(|(capability, score, evidence)| {
                let supporters: Vec<&Device> = gated
                    .iter()
                    .filter(|device| declares(specs, device, &capability))
                    .collect();
                let support_count = supporters.len();
                let coverage = if total_devices == 0 {
                    0.0
                } else {
                    support_count as f64 / total_devices as f64
                };
                CapabilityOption {
                    description: descriptions.get(&capability).cloned().unwrap_or_default(),
                    probability: if kept_total > 0.0 { score / kept_total } else { 0.0 },
                    support_count,
                    total_devices,
                    coverage,
                    examples: supporters
                        .iter()
                        .take(MAX_OPTION_EXAMPLES)
                        .map(|device| device.label())
                        .collect(),
                    capability_id: capability,
                    score,
                    evidence,
                }
            })
            .collect();

        // Confidence on the probability mass of the kept options.
        let top1_ratio = options.first().map(|o| o.probability).unwrap_or(0.0);
        let margin = match options.as_slice() {
            [first, second, ..] => first.probability - second.probability,
            [first] => first.probability,
            [] => 0.0,
        };
        let low_confidence = top1_ratio < self.config.top1_ratio_threshold
            || margin < self.config.margin_threshold;
        debug!(
            "bulk_resolve options={} top1_ratio={:.3} margin={:.3} low_confidence={}",
            options.len(),
            top1_ratio,
            margin,
            low_confidence
        );

        let selected = if !low_confidence {
            options[0].capability_id.clone()
        } else {
            let Some(arbiter) = arbiter else {
                return Ok(clarification_result(options, None));
            };
            let prompt = render_arbitration_prompt(ir, &options);
            let reply = arbiter.parse_with_prompt(&ir.raw, &prompt).await?;
            match parse_arbitration_reply(&reply, options.len()) {
                ArbitrationReply::Choice(index) => options[index].capability_id.clone(),
                ArbitrationReply::Question(question) => {
                    return Ok(clarification_result(options, Some(question)));
                }
                ArbitrationReply::Unusable => {
                    return Ok(clarification_result(options, None));
                }
            }
        };

        // Target selection.
        let targets: Vec<&Device> = gated
            .iter()
            .filter(|device| declares(specs, device, &selected))
            .collect();
        let support_count = targets.len();
        let coverage = if total_devices == 0 {
            0.0
        } else {
            support_count as f64 / total_devices as f64
        };
        let meta = selection_meta(top1_ratio, margin, coverage, support_count, total_devices);

        if targets.is_empty() {
            let mut result = RetrievalResult::empty_with_hint(hints::NO_TARGETS);
            result.selected_capability = Some(selected);
            result.options = options;
            result.meta = meta;
            return Ok(result);
        }
        if support_count > self.config.max_targets {
            debug!(
                "bulk_resolve capability={} targets={} over max_targets={}",
                selected, support_count, self.config.max_targets
            );
            let mut result = RetrievalResult::empty_with_hint(hints::TOO_MANY_TARGETS);
            result.selected_capability = Some(selected);
            result.options = options;
            result.meta = meta;
            return Ok(result);
        }

        // Compatibility grouping by declared value signature.
        let mut signature_order: Vec<String> = Vec::new();
        let mut members: HashMap<String, Vec<String>> = HashMap::new();
        for device in &targets {
            let signature = specs
                .doc_for_capability(device, &selected)
                .map(compatibility_signature)
                .unwrap_or_default();
            if !members.contains_key(&signature) {
                signature_order.push(signature.clone());
            }
            members.entry(signature).or_default().push(device.id.clone());
        }

        let mut groups: Vec<Group> = signature_order
            .iter()
            .enumerate()
            .map(|(index, signature)| Group {
                id: format!("group-{}", index + 1),
                name: format!("compatibility-{}", index + 1),
                device_ids: members.remove(signature).unwrap_or_default(),
            })
            .collect();
        groups.sort_by(|a, b| b.device_ids.len().cmp(&a.device_ids.len()));

        if groups.len() > self.config.max_groups {
            debug!(
                "bulk_resolve capability={} groups={} over max_groups={}",
                selected,
                groups.len(),
                self.config.max_groups
            );
            let mut result = RetrievalResult::empty_with_hint(hints::TOO_MANY_TARGETS);
            result.selected_capability = Some(selected);
            result.options = options;
            result.meta = meta;
            return Ok(result);
        }

        let mut hint = None;
        if coverage < self.config.coverage_threshold {
            hint = Some(hints::PARTIAL_COVERAGE.to_string());
        }
        if groups.len() > top_k {
            groups.truncate(top_k);
            hint = Some(hints::TOO_MANY_TARGETS.to_string());
        }

        let mut batches: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
        for group in &groups {
            batches.insert(
                group.id.clone(),
                split_into_batches(&group.device_ids, self.config.batch_size),
            );
        }

        let candidates: Vec<Candidate> = groups
            .iter()
            .map(|group| {
                Candidate::group(&group.id)
                    .with_capability(&selected)
                    .with_total_score(group.device_ids.len() as f64)
                    .with_reason(REASON_BULK)
            })
            .collect();

        debug!(
            "bulk_resolve capability={} targets={} groups={} coverage={:.3}",
            selected,
            support_count,
            groups.len(),
            coverage
        );

        Ok(RetrievalResult {
            candidates,
            hint,
            groups,
            batches,
            options,
            selected_capability: Some(selected),
            clarification: None,
            meta,
        })
    }
}

fn declares(specs: &SpecIndex, device: &Device, capability_id: &str) -> bool {
    device
        .profile_id
        .as_deref()
        .is_some_and(|profile_id| specs.profile_declares(profile_id, capability_id))
}

/// Signature under which two devices can share a bulk execution group.
fn compatibility_signature(doc: &CapabilityDoc) -> String {
    let range = doc
        .value_range
        .as_ref()
        .map(|range| format!("{}..{}{}", range.minimum, range.maximum, range.unit))
        .unwrap_or_default();
    let mut values: Vec<&str> = doc
        .value_options
        .iter()
        .map(|option| option.value.as_str())
        .collect();
    values.sort_unstable();
    values.dedup();
    format!(
        "{}|{}|{}",
        doc.value_type.as_deref().unwrap_or_default(),
        range,
        values.join(",")
    )
}

/// Split an ordered id list into fixed-size chunks.
///
/// A non-positive batch size yields a single batch; membership and order
/// are never changed.
pub fn split_into_batches(ids: &[String], batch_size: i64) -> Vec<Vec<String>> {
    if ids.is_empty() {
        return Vec::new();
    }
    if batch_size <= 0 {
        return vec![ids.to_vec()];
    }
    ids.chunks(batch_size as usize)
        .map(|chunk| chunk.to_vec())
        .collect()
}

fn clarification_result(
    mut options: Vec<CapabilityOption>,
    question: Option<String>,
) -> RetrievalResult {
    options.truncate(CLARIFICATION_OPTION_LIMIT);
    let mut result = RetrievalResult::empty_with_hint(hints::NEED_CLARIFICATION);
    result.options = options;
    result.clarification = question;
    result
}

fn render_arbitration_prompt(ir: &QueryIR, options: &[CapabilityOption]) -> String {
    let mut prompt = String::new();
    prompt.push_str("你是智能家居的批量指令裁决助手。用户的指令同时匹配多种设备能力,请从候选能力中选出最符合指令意图的一项。\n\n");
    prompt.push_str(&format!("用户指令:{}\n\n候选能力:\n", ir.raw));
    for (index, option) in options.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} (支持设备 {}/{}",
            index, option.description, option.support_count, option.total_devices
        ));
        if !option.examples.is_empty() {
            prompt.push_str(&format!(",例如 {}", option.examples.join("、")));
        }
        prompt.push_str(")\n");
    }
    prompt.push_str(
        "\n仅输出 JSON:能确定时输出 {\"choice_index\": 序号},无法确定时输出 {\"question\": \"向用户提出的澄清问题\"}。\n",
    );
    prompt
}

fn parse_arbitration_reply(value: &Value, option_count: usize) -> ArbitrationReply {
    if let Some(index) = value.get("choice_index").and_then(Value::as_i64) {
        if index >= 0 && (index as usize) < option_count {
            return ArbitrationReply::Choice(index as usize);
        }
        return ArbitrationReply::Unusable;
    }
    if let Some(question) = value.get("question").and_then(Value::as_str) {
        let question = question.trim();
        if !question.is_empty() {
            return ArbitrationReply::Question(question.to_string());
        }
    }
    ArbitrationReply::Unusable
}

fn selection_meta(
    top1_ratio: f64,
    margin: f64,
    coverage: f64,
    support_count: usize,
    total_devices: usize,
) -> BTreeMap<String, Value> {
    let mut meta = BTreeMap::new();
    meta.insert(meta_keys::TOP1_RATIO.to_string(), json!(top1_ratio));
    meta.insert(meta_keys::MARGIN.to_string(), json!(margin));
    meta.insert(meta_keys::COVERAGE.to_string(), json!(coverage));
    meta.insert(meta_keys::SUPPORT_COUNT.to_string(), json!(support_count));
    meta.insert(meta_keys::TOTAL_DEVICES.to_string(), json!(total_devices));
    meta
}
