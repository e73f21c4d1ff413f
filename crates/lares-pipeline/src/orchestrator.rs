//! The end-to-end resolution funnel.
//!
//! One [`Pipeline`] serves one conversation. Per utterance it asks the
//! model for structured commands, then runs every command through
//! reference resolution, category gating, scope filtering, both search
//! channels, fusion, and either the bulk engine or the top-k gate.
//! Commands resolve strictly in order so that a later command can refer
//! back to the device an earlier one selected.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use lares_core::{LlmClient, Result};
use lares_devices::{filter_by_category, map_type_to_category, Device, CATEGORY_UNKNOWN};
use lares_parser::{
    compile_ir, default_system_prompt, CommandParser, ParsedCommand, ParserMetrics, QueryIR,
    REFERENCE_LAST,
};
use lares_retrieval::{
    apply_scope_filters, fusion, hints, select_top, similarity, vector_query, BulkResolver,
    FusionWeights, KeywordSearcher, RetrievalResult, VectorSearcher,
};

use crate::config::PipelineConfig;
use crate::state::ConversationState;

/// Name-similarity floor below which a device does not count as "named by"
/// the hint during category inference.
const INFER_NAME_SIMILARITY: f64 = 0.6;

/// One command's slice of a multi-command utterance.
#[derive(Debug)]
pub struct CommandResolution {
    pub command: ParsedCommand,
    /// Per-command outcome; a collaborator failure lands here instead of
    /// failing the whole utterance.
    pub result: Result<RetrievalResult>,
}

/// Aggregate outcome of one utterance, in command order.
#[derive(Debug, Default)]
pub struct MultiRetrievalResult {
    pub commands: Vec<CommandResolution>,
}

impl MultiRetrievalResult {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The first command that resolved successfully, if any.
    pub fn first_ok(&self) -> Option<&RetrievalResult> {
        self.commands
            .iter()
            .find_map(|resolution| resolution.result.as_ref().ok())
    }
}

/// Orchestrates the full funnel over pluggable collaborators.
pub struct Pipeline {
    /// Model collaborator for command parsing and bulk arbitration.
    llm: Arc<dyn LlmClient>,
    /// Semantic channel, also carries the capability spec index.
    searcher: Arc<dyn VectorSearcher>,
    /// The parser owns cumulative metrics, hence the lock.
    parser: Mutex<CommandParser>,
    keyword: KeywordSearcher,
    bulk: BulkResolver,
    config: PipelineConfig,
    state: RwLock<ConversationState>,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn LlmClient>, searcher: Arc<dyn VectorSearcher>) -> Self {
        Self::with_config(llm, searcher, PipelineConfig::default())
    }

    pub fn with_config(
        llm: Arc<dyn LlmClient>,
        searcher: Arc<dyn VectorSearcher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            parser: Mutex::new(CommandParser::with_config(config.parser.clone())),
            keyword: KeywordSearcher::new().with_top_k(config.search.keyword_top_k),
            bulk: BulkResolver::with_config(config.bulk.clone()),
            state: RwLock::new(ConversationState::new()),
            llm,
            searcher,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Snapshot of the parser's cumulative metrics.
    pub async fn parser_metrics(&self) -> ParserMetrics {
        self.parser.lock().await.metrics().clone()
    }

    /// The device the conversation last resolved to, if any.
    pub async fn last_mentioned(&self) -> Option<Device> {
        self.state.read().await.last_mentioned().cloned()
    }

    /// Forget the conversation state.
    pub async fn reset_state(&self) {
        self.state.write().await.clear();
    }

    /// Resolve every command in one utterance, strictly in order.
    ///
    /// The initial model call covers the whole utterance, so its failure
    /// fails the call. After that, each command resolves independently:
    /// a collaborator failure is recorded on that command's entry and the
    /// remaining commands still run.
    pub async fn retrieve(&self, text: &str, devices: &[Device]) -> Result<MultiRetrievalResult> {
        let request_id = Uuid::new_v4();
        let reply = self
            .llm
            .generate_with_prompt(text, &default_system_prompt())
            .await?;

        let outcome = {
            let mut parser = self.parser.lock().await;
            parser.parse(&reply)
        };
        if outcome.degraded {
            warn!(
                "pipeline request={} degraded parse errors={:?}",
                request_id, outcome.errors
            );
        }
        debug!(
            "pipeline request={} commands={} devices={}",
            request_id,
            outcome.commands.len(),
            devices.len()
        );

        let mut commands = Vec::with_capacity(outcome.commands.len());
        for command in outcome.commands {
            let result = self.resolve_command(&command, text, devices, request_id).await;
            if let Err(error) = &result {
                warn!(
                    "pipeline request={} command={} failed: {}",
                    request_id, command.raw, error
                );
            }
            commands.push(CommandResolution { command, result });
        }

        Ok(MultiRetrievalResult { commands })
    }

    /// Resolve one utterance and keep only the first command's result.
    pub async fn retrieve_single(&self, text: &str, devices: &[Device]) -> Result<RetrievalResult> {
        let multi = self.retrieve(text, devices).await?;
        match multi.commands.into_iter().next() {
            Some(resolution) => resolution.result,
            None => Ok(RetrievalResult::empty_with_hint(hints::NO_TARGETS)),
        }
    }

    async fn resolve_command(
        &self,
        command: &ParsedCommand,
        utterance: &str,
        devices: &[Device],
        request_id: Uuid,
    ) -> Result<RetrievalResult> {
        let mut ir = compile_ir(command, utterance);

        // Back-reference: substitute the remembered device's name so the
        // keyword channel can find it again.
        if ir.wants_last_mentioned() {
            let state = self.state.read().await;
            match state.resolve_reference(REFERENCE_LAST) {
                Some(device) => {
                    debug!(
                        "pipeline request={} reference last-mentioned -> {}",
                        request_id, device.id
                    );
                    ir.name_hint = Some(device.name.clone());
                }
                None => {
                    debug!(
                        "pipeline request={} reference last-mentioned unresolved",
                        request_id
                    );
                }
            }
        }

        // Category gating. The catch-all hint never gates; when the model
        // gave no usable type, try to infer one from the named device.
        let mut category =
            map_type_to_category(&ir.type_hint).filter(|mapped| *mapped != CATEGORY_UNKNOWN);
        if category.is_none() {
            if let Some(inferred) = infer_category_from_name(ir.name_hint.as_deref(), devices) {
                debug!(
                    "pipeline request={} inferred_category={} from name hint",
                    request_id, inferred
                );
                ir.type_hint = inferred.to_string();
                category = Some(inferred);
            }
        }
        let gated = match category {
            Some(category) => {
                let gated = filter_by_category(devices, category);
                debug!(
                    "pipeline request={} mapped_category={} gating_before={} gating_after={}",
                    request_id,
                    category,
                    devices.len(),
                    gated.len()
                );
                gated
            }
            None => devices.to_vec(),
        };

        // Scope filtering with its ambiguity annotations.
        let (scoped, scope_meta) = apply_scope_filters(&gated, &ir);
        if scoped.is_empty() {
            debug!("pipeline request={} scope emptied the pool", request_id);
            let mut result = RetrievalResult::empty_with_hint(hints::NO_TARGETS);
            result.meta.extend(scope_meta);
            return Ok(result);
        }

        // Both search paths read the same index; the fingerprint cache
        // makes re-indexing an unchanged catalog a no-op.
        self.searcher.index(devices).await?;

        if ir.is_bulk() {
            let arbiter: Option<&dyn LlmClient> = if self.config.arbitration_enabled() {
                Some(self.llm.as_ref())
            } else {
                None
            };
            let mut result = self
                .bulk
                .resolve(&ir, &scoped, self.searcher.as_ref(), arbiter, self.config.search.top_k)
                .await?;
            result.meta.extend(scope_meta);
            return Ok(result);
        }

        self.resolve_single(&ir, category, &scoped, scope_meta, request_id)
            .await
    }

    async fn resolve_single(
        &self,
        ir: &QueryIR,
        category: Option<&str>,
        scoped: &[Device],
        scope_meta: BTreeMap<String, Value>,
        request_id: Uuid,
    ) -> Result<RetrievalResult> {
        let keyword = self.keyword.search(ir, scoped);

        let gated_ids: BTreeSet<String> = scoped.iter().map(|device| device.id.clone()).collect();
        let query = vector_query(ir);
        let vector = self
            .searcher
            .search(query, self.config.search.vector_top_k, Some(&gated_ids))
            .await?;
        debug!(
            "pipeline request={} keyword_hits={} vector_hits={} query={}",
            request_id,
            keyword.len(),
            vector.len(),
            query
        );

        let specs = self.searcher.spec_index();
        let fused = fusion::merge_and_score(&keyword, &vector, FusionWeights::for_category(category));
        let fused = fusion::apply_room_bonus(fused, ir, scoped);
        let fused = fusion::backfill_capability_ids(fused, &ir.action, scoped, specs);
        let fused = if self.config.search.numeric_guess.should_force(query) {
            fusion::force_capability_guess(fused, &ir.action, scoped, specs)
        } else {
            fused
        };
        let fused = fusion::dedup_per_entity(fused);
        let fused = fusion::normalize_scores(fused);
        let fused = fusion::filter_by_threshold(fused, self.config.search.score_threshold);
        let selection = select_top(
            fused,
            self.config.search.top_k,
            self.config.search.close_threshold,
        );
        debug!(
            "pipeline request={} selected={} hint={:?}",
            request_id,
            selection.candidates.len(),
            selection.hint
        );

        // Remember the winner for later back-references.
        if let Some(top) = selection.candidates.first() {
            if let Some(device) = scoped.iter().find(|device| device.id == top.entity_id) {
                self.state.write().await.update_mentioned(device.clone());
            }
        }

        let mut result = RetrievalResult {
            candidates: selection.candidates,
            hint: selection.hint,
            ..RetrievalResult::default()
        };
        result.meta.extend(scope_meta);
        Ok(result)
    }
}

/// Infer a gating category from the devices the name hint points at.
///
/// Only a unanimous verdict gates: every device whose name relates to the
/// hint must canonicalize to the same non-catch-all category, otherwise
/// gating is skipped entirely.
fn infer_category_from_name(name_hint: Option<&str>, devices: &[Device]) -> Option<&'static str> {
    let name = name_hint?.trim();
    if name.is_empty() {
        return None;
    }

    let mut categories: BTreeSet<&'static str> = BTreeSet::new();
    for device in devices {
        let device_name = device.name.trim();
        if device_name.is_empty() {
            continue;
        }
        let related = device_name.contains(name)
            || name.contains(device_name)
            || similarity(name, device_name) > INFER_NAME_SIMILARITY;
        if !related {
            continue;
        }
        match map_type_to_category(&device.category) {
            Some(category) => {
                categories.insert(category);
            }
            // A matching device outside the closed set breaks unanimity.
            None => return None,
        }
    }

    let mut iter = categories.into_iter();
    match (iter.next(), iter.next()) {
        (Some(category), None) if category != CATEGORY_UNKNOWN => Some(category),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Device> {
        vec![
            Device::new("ac-1", "大白").with_room("客厅").with_category("AirConditioner"),
            Device::new("lamp-1", "客厅主灯").with_room("客厅").with_category("Light"),
            Device::new("lamp-2", "卧室主灯").with_room("卧室").with_category("Light"),
        ]
    }

    #[test]
    fn test_infer_category_unanimous_match() {
        let devices = catalog();
        assert_eq!(
            infer_category_from_name(Some("大白"), &devices),
            Some("AirConditioner")
        );
        assert_eq!(infer_category_from_name(Some("主灯"), &devices), Some("Light"));
    }

    #[test]
    fn test_infer_category_requires_unanimity() {
        let mut devices = catalog();
        // A second 大白 of a different category makes the verdict split.
        devices.push(Device::new("fan-1", "大白风扇").with_category("Fan"));

        assert_eq!(infer_category_from_name(Some("大白"), &devices), None);
    }

    #[test]
    fn test_infer_category_ignores_unrelated_names() {
        let devices = catalog();
        assert_eq!(infer_category_from_name(Some("洗衣机"), &devices), None);
        assert_eq!(infer_category_from_name(None, &devices), None);
        assert_eq!(infer_category_from_name(Some("  "), &devices), None);
    }

    #[test]
    fn test_infer_category_rejects_uncanonical_category() {
        let devices = vec![Device::new("x-1", "神秘盒子").with_category("mystery")];
        assert_eq!(infer_category_from_name(Some("神秘盒子"), &devices), None);
    }

    #[test]
    fn test_infer_category_skips_catch_all() {
        let devices = vec![Device::new("x-1", "小盒子").with_category("Unknown")];
        assert_eq!(infer_category_from_name(Some("小盒子"), &devices), None);
    }
}
