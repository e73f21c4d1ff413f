//! Vector search over a capability-level corpus.
//!
//! One document per (device, capability) pair: resolved category, capability
//! id, synonym-enriched description, and enumerated value descriptions.
//! Devices without a linked profile fall back to a name/room/category
//! document with no capability id. The in-memory searcher embeds documents
//! in small chunks and caches the index by a (device-id, profile-id)
//! fingerprint so unchanged device sets are never re-embedded.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use lares_core::{Error, Result};
use lares_devices::enrich::{capability_document, fallback_document};
use lares_devices::{Device, SpecIndex};
use lares_parser::QueryIR;

use crate::candidate::Candidate;

/// Documents are embedded in chunks of this size.
pub const EMBED_CHUNK_SIZE: usize = 10;

/// Reason tag attached to vector-channel candidates.
pub const REASON_VECTOR: &str = "vector";

/// Text-to-vector encoder collaborator.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Encode each text into one vector, preserving order.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Vector-search collaborator used by the resolution pipeline.
#[async_trait]
pub trait VectorSearcher: Send + Sync {
    /// Build or refresh the index for the given device set. Idempotent.
    async fn index(&self, devices: &[Device]) -> Result<()>;

    /// Rank indexed documents against a query.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        device_filter: Option<&BTreeSet<String>>,
    ) -> Result<Vec<Candidate>>;

    /// The capability spec index backing this searcher.
    fn spec_index(&self) -> &SpecIndex;
}

/// One indexed document.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub device_id: String,
    pub capability_id: Option<String>,
    pub document: String,
}

/// Build the command-level corpus for a device set.
pub fn corpus_entries(devices: &[Device], specs: &SpecIndex) -> Vec<CorpusEntry> {
    let mut entries = Vec::new();
    for device in devices {
        match specs.docs_for(device) {
            Some(docs) if !docs.is_empty() => {
                for doc in docs {
                    entries.push(CorpusEntry {
                        device_id: device.id.clone(),
                        capability_id: Some(doc.id.clone()),
                        document: capability_document(device, doc),
                    });
                }
            }
            _ => entries.push(CorpusEntry {
                device_id: device.id.clone(),
                capability_id: None,
                document: fallback_document(device),
            }),
        }
    }
    entries
}

/// Query text for the vector channel.
///
/// The action is the query. Actions carrying Latin letters are usually the
/// model echoing an entity name rather than a verb, and an empty action
/// means the command fell back to UNKNOWN; both cases use the raw utterance
/// instead.
pub fn vector_query(ir: &QueryIR) -> &str {
    let action = ir.action.trim();
    if action.is_empty() || action.chars().any(|c| c.is_ascii_alphabetic()) {
        ir.raw.as_str()
    } else {
        action
    }
}

/// Cosine similarity; zero-norm vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Default)]
struct IndexState {
    entries: Vec<CorpusEntry>,
    vectors: Vec<Vec<f32>>,
    fingerprint: Vec<(String, String)>,
}

/// Embedder-backed searcher holding the whole index in memory.
pub struct InMemoryVectorSearcher {
    embedder: Arc<dyn TextEmbedder>,
    specs: SpecIndex,
    state: RwLock<IndexState>,
}

impl InMemoryVectorSearcher {
    /// Create a searcher over an embedder and a capability spec index.
    pub fn new(embedder: Arc<dyn TextEmbedder>, specs: SpecIndex) -> Self {
        Self {
            embedder,
            specs,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Number of indexed documents.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Whether the index holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }
}

fn fingerprint_of(devices: &[Device]) -> Vec<(String, String)> {
    let mut fingerprint: Vec<(String, String)> = devices
        .iter()
        .map(|device| {
            (
                device.id.clone(),
                device.profile_id.clone().unwrap_or_default(),
            )
        })
        .collect();
    fingerprint.sort();
    fingerprint
}

#[async_trait]
impl VectorSearcher for InMemoryVectorSearcher {
    async fn index(&self, devices: &[Device]) -> Result<()> {
        if devices.is_empty() {
            let mut state = self.state.write().await;
            *state = IndexState::default();
            debug!("vector_index cleared");
            return Ok(());
        }

        let fingerprint = fingerprint_of(devices);
        {
            let state = self.state.read().await;
            if state.fingerprint == fingerprint && !state.entries.is_empty() {
                debug!(entries = state.entries.len(), "vector_index unchanged");
                return Ok(());
            }
        }

        let entries = corpus_entries(devices, &self.specs);
        let documents: Vec<String> = entries.iter().map(|entry| entry.document.clone()).collect();

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(documents.len());
        for chunk in documents.chunks(EMBED_CHUNK_SIZE) {
            let embedded = self.embedder.encode(chunk).await?;
            vectors.extend(embedded);
        }
        if vectors.len() != entries.len() {
            return Err(Error::embedding(format!(
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                entries.len()
            )));
        }

        debug!(
            entries = entries.len(),
            devices = devices.len(),
            "vector_index built"
        );
        let mut state = self.state.write().await;
        *state = IndexState {
            entries,
            vectors,
            fingerprint,
        };
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        device_filter: Option<&BTreeSet<String>>,
    ) -> Result<Vec<Candidate>> {
        {
            let state = self.state.read().await;
            if state.entries.is_empty() {
                return Ok(Vec::new());
            }
        }

        let query_vectors = self.embedder.encode(&[query.to_string()]).await?;
        let query_vector = query_vectors
            .first()
            .ok_or_else(|| Error::embedding("embedder returned no vector for query"))?;

        let state = self.state.read().await;
        let mut hits: Vec<Candidate> = state
            .entries
            .iter()
            .zip(state.vectors.iter())
            .filter(|(entry, _)| {
                device_filter.is_none_or(|filter| filter.contains(&entry.device_id))
            })
            .map(|(entry, vector)| {
                let score = f64::from(cosine_similarity(query_vector, vector));
                let mut candidate = Candidate::device(&entry.device_id)
                    .with_vector_score(score)
                    .with_total_score(score)
                    .with_reason(REASON_VECTOR);
                candidate.capability_id = entry.capability_id.clone();
                candidate
            })
            .collect();

        // Stable sort keeps insertion order for equal scores.
        hits.sort_by(|a, b| {
            b.vector_score
                .partial_cmp(&a.vector_score)
                .unwrap_or(Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    fn spec_index(&self) -> &SpecIndex {
        &self.specs
    }
}

/// One pre-programmed search hit for [`StubVectorSearcher`].
#[derive(Debug, Clone)]
pub struct StubHit {
    pub device_id: String,
    pub capability_id: Option<String>,
    pub score: f64,
}

impl StubHit {
    pub fn new(device_id: impl Into<String>, capability_id: impl Into<String>, score: f64) -> Self {
        Self {
            device_id: device_id.into(),
            capability_id: Some(capability_id.into()),
            score,
        }
    }

    /// A hit without a capability id (fallback-document style).
    pub fn bare(device_id: impl Into<String>, score: f64) -> Self {
        Self {
            device_id: device_id.into(),
            capability_id: None,
            score,
        }
    }
}

/// Scripted searcher for tests: replies are keyed by query text.
#[derive(Default)]
pub struct StubVectorSearcher {
    specs: SpecIndex,
    replies: HashMap<String, Vec<StubHit>>,
    default_reply: Vec<StubHit>,
    fail_with: Option<String>,
    indexed: RwLock<Vec<String>>,
    queries: RwLock<Vec<String>>,
}

impl StubVectorSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a capability spec index.
    pub fn with_spec_index(mut self, specs: SpecIndex) -> Self {
        self.specs = specs;
        self
    }

    /// Script the reply for one exact query.
    pub fn with_reply(mut self, query: impl Into<String>, hits: Vec<StubHit>) -> Self {
        self.replies.insert(query.into(), hits);
        self
    }

    /// Script the reply for any query without an exact entry.
    pub fn with_default_reply(mut self, hits: Vec<StubHit>) -> Self {
        self.default_reply = hits;
        self
    }

    /// Make every search fail with an embedding error.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Device ids passed to the last `index` call.
    pub async fn indexed_devices(&self) -> Vec<String> {
        self.indexed.read().await.clone()
    }

    /// Every query passed to `search`, in order.
    pub async fn recorded_queries(&self) -> Vec<String> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl VectorSearcher for StubVectorSearcher {
    async fn index(&self, devices: &[Device]) -> Result<()> {
        let mut indexed = self.indexed.write().await;
        *indexed = devices.iter().map(|device| device.id.clone()).collect();
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        device_filter: Option<&BTreeSet<String>>,
    ) -> Result<Vec<Candidate>> {
        if let Some(message) = &self.fail_with {
            return Err(Error::embedding(message.clone()));
        }
        self.queries.write().await.push(query.to_string());

        let hits = self.replies.get(query).unwrap_or(&self.default_reply);
        let mut candidates: Vec<Candidate> = hits
            .iter()
            .filter(|hit| device_filter.is_none_or(|filter| filter.contains(&hit.device_id)))
            .map(|hit| {
                let mut candidate = Candidate::device(&hit.device_id)
                    .with_vector_score(hit.score)
                    .with_total_score(hit.score)
                    .with_reason(REASON_VECTOR);
                candidate.capability_id = hit.capability_id.clone();
                candidate
            })
            .collect();
        candidates.truncate(top_k);
        Ok(candidates)
    }

    fn spec_index(&self) -> &SpecIndex {
        &self.specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use lares_devices::{CapabilityDoc, ValueOption};

    /// Maps documents to vectors by marker substring; counts encode calls.
    struct FakeEmbedder {
        markers: Vec<(&'static str, Vec<f32>)>,
        calls: AtomicUsize,
    }

    impl FakeEmbedder {
        fn new(markers: Vec<(&'static str, Vec<f32>)>) -> Self {
            Self {
                markers,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait]
    impl TextEmbedder for FakeEmbedder {
        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(texts
                .iter()
                .map(|text| {
                    self.markers
                        .iter()
                        .find(|(marker, _)| text.contains(marker))
                        .map(|(_, vector)| vector.clone())
                        .unwrap_or_else(|| vec![0.1, 0.1])
                })
                .collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl TextEmbedder for BrokenEmbedder {
        async fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(Vec::new())
        }
    }

    fn specs() -> SpecIndex {
        let mut specs = SpecIndex::new();
        specs.insert(
            "p-light",
            vec![
                CapabilityDoc::new("cap-on")
                    .with_description("enable")
                    .with_value_options(vec![ValueOption::new("high").with_description("high")]),
                CapabilityDoc::new("cap-level").with_description("adjust brightness"),
            ],
        );
        specs
    }

    fn devices() -> Vec<Device> {
        vec![
            Device::new("d1", "Lamp")
                .with_room("Living")
                .with_category("Light")
                .with_profile("p-light"),
            Device::new("d2", "Heater").with_room("Bedroom").with_category("Unknown"),
        ]
    }

    #[test]
    fn test_corpus_layout() {
        let entries = corpus_entries(&devices(), &specs());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].capability_id.as_deref(), Some("cap-on"));
        assert_eq!(entries[1].capability_id.as_deref(), Some("cap-level"));
        assert!(entries[2].capability_id.is_none());

        assert!(entries[0].document.contains("Light"));
        assert!(entries[0].document.contains("cap-on"));
        // Fallback document carries name, room, and category.
        assert!(entries[2].document.contains("Heater"));
        assert!(entries[2].document.contains("Bedroom"));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_vector_query_falls_back_on_latin_or_empty_action() {
        use lares_parser::{compile_ir, ParsedCommand, ScopeSlot, TargetSlot};

        let ir = |action: &str| {
            let command = ParsedCommand::new(action, ScopeSlot::default(), TargetSlot::default());
            compile_ir(&command, "打开客厅的灯")
        };

        assert_eq!(vector_query(&ir("打开")), "打开");
        // Latin letters usually mean the model echoed a device name.
        assert_eq!(vector_query(&ir("打开lamp")), "打开客厅的灯");
        assert_eq!(vector_query(&ir("")), "打开客厅的灯");
    }

    #[tokio::test]
    async fn test_search_ranks_by_cosine() {
        let embedder = Arc::new(FakeEmbedder::new(vec![
            ("cap-on", vec![1.0, 0.0]),
            ("cap-level", vec![0.5, 0.5]),
            ("打开", vec![1.0, 0.0]),
        ]));
        let searcher = InMemoryVectorSearcher::new(embedder, specs());

        searcher.index(&devices()).await.unwrap();
        let hits = searcher.search("打开", 10, None).await.unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].capability_id.as_deref(), Some("cap-on"));
        assert!((hits[0].vector_score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].capability_id.as_deref(), Some("cap-level"));
        assert_eq!(hits[0].reasons, vec![REASON_VECTOR]);
    }

    #[tokio::test]
    async fn test_search_respects_device_filter() {
        let embedder = Arc::new(FakeEmbedder::new(vec![("打开", vec![1.0, 0.0])]));
        let searcher = InMemoryVectorSearcher::new(embedder, specs());
        searcher.index(&devices()).await.unwrap();

        let filter: BTreeSet<String> = ["d2".to_string()].into();
        let hits = searcher.search("打开", 10, Some(&filter)).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, "d2");
    }

    #[tokio::test]
    async fn test_index_caches_by_fingerprint() {
        let embedder = Arc::new(FakeEmbedder::new(Vec::new()));
        let searcher = InMemoryVectorSearcher::new(embedder.clone(), specs());

        searcher.index(&devices()).await.unwrap();
        let calls_after_first = embedder.calls();
        assert!(calls_after_first > 0);

        // Same set again: no re-embedding.
        searcher.index(&devices()).await.unwrap();
        assert_eq!(embedder.calls(), calls_after_first);

        // A changed set rebuilds.
        let mut changed = devices();
        changed.push(Device::new("d3", "Extra"));
        searcher.index(&changed).await.unwrap();
        assert!(embedder.calls() > calls_after_first);
    }

    #[tokio::test]
    async fn test_index_clears_on_empty_devices() {
        let embedder = Arc::new(FakeEmbedder::new(Vec::new()));
        let searcher = InMemoryVectorSearcher::new(embedder, specs());

        searcher.index(&devices()).await.unwrap();
        assert!(!searcher.is_empty().await);

        searcher.index(&[]).await.unwrap();
        assert!(searcher.is_empty().await);
        assert!(searcher.search("打开", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_rejects_vector_count_mismatch() {
        let searcher = InMemoryVectorSearcher::new(Arc::new(BrokenEmbedder), specs());
        let error = searcher.index(&devices()).await.unwrap_err();
        assert!(error.to_string().contains("vectors"));
    }

    #[tokio::test]
    async fn test_stub_searcher_scripted_replies() {
        let stub = StubVectorSearcher::new()
            .with_reply(
                "打开",
                vec![
                    StubHit::new("d1", "cap-on", 0.9),
                    StubHit::new("d2", "cap-on", 0.4),
                ],
            )
            .with_default_reply(vec![StubHit::bare("d9", 0.2)]);

        let hits = stub.search("打开", 10, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entity_id, "d1");

        let hits = stub.search("anything", 10, None).await.unwrap();
        assert_eq!(hits[0].entity_id, "d9");
        assert!(hits[0].capability_id.is_none());

        assert_eq!(stub.recorded_queries().await, vec!["打开", "anything"]);
    }

    #[tokio::test]
    async fn test_stub_searcher_failure() {
        let stub = StubVectorSearcher::new().with_failure("encode backend down");
        let error = stub.search("打开", 10, None).await.unwrap_err();
        assert!(matches!(error, Error::Embedding(_)));
    }
}
