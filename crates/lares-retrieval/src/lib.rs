//! Device retrieval for natural-language commands.
//!
//! Provides:
//! - Text similarity primitives tuned for mixed CJK/Latin names
//! - Room-scope resolution with name-derived room fallback
//! - Keyword search over names, rooms, types, and actions
//! - The vector-search trait with in-memory and stub searchers
//! - Keyword/vector score fusion with capability backfill
//! - The top-k selection gate
//! - Bulk resolution for all/except commands
//! - Category coverage and gating-recall statistics

pub mod bulk;
pub mod candidate;
pub mod fusion;
pub mod gate;
pub mod keyword;
pub mod metrics;
pub mod scope;
pub mod text;
pub mod vector;

// Re-export commonly used types
pub use bulk::{split_into_batches, BulkConfig, BulkResolver};
pub use candidate::{
    hints, Candidate, CapabilityOption, EntityKind, Group, RetrievalResult,
};
pub use fusion::{
    apply_room_bonus, backfill_capability_ids, dedup_per_entity, filter_by_threshold,
    force_capability_guess, merge_and_score, normalize_scores, FusionWeights,
    NumericGuessPolicy,
};
pub use gate::{select_top, SearchOptions, SelectionResult};
pub use keyword::KeywordSearcher;
pub use metrics::{
    compare_gating_recall, compute_category_coverage, compute_mapping_stats,
    CategoryCoverage, MappingStats, RecallCase, RecallComparison,
};
pub use scope::apply_scope_filters;
pub use text::{contains_cjk, fuzzy_ratio, partial_ratio, similarity, token_set_ratio};
pub use vector::{
    corpus_entries, cosine_similarity, vector_query, CorpusEntry, InMemoryVectorSearcher,
    StubHit, StubVectorSearcher, TextEmbedder, VectorSearcher,
};
