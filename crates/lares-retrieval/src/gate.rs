//! Final candidate selection gate and the single-command search knobs.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::candidate::{hints, Candidate};
use crate::fusion::{NumericGuessPolicy, DEFAULT_SCORE_THRESHOLD};
use crate::keyword::DEFAULT_TOP_K as DEFAULT_KEYWORD_TOP_K;

pub const DEFAULT_TOP_K: usize = 5;
/// Score gap below which the top two candidates count as a near-tie.
pub const DEFAULT_CLOSE_THRESHOLD: f64 = 0.1;
pub const DEFAULT_VECTOR_TOP_K: usize = 10;

/// Tunables for one single-command search funnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Candidates kept by the keyword channel.
    pub keyword_top_k: usize,
    /// Candidates kept by the vector channel.
    pub vector_top_k: usize,
    /// Candidates surviving the final gate.
    pub top_k: usize,
    pub close_threshold: f64,
    /// Relative-score cutoff after normalization.
    pub score_threshold: f64,
    pub numeric_guess: NumericGuessPolicy,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            keyword_top_k: DEFAULT_KEYWORD_TOP_K,
            vector_top_k: DEFAULT_VECTOR_TOP_K,
            top_k: DEFAULT_TOP_K,
            close_threshold: DEFAULT_CLOSE_THRESHOLD,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            numeric_guess: NumericGuessPolicy::default(),
        }
    }
}

impl SearchOptions {
    pub fn with_keyword_top_k(mut self, keyword_top_k: usize) -> Self {
        self.keyword_top_k = keyword_top_k;
        self
    }

    pub fn with_vector_top_k(mut self, vector_top_k: usize) -> Self {
        self.vector_top_k = vector_top_k;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_close_threshold(mut self, close_threshold: f64) -> Self {
        self.close_threshold = close_threshold;
        self
    }

    pub fn with_score_threshold(mut self, score_threshold: f64) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    pub fn with_numeric_guess(mut self, numeric_guess: NumericGuessPolicy) -> Self {
        self.numeric_guess = numeric_guess;
        self
    }
}

/// Outcome of the selection gate.
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    pub candidates: Vec<Candidate>,
    pub hint: Option<String>,
}

/// Keep the `top_k` best candidates and flag a near-tie at the top.
///
/// Sorting is stable, so equal scores keep their fusion order.
pub fn select_top(
    mut candidates: Vec<Candidate>,
    top_k: usize,
    close_threshold: f64,
) -> SelectionResult {
    candidates.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(Ordering::Equal)
    });
    candidates.truncate(top_k);

    let hint = match candidates.as_slice() {
        [first, second, ..] if first.total_score - second.total_score < close_threshold => {
            Some(hints::MULTIPLE_CLOSE_MATCHES.to_string())
        }
        _ => None,
    };

    SelectionResult { candidates, hint }
}
