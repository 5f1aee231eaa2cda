//! Scorer capability interface.
//!
//! A scorer is anything that produces a per-step score matrix for the
//! active beam slots: a translation model, a language model, a length
//! feature. The ensemble loop is written once against [`Scorer`], so adding
//! a model family never touches the decoder.

use crate::matrix::{AttentionMatrix, ScoreMatrix};

/// Per-step score source.
pub trait Scorer: Send + Sync {
    /// Name used as the ensemble weight key.
    fn name(&self) -> &str;

    /// Scores for the current step: one row per active beam slot, one
    /// column per (possibly filtered) vocabulary entry.
    fn scores(&self) -> &ScoreMatrix;

    /// Attention over source positions, one row per active beam slot.
    ///
    /// Only scorers that compute attention return `Some`. Asking the decoder
    /// for alignments with a scorer that returns `None` is a configuration
    /// error.
    fn attention(&self) -> Option<&AttentionMatrix> {
        None
    }
}

/// Scorer backed by matrices held in memory.
///
/// The owner replaces the matrices between steps with [`Self::set_scores`]
/// and [`Self::set_attention`].
#[derive(Debug, Clone)]
pub struct StaticScorer {
    name: String,
    scores: ScoreMatrix,
    attention: Option<AttentionMatrix>,
}

impl StaticScorer {
    /// Create a scorer without attention.
    pub fn new(name: impl Into<String>, scores: ScoreMatrix) -> Self {
        Self {
            name: name.into(),
            scores,
            attention: None,
        }
    }

    /// Attach attention weights.
    pub fn with_attention(mut self, attention: AttentionMatrix) -> Self {
        self.attention = Some(attention);
        self
    }

    /// Replace the scores for the next step.
    pub fn set_scores(&mut self, scores: ScoreMatrix) {
        self.scores = scores;
    }

    /// Replace the attention for the next step.
    pub fn set_attention(&mut self, attention: Option<AttentionMatrix>) {
        self.attention = attention;
    }
}

impl Scorer for StaticScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn scores(&self) -> &ScoreMatrix {
        &self.scores
    }

    fn attention(&self) -> Option<&AttentionMatrix> {
        self.attention.as_ref()
    }
}
