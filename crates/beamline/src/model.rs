//! Step models driven by the translator.

use beamline_core::error::{BeamlineError, Result};
use beamline_core::hypothesis::HypId;
use beamline_core::matrix::{AttentionMatrix, ScoreMatrix};
use beamline_core::search::Scorer;

/// One active hypothesis, as seen by a model computing the next step.
#[derive(Debug, Clone, PartialEq)]
pub struct RowContext {
    /// Sentence the hypothesis belongs to.
    pub sentence: usize,
    /// Hypothesis in that sentence's arena.
    pub hypothesis: HypId,
    /// Tokens emitted so far, oldest first.
    pub history: Vec<u32>,
}

impl RowContext {
    /// Most recent token, if any.
    pub fn last_token(&self) -> Option<u32> {
        self.history.last().copied()
    }
}

/// A scorer that can be moved forward one decoding step.
///
/// Before each step the translator calls [`StepModel::advance`] with the
/// active hypotheses in row order; afterwards the scorer view must expose
/// one score row per entry.
pub trait StepModel: Send {
    /// Scorer view of the current step.
    fn as_scorer(&self) -> &dyn Scorer;

    /// Compute scores (and attention, if supported) for `rows`.
    fn advance(&mut self, rows: &[RowContext]) -> Result<()>;
}

/// Model scoring the next token from a fixed table keyed by the last token.
///
/// Row `t` of the table holds log-scores for the token following `t`; the
/// start of a sentence uses `start`. Optionally reports uniform attention
/// over a source of `source_len` positions.
#[derive(Debug, Clone)]
pub struct BigramModel {
    name: String,
    start: Vec<f32>,
    table: ScoreMatrix,
    source_len: Option<usize>,
    scores: ScoreMatrix,
    attention: Option<AttentionMatrix>,
}

impl BigramModel {
    /// Create a model; `start` and every table row must cover the vocabulary.
    pub fn new(name: impl Into<String>, start: Vec<f32>, table: ScoreMatrix) -> Result<Self> {
        if start.len() != table.columns() || table.rows() != table.columns() {
            return Err(BeamlineError::ShapeMismatch(format!(
                "bigram table must be {0}x{0} for a start row of {0}, got {1}x{2}",
                start.len(),
                table.rows(),
                table.columns()
            )));
        }
        let vocab = start.len();
        Ok(Self {
            name: name.into(),
            start,
            table,
            source_len: None,
            scores: ScoreMatrix::zeros(0, vocab),
            attention: None,
        })
    }

    /// Report uniform attention over `source_len` positions.
    pub fn with_attention(mut self, source_len: usize) -> Self {
        self.source_len = Some(source_len);
        self
    }

    /// Vocabulary size.
    pub fn vocabulary_size(&self) -> usize {
        self.start.len()
    }
}

impl Scorer for BigramModel {
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

impl StepModel for BigramModel {
    fn as_scorer(&self) -> &dyn Scorer {
        self
    }

    fn advance(&mut self, rows: &[RowContext]) -> Result<()> {
        let vocab = self.vocabulary_size();
        let mut data = Vec::with_capacity(rows.len() * vocab);
        for row in rows {
            match row.last_token() {
                None => data.extend_from_slice(&self.start),
                Some(t) if (t as usize) < vocab => data.extend_from_slice(self.table.row(t as usize)),
                Some(t) => {
                    return Err(BeamlineError::ShapeMismatch(format!(
                        "token {} outside vocabulary of {}",
                        t, vocab
                    )))
                }
            }
        }
        self.scores = ScoreMatrix::from_vec(rows.len(), vocab, data)?;

        self.attention = match self.source_len {
            Some(len) if len > 0 => {
                let uniform = vec![1.0 / len as f32; rows.len() * len];
                Some(ScoreMatrix::from_vec(rows.len(), len, uniform)?)
            }
            _ => None,
        };
        Ok(())
    }
}
