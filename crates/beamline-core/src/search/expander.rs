//! Hypothesis expansion for selected candidates.
//!
//! The expander turns the candidates picked by [`top_k`](super::top_k) into
//! new hypotheses:
//! 1. Decode the flat index into `(beam slot, word)`
//! 2. Remap the word through the vocabulary filter, if one is active
//! 3. Link the new hypothesis to the previous hypothesis in that slot
//! 4. Attach alignments and the per-scorer cost breakdown when requested

use super::scorer::Scorer;
use super::topk::Candidate;
use crate::error::{BeamlineError, Result};
use crate::hypothesis::{HypId, Hypothesis, HypothesisArena, SoftAlignment};

/// What the expander attaches to each hypothesis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpanderConfig {
    /// Carry per-scorer cost breakdowns.
    pub n_best: bool,
    /// Carry per-scorer attention alignments.
    pub capture_alignment: bool,
}

/// One sentence's view of the current step.
#[derive(Clone, Copy)]
pub struct ExpansionContext<'a> {
    /// Scorers in ensemble order; index 0 is the primary.
    pub scorers: &'a [&'a dyn Scorer],
    /// Weight of each scorer, same order.
    pub weights: &'a [f32],
    /// Columns of the score matrices.
    pub vocabulary_size: usize,
    /// First row of this sentence in the batch matrices.
    pub row_offset: usize,
    /// Previous hypotheses of this sentence, one per row.
    pub prev: &'a [HypId],
    /// Filtered-column to vocabulary-id table, when filtering is active.
    pub filter: Option<&'a [u32]>,
}

/// Creates hypotheses from selected candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct HypothesisExpander {
    config: ExpanderConfig,
}

impl HypothesisExpander {
    /// Create an expander.
    pub fn new(config: ExpanderConfig) -> Self {
        Self { config }
    }

    /// Expander settings.
    pub fn config(&self) -> ExpanderConfig {
        self.config
    }

    /// Push one hypothesis per candidate into `arena`, in candidate order.
    pub fn expand(
        &self,
        arena: &mut HypothesisArena,
        ctx: &ExpansionContext<'_>,
        selected: &[Candidate],
    ) -> Result<Vec<HypId>> {
        let mut created = Vec::with_capacity(selected.len());

        for candidate in selected {
            let column = candidate.column(ctx.vocabulary_size);
            let slot = candidate.row(ctx.vocabulary_size);

            let token = match ctx.filter {
                Some(filter) => *filter.get(column).ok_or(BeamlineError::FilterIndexOutOfRange {
                    column,
                    len: filter.len(),
                })?,
                None => column as u32,
            };

            let parent = *ctx.prev.get(slot).ok_or_else(|| {
                BeamlineError::ShapeMismatch(format!(
                    "candidate row {} but only {} previous hypotheses",
                    slot,
                    ctx.prev.len()
                ))
            })?;
            let row = ctx.row_offset + slot;

            let mut hyp = Hypothesis::new(parent, token, slot, candidate.score);
            if self.config.capture_alignment {
                hyp = hyp.with_alignments(alignments(ctx.scorers, row)?);
            }
            if self.config.n_best {
                let breakdown = reconcile_breakdown(arena, ctx, parent, row, column, candidate.score)?;
                hyp = hyp.with_breakdown(breakdown);
            }

            created.push(arena.try_push(hyp)?);
        }

        Ok(created)
    }
}

/// Copy each scorer's attention row for `row`.
fn alignments(scorers: &[&dyn Scorer], row: usize) -> Result<Vec<SoftAlignment>> {
    scorers
        .iter()
        .map(|scorer| {
            let attention = scorer
                .attention()
                .ok_or_else(|| BeamlineError::AlignmentUnsupported(scorer.name().to_string()))?;
            if row >= attention.rows() {
                return Err(BeamlineError::ShapeMismatch(format!(
                    "attention of '{}' has {} rows, needed row {}",
                    scorer.name(),
                    attention.rows(),
                    row
                )));
            }
            Ok(attention.row(row).to_vec())
        })
        .collect()
}

/// Per-scorer breakdown whose weighted sum is exactly `cost`.
///
/// Auxiliary entries accumulate each scorer's own raw score along the
/// lineage. The primary entry absorbs the remainder, so
/// `Σ weights[j] * breakdown[j] == cost` up to float rounding.
fn reconcile_breakdown(
    arena: &mut HypothesisArena,
    ctx: &ExpansionContext<'_>,
    parent: HypId,
    row: usize,
    column: usize,
    cost: f32,
) -> Result<Vec<f32>> {
    let primary_weight = ctx.weights[0];
    if primary_weight == 0.0 {
        return Err(BeamlineError::InvalidWeight {
            name: ctx.scorers[0].name().to_string(),
            reason: "primary scorer weight must be non-zero for n-best breakdowns".into(),
        });
    }

    let n = ctx.scorers.len();
    // Scorers may join mid-decode; older lineages count zero for them.
    arena.extend_breakdown(parent, n)?;
    let inherited = arena.get(parent)?.breakdown();

    let mut breakdown = vec![0.0f32; n];
    let mut weighted = 0.0f32;
    for j in 1..n {
        let running = inherited[j] + ctx.scorers[j].scores().get(row, column);
        weighted += ctx.weights[j] * running;
        breakdown[j] = running;
    }

    breakdown[0] = (cost - weighted) / primary_weight;

    Ok(breakdown)
}
