//! Ensemble score combination.

use super::backend::ScoreBackend;
use super::scorer::Scorer;
use crate::error::{BeamlineError, Result};
use crate::matrix::ScoreMatrix;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Weight per scorer name.
///
/// Read-only once decoding starts; share it behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnsembleWeights {
    weights: BTreeMap<String, f32>,
}

impl EnsembleWeights {
    /// Build a table, rejecting negative or non-finite weights.
    pub fn new(weights: impl IntoIterator<Item = (String, f32)>) -> Result<Self> {
        let weights: BTreeMap<String, f32> = weights.into_iter().collect();
        for (name, &w) in &weights {
            if !w.is_finite() || w < 0.0 {
                return Err(BeamlineError::InvalidWeight {
                    name: name.clone(),
                    reason: format!("{} is not a finite non-negative number", w),
                });
            }
        }
        Ok(Self { weights })
    }

    /// Weight of `name`. Missing entries are fatal.
    pub fn get(&self, name: &str) -> Result<f32> {
        self.weights
            .get(name)
            .copied()
            .ok_or_else(|| BeamlineError::MissingWeight(name.to_string()))
    }

    /// Weights for each scorer, in scorer order.
    pub fn for_scorers(&self, scorers: &[&dyn Scorer]) -> Result<Vec<f32>> {
        scorers
            .iter()
            .map(|s| {
                self.get(s.name()).inspect_err(|_| {
                    warn!(scorer = s.name(), "scorer has no ensemble weight");
                })
            })
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Iterate `(name, weight)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.weights.iter().map(|(n, &w)| (n.as_str(), w))
    }
}

/// UNK handling for the joint matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnkPolicy {
    /// UNK competes like any other token.
    Allow,
    /// UNK is forced to `f32::MIN` before selection.
    ///
    /// It is only selected when a sentence asks for more candidates than
    /// there are non-UNK entries; such a hypothesis carries a cost of
    /// `f32::MIN`, which stays finite.
    Forbid {
        /// Full-vocabulary id of UNK.
        unk_id: u32,
    },
}

/// Builds the joint score matrix for a step.
#[derive(Debug, Clone)]
pub struct EnsembleCombiner {
    weights: Arc<EnsembleWeights>,
    backend: Arc<dyn ScoreBackend>,
    unk: UnkPolicy,
}

impl EnsembleCombiner {
    /// Create a combiner.
    pub fn new(weights: Arc<EnsembleWeights>, backend: Arc<dyn ScoreBackend>, unk: UnkPolicy) -> Self {
        Self {
            weights,
            backend,
            unk,
        }
    }

    /// The weight table.
    pub fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }

    /// The execution backend.
    pub fn backend(&self) -> &dyn ScoreBackend {
        self.backend.as_ref()
    }

    /// Combine all scorers into one joint matrix.
    ///
    /// `scorers[0]` is the primary scorer; `costs` holds one previous
    /// cumulative cost per row. Returns the joint matrix and the resolved
    /// weights in scorer order.
    pub fn combine(
        &self,
        scorers: &[&dyn Scorer],
        costs: &[f32],
        filter: Option<&[u32]>,
    ) -> Result<(ScoreMatrix, Vec<f32>)> {
        let (primary, rest) = scorers
            .split_first()
            .ok_or_else(|| BeamlineError::Config("ensemble has no scorers".into()))?;
        let weights = self.weights.for_scorers(scorers)?;

        let others: Vec<(&ScoreMatrix, f32)> = rest
            .iter()
            .zip(&weights[1..])
            .map(|(s, &w)| (s.scores(), w))
            .collect();

        let mut joint = self
            .backend
            .combine(primary.scores(), weights[0], costs, &others)?;
        self.suppress_unk(&mut joint, filter);
        Ok((joint, weights))
    }

    /// Combine a single scorer through the backend fast path.
    pub fn combine_single(
        &self,
        scorer: &dyn Scorer,
        costs: &[f32],
        filter: Option<&[u32]>,
    ) -> Result<(ScoreMatrix, f32)> {
        let weight = self.weights.get(scorer.name())?;
        let mut joint = self.backend.combine_single(scorer.scores(), weight, costs)?;
        self.suppress_unk(&mut joint, filter);
        Ok((joint, weight))
    }

    /// Column of the joint matrix that holds UNK, if suppression is on.
    pub fn unk_column(&self, filter: Option<&[u32]>) -> Option<usize> {
        match self.unk {
            UnkPolicy::Allow => None,
            UnkPolicy::Forbid { unk_id } => match filter {
                Some(f) => f.iter().position(|&w| w == unk_id),
                None => Some(unk_id as usize),
            },
        }
    }

    fn suppress_unk(&self, joint: &mut ScoreMatrix, filter: Option<&[u32]>) {
        if let Some(column) = self.unk_column(filter) {
            joint.fill_column(column, f32::MIN);
        }
    }
}
