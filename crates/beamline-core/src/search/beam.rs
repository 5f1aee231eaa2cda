//! Per-sentence beams and the store that owns their hypotheses.
//!
//! A batch decodes several sentences at once. Each step, every active
//! sentence contributes one row per surviving hypothesis to the batch score
//! matrices, in ascending sentence order. [`BeamSizeTable`] says how many
//! hypotheses each sentence keeps, [`Beams`] lists the hypotheses a step
//! produced, and [`BeamStore`] owns the arenas they live in.
//!
//! # Example
//!
//! ```
//! use beamline_core::search::{BeamSizeTable, BeamStore};
//!
//! let mut store = BeamStore::open([0, 1]);
//! let sizes = BeamSizeTable::uniform([0, 1], 4);
//!
//! assert_eq!(store.row_count(), 2); // one root per sentence
//! assert_eq!(sizes.get(1), Some(4));
//!
//! // A finished sentence leaves the batch but keeps its arena for backtrace.
//! store.finish_sentence(1);
//! assert_eq!(store.row_count(), 1);
//! assert!(store.arena(1).is_ok());
//! ```

use crate::error::{BeamlineError, Result};
use crate::hypothesis::{HypId, Hypothesis, HypothesisArena};
use std::collections::BTreeMap;

/// Number of hypotheses to keep per sentence for the next step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeamSizeTable {
    sizes: BTreeMap<usize, usize>,
}

impl BeamSizeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Same size for every sentence.
    pub fn uniform(sentences: impl IntoIterator<Item = usize>, size: usize) -> Self {
        Self {
            sizes: sentences.into_iter().map(|s| (s, size)).collect(),
        }
    }

    /// Set a sentence's size.
    pub fn set(&mut self, sentence: usize, size: usize) {
        self.sizes.insert(sentence, size);
    }

    /// Size for a sentence.
    pub fn get(&self, sentence: usize) -> Option<usize> {
        self.sizes.get(&sentence).copied()
    }

    /// Shrink a sentence's size by one and return the new size.
    pub fn decrement(&mut self, sentence: usize) -> Result<usize> {
        let size = self
            .sizes
            .get_mut(&sentence)
            .ok_or(BeamlineError::InvalidSentence(sentence))?;
        *size = size.saturating_sub(1);
        Ok(*size)
    }

    /// Drop a sentence from the table.
    pub fn remove(&mut self, sentence: usize) -> Option<usize> {
        self.sizes.remove(&sentence)
    }

    /// Iterate `(sentence, size)` in sentence order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.sizes.iter().map(|(&s, &k)| (s, k))
    }

    /// Number of sentences.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Check if no sentence is left.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

/// Hypotheses produced in one step, per sentence, best first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Beams {
    beams: BTreeMap<usize, Vec<HypId>>,
}

impl Beams {
    /// Create empty beams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hypothesis to a sentence's beam.
    pub fn add(&mut self, sentence: usize, hyp: HypId) {
        self.beams.entry(sentence).or_default().push(hyp);
    }

    /// Replace a sentence's beam.
    pub fn insert(&mut self, sentence: usize, hyps: Vec<HypId>) {
        self.beams.insert(sentence, hyps);
    }

    /// A sentence's beam (empty if absent).
    pub fn get(&self, sentence: usize) -> &[HypId] {
        self.beams.get(&sentence).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove a sentence's beam.
    pub fn remove(&mut self, sentence: usize) -> Option<Vec<HypId>> {
        self.beams.remove(&sentence)
    }

    /// Iterate `(sentence, beam)` in sentence order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[HypId])> + '_ {
        self.beams.iter().map(|(&s, b)| (s, b.as_slice()))
    }

    /// Sentences with a beam.
    pub fn sentences(&self) -> impl Iterator<Item = usize> + '_ {
        self.beams.keys().copied()
    }

    /// Number of sentences.
    pub fn len(&self) -> usize {
        self.beams.len()
    }

    /// Check if there are no sentences.
    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }

    /// Total number of hypotheses across sentences.
    pub fn total_hypotheses(&self) -> usize {
        self.beams.values().map(Vec::len).sum()
    }
}

/// Owns every sentence's hypothesis arena and the currently active beams.
#[derive(Debug, Clone, Default)]
pub struct BeamStore {
    arenas: BTreeMap<usize, HypothesisArena>,
    current: Beams,
}

impl BeamStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a batch: one arena per sentence, each beam holding only its root.
    pub fn open(sentences: impl IntoIterator<Item = usize>) -> Self {
        let mut store = Self::new();
        for sentence in sentences {
            store.add_sentence(sentence);
        }
        store
    }

    /// Add a sentence with a fresh arena. Replaces any previous arena.
    pub fn add_sentence(&mut self, sentence: usize) {
        let arena = HypothesisArena::new();
        self.current.insert(sentence, vec![arena.root()]);
        self.arenas.insert(sentence, arena);
    }

    /// Active beams, in row order.
    pub fn current(&self) -> &Beams {
        &self.current
    }

    /// Total rows the next step's score matrices must have.
    pub fn row_count(&self) -> usize {
        self.current.total_hypotheses()
    }

    /// Whether no sentence is active.
    pub fn is_done(&self) -> bool {
        self.current.is_empty()
    }

    /// A sentence's arena.
    pub fn arena(&self, sentence: usize) -> Result<&HypothesisArena> {
        self.arenas
            .get(&sentence)
            .ok_or(BeamlineError::InvalidSentence(sentence))
    }

    /// A sentence's arena, mutably.
    pub fn arena_mut(&mut self, sentence: usize) -> Result<&mut HypothesisArena> {
        self.arenas
            .get_mut(&sentence)
            .ok_or(BeamlineError::InvalidSentence(sentence))
    }

    /// Look up a hypothesis.
    pub fn hypothesis(&self, sentence: usize, id: HypId) -> Result<&Hypothesis> {
        self.arena(sentence)?.get(id)
    }

    /// Cumulative cost of every active hypothesis, in row order.
    pub fn previous_costs(&self) -> Result<Vec<f32>> {
        let mut costs = Vec::with_capacity(self.row_count());
        for (sentence, beam) in self.current.iter() {
            let arena = self.arena(sentence)?;
            for &id in beam {
                costs.push(arena.get(id)?.cost());
            }
        }
        Ok(costs)
    }

    /// Make `beams` the active beams.
    ///
    /// Every referenced hypothesis must exist. Sentences with an empty beam
    /// leave the batch; their arenas are kept.
    pub fn advance(&mut self, beams: Beams) -> Result<()> {
        for (sentence, beam) in beams.iter() {
            let arena = self.arena(sentence)?;
            for &id in beam {
                arena.get(id)?;
            }
        }
        self.current = Beams::new();
        for (sentence, beam) in beams.iter() {
            if !beam.is_empty() {
                self.current.insert(sentence, beam.to_vec());
            }
        }
        Ok(())
    }

    /// Remove a sentence from the active batch, keeping its arena.
    pub fn finish_sentence(&mut self, sentence: usize) -> Option<Vec<HypId>> {
        self.current.remove(sentence)
    }

    /// Remove a sentence entirely, releasing its arena.
    pub fn remove_sentence(&mut self, sentence: usize) -> Option<HypothesisArena> {
        self.current.remove(sentence);
        self.arenas.remove(&sentence)
    }
}
