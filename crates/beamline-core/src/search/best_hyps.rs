//! One decoding step: combine, select, expand.
//!
//! [`BestHyps`] glues the ensemble combiner, the top-k selector and the
//! hypothesis expander together for a whole batch:
//!
//! 1. Collect the previous costs of every active hypothesis (row order)
//! 2. Build the joint matrix with the [`EnsembleCombiner`]
//! 3. For each sentence, select its `k` best candidates from its own rows
//! 4. Expand the selection into new hypotheses in that sentence's arena
//!
//! Configuration problems (missing weights, alignment without attention,
//! short filter tables) are detected before any hypothesis is created, so a
//! failed step leaves the store untouched.

use super::backend::{backend_for, ScoreBackend};
use super::beam::{BeamSizeTable, BeamStore, Beams};
use super::ensemble::{EnsembleCombiner, UnkPolicy};
use super::expander::{ExpanderConfig, ExpansionContext, HypothesisExpander};
use super::scorer::Scorer;
use super::topk::top_k;
use crate::config::DecoderConfig;
use crate::error::{BeamlineError, Result};
use crate::hypothesis::HypId;
use crate::matrix::ScoreMatrix;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Rows of one sentence in the batch matrices.
#[derive(Debug, Clone)]
struct SentenceRows {
    sentence: usize,
    row_offset: usize,
    prev: Vec<HypId>,
    beam_size: usize,
}

/// Beam step driver for a batch of sentences.
#[derive(Debug, Clone)]
pub struct BestHyps {
    combiner: EnsembleCombiner,
    expander: HypothesisExpander,
    is_input_filtered: bool,
}

impl BestHyps {
    /// Create a step driver with an explicit backend.
    pub fn new(config: &DecoderConfig, backend: Arc<dyn ScoreBackend>) -> Result<Self> {
        let unk = if config.forbid_unk() {
            UnkPolicy::Forbid {
                unk_id: config.unk_id,
            }
        } else {
            UnkPolicy::Allow
        };
        let combiner = EnsembleCombiner::new(Arc::new(config.weights()?), backend, unk);
        let expander = HypothesisExpander::new(ExpanderConfig {
            n_best: config.n_best,
            capture_alignment: config.capture_alignment(),
        });

        Ok(Self {
            combiner,
            expander,
            is_input_filtered: config.is_input_filtered(),
        })
    }

    /// Create a step driver with the backend named in the configuration.
    pub fn from_config(config: &DecoderConfig) -> Result<Self> {
        Self::new(config, backend_for(config.backend)?)
    }

    /// The combiner in use.
    pub fn combiner(&self) -> &EnsembleCombiner {
        &self.combiner
    }

    /// Run one step for every active sentence of `store`.
    ///
    /// `scorers[0]` is the primary scorer. Every scorer's matrix must have
    /// one row per active hypothesis, in store order. New hypotheses are
    /// pushed into the store's arenas; the returned beams list them best
    /// first. The store's active beams are not advanced; that decision
    /// belongs to the caller.
    pub fn calc_beam(
        &self,
        store: &mut BeamStore,
        scorers: &[&dyn Scorer],
        filter_indices: &[u32],
        beam_sizes: &BeamSizeTable,
    ) -> Result<Beams> {
        let filter = self.filter(filter_indices);
        let layout = layout(store, beam_sizes)?;
        let primary = scorers
            .first()
            .ok_or_else(|| BeamlineError::Config("ensemble has no scorers".into()))?;
        self.check_capabilities(scorers, primary.scores(), filter)?;

        let costs = store.previous_costs()?;
        let (joint, weights) = self.combiner.combine(scorers, &costs, filter)?;
        if self.expander.config().n_best && weights[0] == 0.0 {
            return Err(BeamlineError::InvalidWeight {
                name: primary.name().to_string(),
                reason: "primary scorer weight must be non-zero for n-best breakdowns".into(),
            });
        }

        debug!(
            backend = self.combiner.backend().name(),
            sentences = layout.len(),
            rows = joint.rows(),
            vocab = joint.columns(),
            scorers = scorers.len(),
            "calc_beam"
        );

        self.select_and_expand(store, &layout, &joint, scorers, &weights, filter)
    }

    /// Single-scorer variant of [`Self::calc_beam`].
    ///
    /// Goes through the backend's fast path, which not every backend
    /// provides; those fail with [`BeamlineError::Unimplemented`].
    pub fn calc_beam_single(
        &self,
        store: &mut BeamStore,
        scorer: &dyn Scorer,
        filter_indices: &[u32],
        beam_sizes: &BeamSizeTable,
    ) -> Result<Beams> {
        let filter = self.filter(filter_indices);
        let layout = layout(store, beam_sizes)?;
        let scorers = [scorer];
        self.check_capabilities(&scorers, scorer.scores(), filter)?;

        let costs = store.previous_costs()?;
        let (joint, weight) = self.combiner.combine_single(scorer, &costs, filter)?;
        if self.expander.config().n_best && weight == 0.0 {
            return Err(BeamlineError::InvalidWeight {
                name: scorer.name().to_string(),
                reason: "primary scorer weight must be non-zero for n-best breakdowns".into(),
            });
        }

        self.select_and_expand(store, &layout, &joint, &scorers, &[weight], filter)
    }

    fn filter<'a>(&self, filter_indices: &'a [u32]) -> Option<&'a [u32]> {
        self.is_input_filtered.then_some(filter_indices)
    }

    fn check_capabilities(
        &self,
        scorers: &[&dyn Scorer],
        primary: &ScoreMatrix,
        filter: Option<&[u32]>,
    ) -> Result<()> {
        if self.expander.config().capture_alignment {
            for s in scorers {
                let attention = s.attention().ok_or_else(|| {
                    warn!(scorer = s.name(), "alignment requested from scorer without attention");
                    BeamlineError::AlignmentUnsupported(s.name().to_string())
                })?;
                if attention.rows() != primary.rows() {
                    return Err(BeamlineError::ShapeMismatch(format!(
                        "attention of '{}' has {} rows for {} score rows",
                        s.name(),
                        attention.rows(),
                        primary.rows()
                    )));
                }
            }
        }
        if let Some(filter) = filter {
            if filter.len() < primary.columns() {
                return Err(BeamlineError::FilterIndexOutOfRange {
                    column: primary.columns() - 1,
                    len: filter.len(),
                });
            }
        }
        Ok(())
    }

    fn select_and_expand(
        &self,
        store: &mut BeamStore,
        layout: &[SentenceRows],
        joint: &ScoreMatrix,
        scorers: &[&dyn Scorer],
        weights: &[f32],
        filter: Option<&[u32]>,
    ) -> Result<Beams> {
        let vocab = joint.columns();
        let mut beams = Beams::new();

        for rows in layout {
            let end = rows.row_offset + rows.prev.len();
            let candidates = top_k(joint.row_range(rows.row_offset, end), rows.beam_size);

            let ctx = ExpansionContext {
                scorers,
                weights,
                vocabulary_size: vocab,
                row_offset: rows.row_offset,
                prev: &rows.prev,
                filter,
            };
            let arena = store.arena_mut(rows.sentence)?;
            let created = self.expander.expand(arena, &ctx, &candidates)?;

            trace!(
                sentence = rows.sentence,
                candidates = rows.prev.len() * vocab,
                kept = created.len(),
                "sentence expanded"
            );
            beams.insert(rows.sentence, created);
        }

        Ok(beams)
    }
}

/// Row layout of the active sentences, checked against the beam-size table.
fn layout(store: &BeamStore, beam_sizes: &BeamSizeTable) -> Result<Vec<SentenceRows>> {
    for (sentence, _) in beam_sizes.iter() {
        if store.current().get(sentence).is_empty() {
            return Err(BeamlineError::InvalidSentence(sentence));
        }
    }

    let mut row_offset = 0;
    let mut layout = Vec::with_capacity(store.current().len());
    for (sentence, prev) in store.current().iter() {
        let beam_size = beam_sizes
            .get(sentence)
            .ok_or(BeamlineError::InvalidSentence(sentence))?;
        layout.push(SentenceRows {
            sentence,
            row_offset,
            prev: prev.to_vec(),
            beam_size,
        });
        row_offset += prev.len();
    }
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::search::backend::{SequentialBackend, TensorBackend};
    use crate::search::scorer::StaticScorer;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn config() -> DecoderConfig {
        DecoderConfig {
            allow_unk: true,
            ..DecoderConfig::default()
        }
        .with_weight("F0", 1.0)
    }

    fn scenario_matrix() -> ScoreMatrix {
        ScoreMatrix::from_rows(&[[0.1, 0.9, 0.2], [0.05, 0.05, 0.05]]).unwrap()
    }

    /// Store for sentence 0 whose beam holds two hypotheses with costs 0 and -1.
    fn scenario_store() -> BeamStore {
        use crate::hypothesis::Hypothesis;

        let mut store = BeamStore::open([0]);
        let arena = store.arena_mut(0).unwrap();
        let a = arena.push(Hypothesis::new(HypId::ROOT, 2, 0, 0.0));
        let b = arena.push(Hypothesis::new(HypId::ROOT, 3, 0, -1.0));
        let mut beams = Beams::new();
        beams.insert(0, vec![a, b]);
        store.advance(beams).unwrap();
        store
    }

    fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> ScoreMatrix {
        let data = (0..rows * cols).map(|_| rng.gen_range(-8.0f32..0.0)).collect();
        ScoreMatrix::from_vec(rows, cols, data).unwrap()
    }

    #[test]
    fn scenario_single_scorer() {
        let best = BestHyps::new(&config(), Arc::new(SequentialBackend)).unwrap();
        let mut store = scenario_store();
        let parent = store.current().get(0)[0];
        let tm = StaticScorer::new("F0", scenario_matrix());

        let beams = best
            .calc_beam(&mut store, &[&tm], &[], &BeamSizeTable::uniform([0], 2))
            .unwrap();

        let created = beams.get(0);
        assert_eq!(created.len(), 2);
        let first = store.hypothesis(0, created[0]).unwrap();
        let second = store.hypothesis(0, created[1]).unwrap();
        assert_eq!((first.token(), first.prev_index()), (1, 0));
        assert_eq!((second.token(), second.prev_index()), (2, 0));
        assert_eq!(first.parent(), Some(parent));
        assert_eq!(second.parent(), Some(parent));
        assert!((first.cost() - 0.9).abs() < 1e-6);
        assert!((second.cost() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn scenario_unk_suppressed() {
        let config = DecoderConfig {
            allow_unk: false,
            unk_id: 1,
            ..config()
        };
        let best = BestHyps::new(&config, Arc::new(SequentialBackend)).unwrap();
        let mut store = scenario_store();
        let tm = StaticScorer::new("F0", scenario_matrix());

        let beams = best
            .calc_beam(&mut store, &[&tm], &[], &BeamSizeTable::uniform([0], 2))
            .unwrap();

        let tokens: Vec<u32> = beams
            .get(0)
            .iter()
            .map(|&h| store.hypothesis(0, h).unwrap().token())
            .collect();
        assert_eq!(tokens, vec![2, 0]);
    }

    #[test]
    fn single_scorer_fast_path_depends_on_backend() {
        let tm = StaticScorer::new("F0", scenario_matrix());
        let sizes = BeamSizeTable::uniform([0], 2);

        let sequential = BestHyps::new(&config(), Arc::new(SequentialBackend)).unwrap();
        let mut store = scenario_store();
        let beams = sequential.calc_beam_single(&mut store, &tm, &[], &sizes).unwrap();
        assert_eq!(beams.get(0).len(), 2);

        let tensor = BestHyps::new(&config(), Arc::new(TensorBackend::cpu())).unwrap();
        let mut store = scenario_store();
        let before = store.arena(0).unwrap().len();
        let result = tensor.calc_beam_single(&mut store, &tm, &[], &sizes);
        assert!(matches!(result, Err(BeamlineError::Unimplemented(_))));
        assert_eq!(store.arena(0).unwrap().len(), before);
    }

    #[test]
    fn batch_sentences_select_from_their_own_rows() {
        let best = BestHyps::new(&config(), Arc::new(SequentialBackend)).unwrap();
        let mut store = BeamStore::open([0, 1]);
        // Sentence 0 owns row 0, sentence 1 owns row 1.
        let tm = StaticScorer::new(
            "F0",
            ScoreMatrix::from_rows(&[[-1.0, -0.1, -3.0, -2.0], [-0.2, -5.0, -0.3, -0.4]]).unwrap(),
        );
        let mut sizes = BeamSizeTable::new();
        sizes.set(0, 1);
        sizes.set(1, 3);

        let beams = best.calc_beam(&mut store, &[&tm], &[], &sizes).unwrap();

        let tokens = |s: usize| -> Vec<u32> {
            beams
                .get(s)
                .iter()
                .map(|&h| store.hypothesis(s, h).unwrap().token())
                .collect()
        };
        assert_eq!(tokens(0), vec![1]);
        assert_eq!(tokens(1), vec![0, 2, 3]);
    }

    #[test]
    fn beam_size_table_must_match_store() {
        let best = BestHyps::new(&config(), Arc::new(SequentialBackend)).unwrap();
        let tm = StaticScorer::new("F0", ScoreMatrix::zeros(1, 3));

        let mut store = BeamStore::open([0]);
        let result = best.calc_beam(&mut store, &[&tm], &[], &BeamSizeTable::uniform([0, 4], 2));
        assert!(matches!(result, Err(BeamlineError::InvalidSentence(4))));

        let result = best.calc_beam(&mut store, &[&tm], &[], &BeamSizeTable::new());
        assert!(matches!(result, Err(BeamlineError::InvalidSentence(0))));
    }

    #[test]
    fn row_count_must_match_store() {
        let best = BestHyps::new(&config(), Arc::new(SequentialBackend)).unwrap();
        let tm = StaticScorer::new("F0", ScoreMatrix::zeros(3, 3));
        let mut store = BeamStore::open([0]);
        let result = best.calc_beam(&mut store, &[&tm], &[], &BeamSizeTable::uniform([0], 2));
        assert!(matches!(result, Err(BeamlineError::ShapeMismatch(_))));
    }

    #[test]
    fn alignment_checked_before_any_expansion() {
        let config = DecoderConfig {
            return_soft_alignment: true,
            ..config()
        }
        .with_weight("LM", 0.5);
        let best = BestHyps::new(&config, Arc::new(SequentialBackend)).unwrap();
        let tm = StaticScorer::new("F0", ScoreMatrix::zeros(1, 3)).with_attention(ScoreMatrix::zeros(1, 4));
        let lm = StaticScorer::new("LM", ScoreMatrix::zeros(1, 3));

        let mut store = BeamStore::open([0]);
        let result = best.calc_beam(&mut store, &[&tm, &lm], &[], &BeamSizeTable::uniform([0], 2));
        assert!(matches!(result, Err(BeamlineError::AlignmentUnsupported(ref n)) if n == "LM"));
        assert_eq!(store.arena(0).unwrap().len(), 1);
    }

    #[test]
    fn short_attention_rejected_before_any_sentence_expands() {
        let config = DecoderConfig {
            return_soft_alignment: true,
            n_best: true,
            ..config()
        };
        let best = BestHyps::new(&config, Arc::new(SequentialBackend)).unwrap();
        // Two sentences, one row each; attention only covers the first.
        let tm = StaticScorer::new("F0", ScoreMatrix::zeros(2, 3)).with_attention(ScoreMatrix::zeros(1, 4));

        let mut store = BeamStore::open([0, 1]);
        let result = best.calc_beam(&mut store, &[&tm], &[], &BeamSizeTable::uniform([0, 1], 2));
        assert!(matches!(result, Err(BeamlineError::ShapeMismatch(_))));
        for sentence in [0, 1] {
            let arena = store.arena(sentence).unwrap();
            assert_eq!(arena.len(), 1);
            assert!(arena.get(HypId::ROOT).unwrap().breakdown().is_empty());
        }
    }

    #[test]
    fn scorer_matrices_replaced_between_steps() {
        let config = DecoderConfig {
            return_soft_alignment: true,
            ..config()
        };
        let best = BestHyps::new(&config, Arc::new(SequentialBackend)).unwrap();
        let mut tm = StaticScorer::new("F0", ScoreMatrix::from_rows(&[[-1.0, -0.5, -0.1]]).unwrap())
            .with_attention(ScoreMatrix::from_rows(&[[1.0, 0.0]]).unwrap());
        let sizes = BeamSizeTable::uniform([0], 2);

        let mut store = BeamStore::open([0]);
        let beams = best.calc_beam(&mut store, &[&tm], &[], &sizes).unwrap();
        store.advance(beams).unwrap();

        tm.set_scores(ScoreMatrix::from_rows(&[[-0.2, -3.0, -3.0], [-3.0, -3.0, -0.3]]).unwrap());
        tm.set_attention(Some(ScoreMatrix::from_rows(&[[0.4, 0.6], [0.5, 0.5]]).unwrap()));
        let beams = best.calc_beam(&mut store, &[&tm], &[], &sizes).unwrap();

        let arena = store.arena(0).unwrap();
        let first = beams.get(0)[0];
        // Token 2 (-0.1) then EOS (-0.2).
        assert_eq!(arena.tokens(first).unwrap(), vec![2, 0]);
        assert!((arena.get(first).unwrap().cost() - (-0.3)).abs() < 1e-6);
        let aligned = arena.alignments(first).unwrap().unwrap();
        assert_eq!(aligned[1], vec![vec![0.4f32, 0.6]]);

        tm.set_attention(None);
        store.advance(beams).unwrap();
        let rows = store.row_count();
        tm.set_scores(ScoreMatrix::zeros(rows, 3));
        let result = best.calc_beam(&mut store, &[&tm], &[], &sizes);
        assert!(matches!(result, Err(BeamlineError::AlignmentUnsupported(_))));
    }

    #[test]
    fn forced_unk_keeps_breakdown_finite() {
        let config = DecoderConfig {
            allow_unk: false,
            n_best: true,
            ..config()
        };
        let best = BestHyps::new(&config, Arc::new(SequentialBackend)).unwrap();
        // Only EOS and UNK exist, so a beam of two must take UNK.
        let tm = StaticScorer::new("F0", ScoreMatrix::from_rows(&[[-2.0, -0.1]]).unwrap());

        let mut store = BeamStore::open([0]);
        let beams = best
            .calc_beam(&mut store, &[&tm], &[], &BeamSizeTable::uniform([0], 2))
            .unwrap();

        let unk = store.hypothesis(0, beams.get(0)[1]).unwrap();
        assert_eq!(unk.token(), 1);
        assert_eq!(unk.cost(), f32::MIN);
        assert!(unk.breakdown().iter().all(|b| b.is_finite()));
        assert!((unk.breakdown()[0] - unk.cost()).abs() <= 1e-4 * unk.cost().abs());
    }

    #[test]
    fn filtered_vocabulary_remaps_tokens() {
        let config = DecoderConfig {
            softmax_filter: vec!["lex".into()],
            ..config()
        };
        let best = BestHyps::new(&config, Arc::new(SequentialBackend)).unwrap();
        let filter = [0u32, 1, 250, 31_000];
        let mut rng = StdRng::seed_from_u64(3);
        let tm = StaticScorer::new("F0", random_matrix(&mut rng, 1, 4));

        let mut store = BeamStore::open([0]);
        let beams = best
            .calc_beam(&mut store, &[&tm], &filter, &BeamSizeTable::uniform([0], 3))
            .unwrap();

        let raw = top_k(tm.scores().as_slice(), 3);
        for (candidate, &id) in raw.iter().zip(beams.get(0)) {
            let token = store.hypothesis(0, id).unwrap().token();
            assert_eq!(token, filter[candidate.column(4)]);
        }

        let short = [0u32, 1];
        let result = best.calc_beam(&mut store, &[&tm], &short, &BeamSizeTable::uniform([0], 3));
        assert!(matches!(result, Err(BeamlineError::FilterIndexOutOfRange { .. })));
    }

    #[test]
    fn n_best_breakdown_conserved_over_steps() {
        let config = DecoderConfig {
            n_best: true,
            ..config()
        }
        .with_weight("F0", 0.7)
        .with_weight("LM", 0.3)
        .with_weight("WP", 0.1);
        let best = BestHyps::new(&config, Arc::new(SequentialBackend)).unwrap();
        let weights = [0.7f32, 0.3, 0.1];
        let mut rng = StdRng::seed_from_u64(11);
        let vocab = 6;

        let mut store = BeamStore::open([0, 1]);
        for step in 0..4 {
            let rows = store.row_count();
            let tm = StaticScorer::new("F0", random_matrix(&mut rng, rows, vocab));
            let lm = StaticScorer::new("LM", random_matrix(&mut rng, rows, vocab));
            let wp = StaticScorer::new("WP", random_matrix(&mut rng, rows, vocab));
            // Word penalty joins the ensemble from the third step on.
            let scorers: Vec<&dyn Scorer> = if step < 2 {
                vec![&tm, &lm]
            } else {
                vec![&tm, &lm, &wp]
            };

            let beams = best
                .calc_beam(&mut store, &scorers, &[], &BeamSizeTable::uniform([0, 1], 3))
                .unwrap();

            for (sentence, ids) in beams.iter() {
                for &id in ids {
                    let hyp = store.hypothesis(sentence, id).unwrap();
                    assert_eq!(hyp.breakdown().len(), scorers.len());
                    let total: f32 = hyp
                        .breakdown()
                        .iter()
                        .zip(&weights)
                        .map(|(b, w)| b * w)
                        .sum();
                    let tolerance = 1e-4 * hyp.cost().abs().max(1.0);
                    assert!(
                        (total - hyp.cost()).abs() <= tolerance,
                        "step {}: {} vs {}",
                        step,
                        total,
                        hyp.cost()
                    );
                }
            }
            store.advance(beams).unwrap();
        }
    }

    #[test]
    fn unk_never_selected_and_lineage_depth_grows() {
        let config = DecoderConfig {
            allow_unk: false,
            backend: BackendKind::Tensor,
            ..config()
        };
        let best = BestHyps::new(&config, Arc::new(TensorBackend::cpu())).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let vocab = 8;

        let mut store = BeamStore::open([0, 1, 2]);
        for step in 1..=5 {
            let rows = store.row_count();
            let mut scores = random_matrix(&mut rng, rows, vocab);
            // Make UNK the raw favourite everywhere.
            scores.fill_column(1, 10.0);
            let tm = StaticScorer::new("F0", scores);

            let beams = best
                .calc_beam(&mut store, &[&tm], &[], &BeamSizeTable::uniform([0, 1, 2], 4))
                .unwrap();
            store.advance(beams).unwrap();

            for (sentence, ids) in store.current().iter() {
                let arena = store.arena(sentence).unwrap();
                for &id in ids {
                    assert_ne!(arena.get(id).unwrap().token(), 1);
                    assert_eq!(arena.depth(id).unwrap(), step);
                }
            }
        }
    }

    #[test]
    fn backends_agree() {
        let mut rng = StdRng::seed_from_u64(23);
        let tm = StaticScorer::new("F0", random_matrix(&mut rng, 1, 50));
        let lm = StaticScorer::new("LM", random_matrix(&mut rng, 1, 50));
        let config = config().with_weight("LM", 0.4);
        let sizes = BeamSizeTable::uniform([0], 5);

        let tokens = |best: BestHyps| -> Vec<u32> {
            let mut store = BeamStore::open([0]);
            let beams = best.calc_beam(&mut store, &[&tm, &lm], &[], &sizes).unwrap();
            beams
                .get(0)
                .iter()
                .map(|&h| store.hypothesis(0, h).unwrap().token())
                .collect()
        };

        let a = tokens(BestHyps::new(&config, Arc::new(SequentialBackend)).unwrap());
        let b = tokens(BestHyps::new(&config, Arc::new(TensorBackend::cpu())).unwrap());
        assert_eq!(a, b);
    }
}
