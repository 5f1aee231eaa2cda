//! Sentence-level beam search driver.

use crate::model::{RowContext, StepModel};
use anyhow::Context;
use beamline_core::{
    config::DecoderConfig,
    error::Result,
    hypothesis::{HypId, SoftAlignment},
    search::{backend_for, BeamSizeTable, BeamStore, Beams, BestHyps, ScoreBackend, Scorer},
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Builder for creating a Translator.
pub struct TranslatorBuilder {
    config: DecoderConfig,
    backend: Option<Arc<dyn ScoreBackend>>,
    filter: Vec<u32>,
}

impl TranslatorBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: DecoderConfig::default(),
            backend: None,
            filter: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Set beam size.
    pub fn beam_size(mut self, size: usize) -> Self {
        self.config.beam_size = size;
        self
    }

    /// Set a scorer's ensemble weight.
    pub fn weight(mut self, name: impl Into<String>, weight: f32) -> Self {
        self.config.scorer_weights.insert(name.into(), weight);
        self
    }

    /// Keep per-scorer cost breakdowns.
    pub fn n_best(mut self, enabled: bool) -> Self {
        self.config.n_best = enabled;
        self
    }

    /// Allow UNK in the output.
    pub fn allow_unk(mut self, allowed: bool) -> Self {
        self.config.allow_unk = allowed;
        self
    }

    /// Capture soft alignments.
    pub fn soft_alignment(mut self, enabled: bool) -> Self {
        self.config.return_soft_alignment = enabled;
        self
    }

    /// Set maximum output length.
    pub fn max_length(mut self, len: usize) -> Self {
        self.config.max_length = len;
        self
    }

    /// Rank n-best entries by cost per token.
    pub fn normalize(mut self, enabled: bool) -> Self {
        self.config.normalize = enabled;
        self
    }

    /// Use a specific backend instead of the configured one.
    pub fn backend(mut self, backend: Arc<dyn ScoreBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Score over a filtered vocabulary; `indices[c]` is the full id of column `c`.
    pub fn vocabulary_filter(mut self, name: impl Into<String>, indices: Vec<u32>) -> Self {
        self.config.softmax_filter.push(name.into());
        self.filter = indices;
        self
    }

    /// Build the translator.
    pub fn build(self) -> anyhow::Result<Translator> {
        self.config.validate().context("invalid decoder configuration")?;
        if self.config.is_input_filtered() && self.filter.is_empty() {
            anyhow::bail!("softmax filter configured without filter indices");
        }

        let backend = match self.backend {
            Some(backend) => backend,
            None => backend_for(self.config.backend).context("failed to create score backend")?,
        };
        let best = BestHyps::new(&self.config, backend).context("failed to create beam step")?;

        info!(
            beam_size = self.config.beam_size,
            backend = best.combiner().backend().name(),
            scorers = self.config.scorer_weights.len(),
            "translator ready"
        );

        Ok(Translator {
            config: Arc::new(self.config),
            best,
            filter: self.filter,
            stats: Mutex::new(DecodeStats::default()),
        })
    }
}

impl Default for TranslatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters accumulated across decode calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Sentences decoded.
    pub sentences: usize,
    /// Beam steps run.
    pub steps: usize,
    /// Candidates scored (rows x vocabulary, summed over steps).
    pub candidates: usize,
    /// Hypotheses created.
    pub hypotheses: usize,
}

/// One finished translation.
#[derive(Debug, Clone, PartialEq)]
pub struct NBestEntry {
    /// Output tokens, EOS excluded.
    pub tokens: Vec<u32>,
    /// Cumulative ensemble cost.
    pub cost: f32,
    /// Ranking score (cost, or cost per token when normalizing).
    pub score: f32,
    /// Per-scorer cost breakdown (empty unless n-best is on).
    pub breakdown: Vec<f32>,
    /// Per-step, per-scorer alignments, when captured.
    pub alignments: Option<Vec<Vec<SoftAlignment>>>,
}

/// All finished translations of one sentence, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceResult {
    /// Sentence index in the batch.
    pub sentence: usize,
    /// Finished hypotheses.
    pub nbest: Vec<NBestEntry>,
}

impl SentenceResult {
    /// Best translation, if any finished.
    pub fn best(&self) -> Option<&NBestEntry> {
        self.nbest.first()
    }
}

/// Ensemble beam-search translator.
pub struct Translator {
    config: Arc<DecoderConfig>,
    best: BestHyps,
    filter: Vec<u32>,
    stats: Mutex<DecodeStats>,
}

impl Translator {
    /// Create a new translator builder.
    pub fn builder() -> TranslatorBuilder {
        TranslatorBuilder::new()
    }

    /// Get decoder configuration.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Snapshot of the decode counters.
    pub fn stats(&self) -> DecodeStats {
        self.stats.lock().clone()
    }

    /// Decode a batch of sentences with an ensemble of models.
    ///
    /// `models[0]` is the primary scorer. Returns one result per sentence,
    /// in sentence order.
    pub fn decode(
        &self,
        models: &mut [Box<dyn StepModel>],
        sentences: &[usize],
    ) -> Result<Vec<SentenceResult>> {
        let eos = self.config.eos_id;
        let mut store = BeamStore::open(sentences.iter().copied());
        let mut sizes = BeamSizeTable::uniform(sentences.iter().copied(), self.config.beam_size);
        let mut finished: BTreeMap<usize, Vec<HypId>> =
            sentences.iter().map(|&s| (s, Vec::new())).collect();

        let mut step = 0;
        while !store.is_done() && step < self.config.max_length {
            let rows = row_contexts(&store)?;
            for model in models.iter_mut() {
                model.advance(&rows)?;
            }
            let scorers: Vec<&dyn Scorer> = models.iter().map(|m| m.as_scorer()).collect();
            let beams = self.best.calc_beam(&mut store, &scorers, &self.filter, &sizes)?;
            step += 1;
            let candidates = rows.len() * scorers[0].scores().columns();
            debug!(step, sentences = beams.len(), candidates, "step");

            {
                let mut stats = self.stats.lock();
                stats.steps += 1;
                stats.candidates += candidates;
                stats.hypotheses += beams.total_hypotheses();
            }

            let last_step = step == self.config.max_length;
            let mut survivors = Beams::new();
            for (sentence, ids) in beams.iter() {
                let arena = store.arena(sentence)?;
                let mut keep = Vec::with_capacity(ids.len());
                for &id in ids {
                    let hyp = arena.get(id)?;
                    if last_step || hyp.token() == eos {
                        trace!(sentence, step, cost = hyp.cost(), "hypothesis finished");
                        finished.entry(sentence).or_default().push(id);
                        sizes.decrement(sentence)?;
                    } else {
                        keep.push(id);
                    }
                }
                if keep.is_empty() {
                    sizes.remove(sentence);
                    debug!(sentence, step, "sentence finished");
                }
                survivors.insert(sentence, keep);
            }
            store.advance(survivors)?;
        }

        self.stats.lock().sentences += sentences.len();
        info!(sentences = sentences.len(), steps = step, "batch decoded");

        finished
            .into_iter()
            .map(|(sentence, ids)| self.collect_nbest(&store, sentence, ids))
            .collect()
    }

    fn collect_nbest(&self, store: &BeamStore, sentence: usize, ids: Vec<HypId>) -> Result<SentenceResult> {
        let arena = store.arena(sentence)?;
        let eos = self.config.eos_id;

        let mut nbest = Vec::with_capacity(ids.len());
        for id in ids {
            let hyp = arena.get(id)?;
            let mut tokens = arena.tokens(id)?;
            if tokens.last() == Some(&eos) {
                tokens.pop();
            }
            let score = if self.config.normalize {
                hyp.cost() / arena.depth(id)?.max(1) as f32
            } else {
                hyp.cost()
            };
            nbest.push(NBestEntry {
                tokens,
                cost: hyp.cost(),
                score,
                breakdown: hyp.breakdown().to_vec(),
                alignments: arena.alignments(id)?,
            });
        }
        nbest.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(SentenceResult { sentence, nbest })
    }
}

/// Active hypotheses in row order, with their token histories.
fn row_contexts(store: &BeamStore) -> Result<Vec<RowContext>> {
    let mut rows = Vec::with_capacity(store.row_count());
    for (sentence, beam) in store.current().iter() {
        let arena = store.arena(sentence)?;
        for &hypothesis in beam {
            rows.push(RowContext {
                sentence,
                hypothesis,
                history: arena.tokens(hypothesis)?,
            });
        }
    }
    Ok(rows)
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("config", &self.config)
            .field("best", &self.best)
            .field("filter_len", &self.filter.len())
            .finish()
    }
}
