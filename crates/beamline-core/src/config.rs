//! Decoder configuration.

use crate::error::{BeamlineError, Result};
use crate::search::EnsembleWeights;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Vocabulary id of the end-of-sentence token.
pub const EOS_ID: u32 = 0;

/// Vocabulary id of the unknown-word token.
pub const UNK_ID: u32 = 1;

/// Execution backend for score combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Host loops over flat buffers.
    #[default]
    Sequential,
    /// Candle tensors, on CUDA when available.
    Tensor,
}

/// Configuration for ensemble beam search.
///
/// Values are read once before the first step and never mutated while
/// decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Number of hypotheses kept per sentence.
    #[serde(default = "default_beam_size")]
    pub beam_size: usize,
    /// Allow the UNK token to be selected.
    #[serde(default)]
    pub allow_unk: bool,
    /// Vocabulary id of UNK.
    #[serde(default = "default_unk_id")]
    pub unk_id: u32,
    /// Vocabulary id of EOS.
    #[serde(default = "default_eos_id")]
    pub eos_id: u32,
    /// Carry per-scorer cost breakdowns on every hypothesis.
    #[serde(default)]
    pub n_best: bool,
    /// Softmax filter names; non-empty means score matrices cover a filtered vocabulary.
    #[serde(default)]
    pub softmax_filter: Vec<String>,
    /// Return hard alignments.
    #[serde(default)]
    pub return_alignment: bool,
    /// Return soft alignments.
    #[serde(default)]
    pub return_soft_alignment: bool,
    /// Ensemble weight per scorer name.
    #[serde(default)]
    pub scorer_weights: BTreeMap<String, f32>,
    /// Backend used to combine scores.
    #[serde(default)]
    pub backend: BackendKind,
    /// Maximum number of decoding steps per sentence.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Divide final costs by output length when ranking n-best lists.
    #[serde(default)]
    pub normalize: bool,
}

fn default_beam_size() -> usize {
    12
}

fn default_unk_id() -> u32 {
    UNK_ID
}

fn default_eos_id() -> u32 {
    EOS_ID
}

fn default_max_length() -> usize {
    200
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beam_size: default_beam_size(),
            allow_unk: false,
            unk_id: UNK_ID,
            eos_id: EOS_ID,
            n_best: false,
            softmax_filter: Vec::new(),
            return_alignment: false,
            return_soft_alignment: false,
            scorer_weights: BTreeMap::new(),
            backend: BackendKind::default(),
            max_length: default_max_length(),
            normalize: false,
        }
    }
}

impl DecoderConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.beam_size == 0 {
            return Err(BeamlineError::Config("beam_size must be at least 1".into()));
        }
        if self.max_length == 0 {
            return Err(BeamlineError::Config("max_length must be at least 1".into()));
        }
        if self.unk_id == self.eos_id {
            return Err(BeamlineError::Config(format!(
                "unk_id and eos_id are both {}",
                self.unk_id
            )));
        }
        Ok(())
    }

    /// Whether UNK is excluded from selection.
    pub fn forbid_unk(&self) -> bool {
        !self.allow_unk
    }

    /// Whether score columns index a filtered vocabulary.
    pub fn is_input_filtered(&self) -> bool {
        !self.softmax_filter.is_empty()
    }

    /// Whether hypotheses carry alignments.
    pub fn capture_alignment(&self) -> bool {
        self.return_alignment || self.return_soft_alignment
    }

    /// Build the validated weight table.
    pub fn weights(&self) -> Result<EnsembleWeights> {
        EnsembleWeights::new(self.scorer_weights.clone())
    }

    /// Set a scorer weight.
    pub fn with_weight(mut self, name: impl Into<String>, weight: f32) -> Self {
        self.scorer_weights.insert(name.into(), weight);
        self
    }
}
