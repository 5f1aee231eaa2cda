//! # Beamline Core
//!
//! Decoding core for ensemble beam search in neural machine translation.
//!
//! This crate provides:
//! - **Score matrices** and the [`Scorer`](search::Scorer) capability interface
//! - **Ensemble combination** on a sequential or candle tensor backend
//! - **Top-k selection** in expected linear time per step
//! - **Hypothesis arenas** with parent links, alignments and n-best cost breakdowns
//! - **Batching** of several sentences per step with per-sentence beam sizes

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod hypothesis;
pub mod matrix;
pub mod search;

pub use error::{BeamlineError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{BackendKind, DecoderConfig, EOS_ID, UNK_ID};
    pub use crate::error::{BeamlineError, Result};
    pub use crate::hypothesis::{HypId, Hypothesis, HypothesisArena, SoftAlignment};
    pub use crate::matrix::{AttentionMatrix, ScoreMatrix};
    pub use crate::search::{
        BeamSizeTable, BeamStore, Beams, BestHyps, EnsembleWeights, Scorer, StaticScorer,
    };
}
