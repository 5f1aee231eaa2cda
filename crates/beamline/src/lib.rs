//! # Beamline
//!
//! Ensemble beam-search decoding for neural machine translation.
//!
//! Beamline decodes whole sentences with a weighted ensemble of scorers:
//! - **Ensembles**: any number of step models, each with its own weight
//! - **Batching**: several sentences share every step
//! - **N-best**: finished translations with per-scorer cost breakdowns
//! - **Alignments**: per-step soft alignments from attention-capable models
//!
//! ## Quick Start
//!
//! ```rust
//! use beamline::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     // Vocabulary: 0 = EOS, 1 = UNK, 2 and 3 are words.
//!     let start = vec![-9.0, -0.1, -0.2, -1.0];
//!     let table = ScoreMatrix::from_rows(&[
//!         [-9.0, -9.0, -9.0, -9.0],
//!         [-1.0, -9.0, -1.0, -1.0],
//!         [-2.0, -0.5, -3.0, -0.3],
//!         [-0.1, -9.0, -2.0, -3.0],
//!     ])?;
//!
//!     let translator = Translator::builder()
//!         .beam_size(2)
//!         .weight("F0", 1.0)
//!         .max_length(8)
//!         .build()?;
//!
//!     let mut models: Vec<Box<dyn StepModel>> =
//!         vec![Box::new(BigramModel::new("F0", start, table)?)];
//!     let results = translator.decode(&mut models, &[0])?;
//!
//!     assert_eq!(results[0].best().map(|e| e.tokens.clone()), Some(vec![2, 3]));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Re-export core crate
pub use beamline_core::*;

mod model;
mod translator;

pub use model::{BigramModel, RowContext, StepModel};
pub use translator::{DecodeStats, NBestEntry, SentenceResult, Translator, TranslatorBuilder};

/// Commonly used types.
pub mod prelude {
    pub use crate::model::{BigramModel, RowContext, StepModel};
    pub use crate::translator::{
        DecodeStats, NBestEntry, SentenceResult, Translator, TranslatorBuilder,
    };
    pub use crate::{
        config::{BackendKind, DecoderConfig, EOS_ID, UNK_ID},
        error::{BeamlineError, Result},
        hypothesis::{HypId, HypothesisArena},
        matrix::{AttentionMatrix, ScoreMatrix},
        search::{BeamSizeTable, BeamStore, BestHyps, Scorer, SequentialBackend, TensorBackend},
    };

    // Re-export useful external types
    pub use anyhow;
    pub use tracing;
}
