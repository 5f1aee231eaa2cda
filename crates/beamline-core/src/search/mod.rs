//! Ensemble beam search.
//!
//! This module turns per-step scorer outputs into ranked, linked hypotheses:
//! - **Scorers** supply one score matrix per step (and optionally attention)
//! - **Ensemble combination** weights and sums them with the previous costs
//! - **Top-k selection** keeps the best candidates per sentence without a full sort
//! - **Expansion** builds hypotheses with alignments and cost breakdowns
//!
//! # Architecture
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Scorer`] | Capability interface for score sources |
//! | [`EnsembleCombiner`] | Weighted joint score matrix, UNK suppression |
//! | [`ScoreBackend`] | Sequential or tensor execution of the combination |
//! | [`top_k`] | Partial selection of the best candidates |
//! | [`HypothesisExpander`] | Hypothesis creation, filter remapping, n-best breakdowns |
//! | [`BestHyps`] | One full step over a batch of sentences |
//! | [`BeamStore`] | Arenas and active beams per sentence |
//!
//! # Example
//!
//! ```
//! use beamline_core::config::DecoderConfig;
//! use beamline_core::matrix::ScoreMatrix;
//! use beamline_core::search::{BeamSizeTable, BeamStore, BestHyps, StaticScorer};
//!
//! let config = DecoderConfig::default().with_weight("F0", 1.0);
//! let best = BestHyps::from_config(&config).unwrap();
//!
//! // One sentence, one root hypothesis, vocabulary of 4.
//! let mut store = BeamStore::open([0]);
//! let scorer = StaticScorer::new(
//!     "F0",
//!     ScoreMatrix::from_rows(&[[-2.0, -0.1, -0.5, -1.0]]).unwrap(),
//! );
//!
//! let beams = best
//!     .calc_beam(&mut store, &[&scorer], &[], &BeamSizeTable::uniform([0], 2))
//!     .unwrap();
//!
//! // UNK (id 1) is suppressed by default, so token 2 wins.
//! let first = store.hypothesis(0, beams.get(0)[0]).unwrap();
//! assert_eq!(first.token(), 2);
//!
//! store.advance(beams).unwrap();
//! ```

mod backend;
mod beam;
mod best_hyps;
mod ensemble;
mod expander;
mod scorer;
mod topk;

pub use backend::{backend_for, ScoreBackend, SequentialBackend, TensorBackend};
pub use beam::{BeamSizeTable, BeamStore, Beams};
pub use best_hyps::BestHyps;
pub use ensemble::{EnsembleCombiner, EnsembleWeights, UnkPolicy};
pub use expander::{ExpanderConfig, ExpansionContext, HypothesisExpander};
pub use scorer::{Scorer, StaticScorer};
pub use topk::{top_k, Candidate};
