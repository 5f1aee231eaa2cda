//! Hypothesis graph for beam search.
//!
//! Every decoding step extends surviving hypotheses by one token. The
//! resulting graph is a tree: each [`Hypothesis`] points at the hypothesis it
//! extends, and nothing ever points back down.
//!
//! # Arena layout
//!
//! Hypotheses live in a per-sentence [`HypothesisArena`] and are addressed by
//! [`HypId`]. Parent links are ids, not pointers, so:
//! - backtrace is a walk over indices,
//! - the full lineage stays alive until the sentence is released,
//! - releasing a sentence drops its whole arena at once.
//!
//! # Example
//!
//! ```rust
//! use beamline_core::hypothesis::{HypothesisArena, Hypothesis};
//!
//! let mut arena = HypothesisArena::new();
//! let root = arena.root();
//!
//! let a = arena.push(Hypothesis::new(root, 7, 0, -0.5));
//! let b = arena.push(Hypothesis::new(a, 3, 0, -1.25));
//!
//! assert_eq!(arena.depth(b).unwrap(), 2);
//! assert_eq!(arena.tokens(b).unwrap(), vec![7, 3]);
//! ```

mod arena;
mod node;

pub use arena::HypothesisArena;
pub use node::{HypId, Hypothesis, SoftAlignment};
