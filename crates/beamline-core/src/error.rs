//! Error types for Beamline Core.

use thiserror::Error;

/// Result type alias for Beamline operations.
pub type Result<T> = std::result::Result<T, BeamlineError>;

/// Errors that can occur while decoding.
///
/// Every variant is fatal for the decoding step that produced it.
#[derive(Error, Debug)]
pub enum BeamlineError {
    /// An active scorer has no entry in the ensemble weight table.
    #[error("no ensemble weight for scorer '{0}'")]
    MissingWeight(String),

    /// A weight is negative, non-finite, or unusable for the requested mode.
    #[error("invalid weight for scorer '{name}': {reason}")]
    InvalidWeight {
        /// Scorer name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Alignment capture was requested from a scorer without attention.
    #[error("scorer '{0}' does not expose attention; alignment capture is unsupported")]
    AlignmentUnsupported(String),

    /// A selected column has no entry in the vocabulary filter table.
    #[error("filtered column {column} is outside the filter table of length {len}")]
    FilterIndexOutOfRange {
        /// Column selected in the filtered score matrix.
        column: usize,
        /// Length of the filter table.
        len: usize,
    },

    /// A code path exists in the interface but not in this backend.
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),

    /// Matrix or table dimensions disagree.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Reference to a hypothesis that is not in the arena.
    #[error("invalid hypothesis id: {0}")]
    InvalidHypothesis(u32),

    /// An arena cannot address another hypothesis.
    #[error("hypothesis arena is full at {0} entries")]
    ArenaFull(usize),

    /// Reference to a sentence that is not part of the batch.
    #[error("invalid sentence index: {0}")]
    InvalidSentence(usize),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// Candle tensor error.
    #[error("tensor error: {0}")]
    TensorError(#[from] candle_core::Error),
}
