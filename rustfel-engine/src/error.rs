//! Error types for rustfel-engine.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Worker pool lifecycle error.
    #[error("worker pool error: {0}")]
    Pool(String),

    /// Accumulator id outside the configured set.
    #[error("unknown accumulator id: {0}")]
    UnknownAccumulator(usize),

    /// Image size does not match the accumulator canvas.
    #[error("image has {actual} cells, accumulator expects {expected}")]
    AccumulatorSize { expected: usize, actual: usize },

    /// Assembled-image sink failure.
    #[error("sink error: {0}")]
    Sink(String),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] rustfel_core::Error),
}
