//! Error types for rustfel-core.

use crate::event::EventState;
use thiserror::Error;

/// Result type alias for rustfel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for rustfel operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Detector layout error.
    #[error("layout error: {0}")]
    Layout(String),

    /// Geometry map error.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Per-frame data error.
    #[error("frame error: {0}")]
    Frame(String),

    /// Event state machine violation.
    #[error("invalid event state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: EventState, to: EventState },
}
