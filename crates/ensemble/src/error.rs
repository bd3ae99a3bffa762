//! Ensemble error type.

use swe_simulator::SimulatorError;
use thiserror::Error;

/// Errors raised while building, stepping or resampling an ensemble.
#[derive(Error, Debug)]
pub enum EnsembleError {
    /// A member simulator failed.
    #[error(transparent)]
    Simulator(#[from] SimulatorError),

    /// Invalid ensemble configuration.
    #[error("invalid ensemble configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Parent indices or weights do not describe a valid resampling.
    #[error("invalid resampling: {0}")]
    InvalidResample(String),
}

/// Result alias for ensemble operations.
pub type Result<T> = std::result::Result<T, EnsembleError>;
