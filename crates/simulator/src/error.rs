//! Error types for simulator construction, state transfer and checkpointing.

use thiserror::Error;

/// Errors raised by a device backend.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No adapter or device could be created.
    #[error("device initialization failed: {0}")]
    Init(String),

    /// Reading a buffer back to the host failed.
    #[error("buffer readback failed: {0}")]
    Readback(String),

    /// Host data or a copy source does not match the buffer length.
    #[error("buffer size mismatch: expected {expected} elements, got {actual}")]
    SizeMismatch {
        /// Element count of the destination buffer.
        expected: usize,
        /// Element count that was supplied.
        actual: usize,
    },

    /// The buffer belongs to a different device context.
    #[error("buffer `{0}` belongs to a different device context")]
    ForeignBuffer(String),

    /// A host buffer lock was poisoned by a panicking writer.
    #[error("buffer `{0}` is poisoned")]
    Poisoned(String),
}

/// Errors raised by the simulator runtime.
#[derive(Error, Debug)]
pub enum SimulatorError {
    /// Invalid grid, tile or physical parameters.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// `copy_state` between two different concrete simulator types.
    #[error(
        "a simulator can only copy the state of a simulator of the same type: \
         tried to copy a {source_type} into a {target_type}"
    )]
    TypeMismatch {
        /// Concrete type of the simulator being copied from.
        source_type: &'static str,
        /// Concrete type of the simulator being copied into.
        target_type: &'static str,
    },

    /// Field or domain shapes disagree.
    #[error("{context}: expected (ny, nx) = {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// What was being compared.
        context: String,
        /// Shape held by the receiving simulator.
        expected: (usize, usize),
        /// Shape that was supplied.
        actual: (usize, usize),
    },

    /// A scheme lacks a required capability.
    #[error("scheme `{scheme}` does not implement {capability}")]
    NotImplemented {
        /// Scheme name.
        scheme: String,
        /// Missing capability.
        capability: &'static str,
    },

    /// The simulator has been released.
    #[error("simulator has been released")]
    Closed,

    /// A reference scheme produced NaN or infinite values.
    #[error("non-finite state at t = {t}")]
    NonFinite {
        /// Simulation time of the failing sub-step.
        t: f32,
    },

    /// The drifter tracker could not be accessed.
    #[error("drifter tracker unavailable: {0}")]
    Drifters(String),

    /// Checkpoint file is malformed or the writer is closed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Device backend failure.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// File I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Host array construction failure.
    #[error(transparent)]
    Array(#[from] ndarray::ShapeError),
}

impl SimulatorError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(
        context: impl Into<String>,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SimulatorError>;
