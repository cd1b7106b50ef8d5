//! Error types for grid processing.

use thiserror::Error;
use wind_common::{FieldError, PointKey};

/// Errors that can occur while resolving, building or querying a grid.
#[derive(Error, Debug)]
pub enum GridError {
    /// An explicit sampling step that is zero, negative or not a number.
    #[error("invalid sampling step: {0}")]
    InvalidStep(f64),

    /// Bounds with non-finite edges.
    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    /// The candidate step ladder has no usable entries.
    #[error("step ladder is empty")]
    EmptyLadder,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A point query fell outside the lattice.
    #[error("coordinate ({lat}, {lon}) is outside the grid")]
    OutsideGrid { lat: f64, lon: f64 },

    /// A corner needed for a point query has no sample yet.
    #[error("no sample for grid point {0}")]
    MissingSample(PointKey),

    /// The assembled field failed validation.
    #[error("field error: {0}")]
    Field(#[from] FieldError),
}

impl GridError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;
