//! Error types for field construction and decoding.

use thiserror::Error;

/// Result type alias using FieldError.
pub type FieldResult<T> = Result<T, FieldError>;

/// Structural problems with a weather field.
///
/// These are detected once per field build; per-pixel lookups never produce
/// errors and return `None` instead.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("data length {actual} does not match header {nx}x{ny} (expected {expected})")]
    LengthMismatch {
        nx: usize,
        ny: usize,
        expected: usize,
        actual: usize,
    },

    #[error("invalid grid spacing dx={dx}, dy={dy}")]
    InvalidSpacing { dx: f64, dy: f64 },

    #[error("empty grid: nx={nx}, ny={ny}")]
    EmptyGrid { nx: usize, ny: usize },

    #[error("missing wind component: {0}")]
    MissingComponent(&'static str),

    #[error("wind components have different grid headers")]
    ComponentMismatch,

    #[error("unsupported scan mode: {0}")]
    UnsupportedScanMode(u8),

    #[error("only latitude/longitude grids are supported (template {0})")]
    UnsupportedGridTemplate(u32),

    #[error("invalid color: {0}")]
    InvalidColor(String),

    #[error("invalid color scale: {0}")]
    InvalidColorScale(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
