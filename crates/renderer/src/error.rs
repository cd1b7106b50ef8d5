//! Error types for the rendering layers.

use thiserror::Error;
use wind_common::FieldError;

/// Result type alias using RenderError.
pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid canvas size {width}x{height}")]
    InvalidCanvasSize { width: u32, height: u32 },

    #[error("invalid simulator options: {0}")]
    InvalidOptions(String),

    #[error("no wind data loaded")]
    NoData,

    #[error("field error: {0}")]
    Field(#[from] FieldError),

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}
