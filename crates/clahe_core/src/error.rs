//! Error type for the equalizer.
//!
//! Only parameter validation, output construction and cancellation surface
//! here. Numeric degeneracies inside a block are resolved locally.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaheError {
    /// `nbins` must leave a non-empty intensity range (`hmax >= 1`).
    #[error("nbins must be >= 2, got {0}")]
    InvalidBins(usize),

    #[error("clip_limit must be finite, got {0}")]
    InvalidClipLimit(f64),

    /// A parameter that arrived from a signed/foreign source was out of range.
    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("output shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("equalization cancelled")]
    Cancelled,
}
