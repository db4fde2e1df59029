//! Volumetric CLAHE Core Library
//!
//! Pure Rust implementation of block-wise contrast-limited adaptive histogram
//! equalization for pre-blocked 3D volumes shaped `[batch, channel, block, x, y, z]`.
//! This crate contains all algorithm logic without Python bindings.

pub mod config;
pub mod edges;
pub mod error;
pub mod float_trait;
pub mod grid;
pub mod histogram;
pub mod mask;
pub mod normalize;

// Re-export commonly used types at the crate root
pub use config::{usize_param, ClaheConfig};
pub use edges::{blend_edges, gaussian_edge_weights, gaussian_weights};
pub use error::ClaheError;
pub use float_trait::ClaheFloat;
pub use grid::{equalize, equalize_block, equalize_with_cancel};
pub use histogram::{build_histogram, build_lookup, equalize_histogram, redistribute_excess};
pub use mask::{mask_from_bool, MaskDecision};
pub use normalize::normalize_block;
