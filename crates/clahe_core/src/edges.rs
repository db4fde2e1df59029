//! Gaussian edge tapering for equalized blocks.
//!
//! A single decay vector is built once per call and shared read-only by every
//! block and every spatial axis. Along each axis the first `len` slices are
//! scaled by the reversed vector and the last `len` slices by the forward
//! vector, so both faces of a block fade out. Corners are scaled once per axis.

use ndarray::{ArrayViewMut3, Axis};

use crate::config::ClaheConfig;
use crate::float_trait::ClaheFloat;

/// Smoothing width and Gaussian sigma for a given configuration.
///
/// With a positive `overlap` the window equals the overlap and `sigma = overlap / 3`.
/// Otherwise both derive from the block's first spatial extent:
/// `len = extent / 3` (integer division) and `sigma = extent / 9`.
pub fn smoothing_window<F: ClaheFloat>(config: &ClaheConfig<F>, block_extent: usize) -> (usize, F) {
    if config.overlap > 0 {
        (
            config.overlap,
            F::usize_as(config.overlap) / F::from_f64_c(3.0),
        )
    } else {
        (
            block_extent / 3,
            F::usize_as(block_extent) / F::from_f64_c(9.0),
        )
    }
}

/// Build the decay weights `exp(-k^2 / (2 sigma^2))` for `k in 0..len`,
/// normalized so that `w[0] == 1`.
pub fn gaussian_weights<F: ClaheFloat>(len: usize, sigma: F) -> Vec<F> {
    if len == 0 || sigma <= F::zero() {
        return Vec::new();
    }

    let two = F::from_f64_c(2.0);
    let denom = two * sigma * sigma;
    let mut weights: Vec<F> = (0..len)
        .map(|k| {
            let k = F::usize_as(k);
            (-(k * k) / denom).exp()
        })
        .collect();

    let max = weights
        .iter()
        .copied()
        .fold(F::zero(), |a, b| if b > a { b } else { a });
    if max > F::zero() {
        for w in weights.iter_mut() {
            *w /= max;
        }
    }

    weights
}

/// Edge weights for a call, or an empty vector when edge adjustment is off.
pub fn gaussian_edge_weights<F: ClaheFloat>(config: &ClaheConfig<F>, block_extent: usize) -> Vec<F> {
    if !config.adjust_edges {
        return Vec::new();
    }
    let (len, sigma) = smoothing_window(config, block_extent);
    gaussian_weights(len, sigma)
}

/// Taper the boundary slabs of a block in place.
///
/// Axes shorter than the weight vector are left alone.
pub fn blend_edges<F: ClaheFloat>(mut block: ArrayViewMut3<F>, weights: &[F]) {
    let len = weights.len();
    if len == 0 {
        return;
    }

    for axis in 0..3 {
        let axis = Axis(axis);
        let size = block.len_of(axis);
        if size < len {
            continue;
        }

        for (j, &w) in weights.iter().rev().enumerate() {
            block.index_axis_mut(axis, j).mapv_inplace(|v| v * w);
        }
        for (j, &w) in weights.iter().enumerate() {
            block
                .index_axis_mut(axis, size - len + j)
                .mapv_inplace(|v| v * w);
        }
    }
}
