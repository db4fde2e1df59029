//! Min-max block normalization into the histogram range.

use ndarray::ArrayViewMut3;

use crate::float_trait::ClaheFloat;

/// Stretch a block to `[0, hmax]` in place.
///
/// A constant block (`max == min`) is left unchanged so no division by zero
/// can occur. Returns `true` if the block was rescaled.
pub fn normalize_block<F: ClaheFloat>(mut block: ArrayViewMut3<F>, hmax: F) -> bool {
    if block.is_empty() {
        return false;
    }

    let (min_val, max_val) = block.iter().copied().fold(
        (F::infinity(), F::neg_infinity()),
        |(lo, hi), v| (if v < lo { v } else { lo }, if v > hi { v } else { hi }),
    );

    let range = max_val - min_val;
    if range == F::zero() || !range.is_finite() {
        return false;
    }

    let scale = hmax / range;
    block.mapv_inplace(|x| (x - min_val) * scale);
    true
}
