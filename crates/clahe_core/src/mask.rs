//! Per-block mask gating.
//!
//! A mask block either removes the block from equalization entirely, attenuates
//! it voxel-wise, or leaves it untouched.

use ndarray::{Array6, ArrayView3, ArrayView6, ArrayViewMut3, Zip};

use crate::float_trait::ClaheFloat;

/// Outcome of testing a mask block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskDecision {
    /// Mask sums to zero: the input block is copied through unchanged.
    Skip,
    /// Mask is partially set: the block is multiplied by the mask first.
    Partial,
    /// Mask covers the whole block (or no mask is in effect).
    Full,
}

impl MaskDecision {
    /// Classify a mask block by its sum.
    pub fn classify<F: ClaheFloat>(mask_block: ArrayView3<F>) -> Self {
        let total: F = mask_block.iter().copied().sum();
        if total == F::zero() {
            MaskDecision::Skip
        } else if total == F::usize_as(mask_block.len()) {
            MaskDecision::Full
        } else {
            MaskDecision::Partial
        }
    }
}

/// Apply the mask decision to a block in place.
///
/// Returns `false` when the block must not be equalized.
pub fn apply_mask<F: ClaheFloat>(
    mut block: ArrayViewMut3<F>,
    mask_block: Option<ArrayView3<F>>,
) -> bool {
    let Some(mask_block) = mask_block else {
        return true;
    };

    match MaskDecision::classify(mask_block) {
        MaskDecision::Skip => false,
        MaskDecision::Full => true,
        MaskDecision::Partial => {
            Zip::from(&mut block)
                .and(&mask_block)
                .for_each(|v, &m| *v *= m);
            true
        }
    }
}

/// Turn a boolean validity mask into a multiplicative one (`true` -> 1, `false` -> 0).
pub fn mask_from_bool<F: ClaheFloat>(mask: ArrayView6<bool>) -> Array6<F> {
    mask.mapv(|valid| if valid { F::one() } else { F::zero() })
}
