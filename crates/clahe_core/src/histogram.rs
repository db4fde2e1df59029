//! Histogram construction, clip-limit redistribution and lookup remapping.
//!
//! The clip limit acts on the *normalized cumulative* histogram: every bin whose
//! CDF value exceeds the limit contributes `cdf - clip_limit` to a pool of
//! excess, and the mean excess over those bins is added uniformly to every
//! histogram bin. This differs from textbook CLAHE (which clips the raw
//! histogram) and is kept as-is for output compatibility.
//!
//! ## Binning
//!
//! Bins follow `histc` semantics on `[0, hmax]`: bin width is `hmax / nbins`,
//! a value equal to `hmax` lands in the last bin, and values outside the range
//! (or NaN) are not counted.

use ndarray::{ArrayView3, ArrayViewMut3};

use crate::config::ClaheConfig;
use crate::float_trait::ClaheFloat;

/// Pooled CDF excess above the clip limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipExcess<F> {
    /// Sum of `max(cdf - clip_limit, 0)` over all bins
    pub total: F,
    /// Number of bins with strictly positive excess
    pub bins: usize,
}

impl<F: ClaheFloat> ClipExcess<F> {
    /// Amount added to each histogram bin, or `None` when nothing exceeded the limit.
    pub fn per_bin(&self) -> Option<F> {
        if self.bins == 0 {
            None
        } else {
            Some(self.total / F::usize_as(self.bins))
        }
    }
}

/// Count block intensities into `nbins` equal-width bins spanning `[0, hmax]`.
pub fn build_histogram<F: ClaheFloat>(block: ArrayView3<F>, nbins: usize) -> Vec<F> {
    let mut hist = vec![F::zero(); nbins];
    if nbins == 0 {
        return hist;
    }

    let hmax = F::usize_as(nbins - 1);
    let bins_per_unit = F::usize_as(nbins) / hmax;
    let last = nbins - 1;

    for &v in block.iter() {
        // Also rejects NaN
        if !(v >= F::zero() && v <= hmax) {
            continue;
        }
        let bin = (v * bins_per_unit)
            .floor()
            .to_usize()
            .map_or(last, |b| b.min(last));
        hist[bin] += F::one();
    }

    hist
}

/// Prefix-sum the histogram and normalize by its total.
///
/// Returns `None` for an empty histogram, where the CDF is undefined.
pub fn normalized_cdf<F: ClaheFloat>(hist: &[F]) -> Option<Vec<F>> {
    let mut running = F::zero();
    let mut cdf: Vec<F> = hist
        .iter()
        .map(|&h| {
            running += h;
            running
        })
        .collect();

    if running <= F::zero() {
        return None;
    }

    for c in cdf.iter_mut() {
        *c /= running;
    }
    Some(cdf)
}

/// Measure how much a normalized CDF exceeds `clip_limit`.
pub fn cdf_excess<F: ClaheFloat>(cdf: &[F], clip_limit: F) -> ClipExcess<F> {
    cdf.iter().fold(
        ClipExcess {
            total: F::zero(),
            bins: 0,
        },
        |mut acc, &c| {
            let excess = c - clip_limit;
            if excess > F::zero() {
                acc.total += excess;
                acc.bins += 1;
            }
            acc
        },
    )
}

/// Spread pooled excess uniformly over every histogram bin.
///
/// A histogram with no excess bins is left untouched.
pub fn apply_excess<F: ClaheFloat>(hist: &mut [F], excess: ClipExcess<F>) {
    if let Some(per_bin) = excess.per_bin() {
        for h in hist.iter_mut() {
            *h += per_bin;
        }
    }
}

/// Run clip-limit redistribution on `hist` in place.
///
/// Returns the excess that was measured, which is all-zero when the histogram
/// is empty.
pub fn redistribute_excess<F: ClaheFloat>(hist: &mut [F], clip_limit: F) -> ClipExcess<F> {
    let Some(cdf) = normalized_cdf(hist) else {
        return ClipExcess {
            total: F::zero(),
            bins: 0,
        };
    };

    let excess = cdf_excess(&cdf, clip_limit);
    apply_excess(hist, excess);
    excess
}

/// Rescale a histogram into a `[0, LOOKUP_SCALE]` lookup table.
///
/// An all-zero histogram maps every bin to zero.
pub fn build_lookup<F: ClaheFloat>(mut hist: Vec<F>) -> Vec<F> {
    let max = hist
        .iter()
        .copied()
        .fold(F::zero(), |a, b| if b > a { b } else { a });

    if max <= F::zero() {
        hist.iter_mut().for_each(|h| *h = F::zero());
        return hist;
    }

    for h in hist.iter_mut() {
        *h = *h / max * F::LOOKUP_SCALE;
    }
    hist
}

/// Remap each voxel through the lookup table and bring it back to `[0, 1]`.
///
/// The lookup index is the voxel value truncated toward zero, clamped into the
/// table. NaN maps to bin 0.
pub fn apply_lookup<F: ClaheFloat>(mut block: ArrayViewMut3<F>, lookup: &[F]) {
    let Some(last) = lookup.len().checked_sub(1) else {
        block.fill(F::zero());
        return;
    };

    block.mapv_inplace(|v| {
        let idx = if v >= F::zero() {
            v.trunc().to_usize().map_or(last, |i| i.min(last))
        } else {
            0
        };
        lookup[idx] / F::LOOKUP_SCALE
    });
}

/// Equalize one block in place: histogram, optional clipping, lookup remap.
pub fn equalize_histogram<F: ClaheFloat>(mut block: ArrayViewMut3<F>, config: &ClaheConfig<F>) {
    let mut hist = build_histogram(block.view(), config.nbins);

    if config.clipping_enabled() {
        redistribute_excess(&mut hist, config.clip_limit);
    }

    let lookup = build_lookup(hist);
    apply_lookup(block.view_mut(), &lookup);
}
