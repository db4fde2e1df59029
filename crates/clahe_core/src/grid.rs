//! Block grid driver and public entry points.
//!
//! The input is a 6D volume `[batch, channel, block, x, y, z]`. Every
//! `(batch, channel, block)` triple is independent: it reads its own input and
//! mask block and writes its own contiguous region of the output, so the grid is
//! processed as a flat parallel map with no shared mutable state. The Gaussian
//! edge weights are computed once up front and shared read-only.
//!
//! Per block:
//! 1. Mask gating (skip / attenuate / pass)
//! 2. Optional min-max normalization
//! 3. Histogram equalization with optional clip redistribution
//! 4. Optional edge tapering

use ndarray::{s, Array3, Array6, ArrayView3, ArrayView6, ArrayViewMut3};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use crate::config::{profile_timing_enabled, ClaheConfig};
use crate::edges::{blend_edges, gaussian_edge_weights};
use crate::error::ClaheError;
use crate::float_trait::ClaheFloat;
use crate::histogram::equalize_histogram;
use crate::mask::apply_mask;
use crate::normalize::normalize_block;

/// Run the per-block pipeline on an already mask-gated block.
fn process_block<F: ClaheFloat>(
    mut block: ArrayViewMut3<F>,
    config: &ClaheConfig<F>,
    weights: &[F],
) {
    if config.block_norm {
        normalize_block(block.view_mut(), F::usize_as(config.hmax()));
    }

    equalize_histogram(block.view_mut(), config);

    if !weights.is_empty() {
        blend_edges(block, weights);
    }
}

/// Equalize a single block.
///
/// Edge weights are derived from this block's first spatial extent, exactly as
/// the grid driver would for a volume made of blocks of this shape.
pub fn equalize_block<F: ClaheFloat>(
    block: ArrayView3<F>,
    config: &ClaheConfig<F>,
) -> Result<Array3<F>, ClaheError> {
    config.validate()?;

    let weights = gaussian_edge_weights(config, block.dim().0);
    let mut output = block.to_owned();
    if !output.is_empty() {
        process_block(output.view_mut(), config, &weights);
    }
    Ok(output)
}

/// Volumetric CLAHE over a pre-blocked volume.
///
/// `mask`, if given, must have the same shape as `volume`; a mask of any other
/// shape disables masking for the whole call. A block whose mask sums to zero
/// is copied to the output unchanged.
///
/// # Example
///
/// ```
/// use clahe_core::{equalize, ClaheConfig};
/// use ndarray::Array6;
///
/// let volume = Array6::<f32>::from_elem((1, 1, 2, 8, 8, 8), 12.0);
/// let config = ClaheConfig::default();
/// let result = equalize(volume.view(), None, &config).unwrap();
/// assert_eq!(result.dim(), volume.dim());
/// ```
pub fn equalize<F: ClaheFloat>(
    volume: ArrayView6<F>,
    mask: Option<ArrayView6<F>>,
    config: &ClaheConfig<F>,
) -> Result<Array6<F>, ClaheError> {
    run_grid(volume, mask, config, None)
}

/// Same as [`equalize`], but checks `cancel` before each block and returns
/// [`ClaheError::Cancelled`] once it is set.
pub fn equalize_with_cancel<F: ClaheFloat>(
    volume: ArrayView6<F>,
    mask: Option<ArrayView6<F>>,
    config: &ClaheConfig<F>,
    cancel: &AtomicBool,
) -> Result<Array6<F>, ClaheError> {
    run_grid(volume, mask, config, Some(cancel))
}

fn run_grid<F: ClaheFloat>(
    volume: ArrayView6<F>,
    mask: Option<ArrayView6<F>>,
    config: &ClaheConfig<F>,
    cancel: Option<&AtomicBool>,
) -> Result<Array6<F>, ClaheError> {
    config.validate()?;

    let start = Instant::now();
    let (batches, channels, blocks, sx, sy, sz) = volume.dim();

    let mask = match mask {
        Some(m) if m.shape() == volume.shape() => Some(m),
        Some(m) => {
            log::debug!(
                "mask shape {:?} does not match volume shape {:?}; masking disabled",
                m.shape(),
                volume.shape()
            );
            None
        }
        None => None,
    };

    let block_len = sx * sy * sz;
    let total = batches * channels * blocks * block_len;
    if total == 0 {
        return Ok(Array6::zeros(volume.raw_dim()));
    }

    let weights = gaussian_edge_weights(config, sx);
    let skipped = AtomicUsize::new(0);
    let mut data = vec![F::zero(); total];

    data.par_chunks_mut(block_len)
        .enumerate()
        .try_for_each(|(flat, chunk)| -> Result<(), ClaheError> {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(ClaheError::Cancelled);
            }

            let b = flat / (channels * blocks);
            let c = (flat / blocks) % channels;
            let i = flat % blocks;

            let mut out = ArrayViewMut3::from_shape((sx, sy, sz), chunk)?;
            out.assign(&volume.slice(s![b, c, i, .., .., ..]));

            let mask_block = mask.as_ref().map(|m| m.slice(s![b, c, i, .., .., ..]));
            if !apply_mask(out.view_mut(), mask_block) {
                skipped.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }

            process_block(out, config, &weights);
            Ok(())
        })?;

    let output = Array6::from_shape_vec(volume.raw_dim(), data)?;

    if profile_timing_enabled() {
        log::info!(
            "clahe_profile shape={:?} blocks={} skipped={} nbins={} clip={:?} smooth_len={} wall_ms={:.3}",
            volume.shape(),
            batches * channels * blocks,
            skipped.load(Ordering::Relaxed),
            config.nbins,
            config.clip_limit,
            weights.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    Ok(output)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array6;

    // Helper: Simple LCG for deterministic test data
    struct SimpleLcg {
        state: u64,
    }

    impl SimpleLcg {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn next_u64(&mut self) -> u64 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            self.state
        }

        fn next_f64(&mut self) -> f64 {
            let u = self.next_u64();
            (u >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    type Shape6 = (usize, usize, usize, usize, usize, usize);

    fn random_volume(shape: Shape6, scale: f64, seed: u64) -> Array6<f64> {
        let mut rng = SimpleLcg::new(seed);
        Array6::from_shape_fn(shape, |_| rng.next_f64() * scale)
    }

    fn plain_config() -> ClaheConfig<f64> {
        ClaheConfig::default()
            .with_clip_limit(0.0)
            .with_adjust_edges(false)
    }

    fn abs_diff(a: &Array6<f64>, b: &Array6<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
    }

    // ==================== Shape and Range Tests ====================

    #[test]
    fn test_output_shape_matches_input() {
        let volume = random_volume((1, 10, 3, 8, 8, 8), 100.0, 1);
        let mask = Array6::<f64>::ones(volume.raw_dim());
        let config = ClaheConfig::default().with_clip_limit(0.6);

        let out = equalize(volume.view(), Some(mask.view()), &config).unwrap();

        assert_eq!(out.dim(), (1, 10, 3, 8, 8, 8));
        assert!(abs_diff(&out, &volume) > 0.0);
    }

    #[test]
    fn test_output_range_unit_interval() {
        let volume = random_volume((2, 2, 2, 6, 7, 5), 300.0, 2);
        let configs = [
            ClaheConfig::default(),
            ClaheConfig::default().with_block_norm(true),
            ClaheConfig::default().with_clip_limit(0.75).with_overlap(2),
            plain_config().with_nbins(32),
        ];

        for config in configs.iter() {
            let out = equalize(volume.view(), None, config).unwrap();
            assert!(out.iter().all(|&v| v.is_finite() && (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn test_negative_input_without_norm_is_finite() {
        let volume = random_volume((1, 1, 2, 4, 4, 4), 1.0, 3).mapv(|v| v - 2.0);
        let out = equalize(volume.view(), None, &ClaheConfig::default()).unwrap();

        assert!(out.iter().all(|&v| v == 0.0));
    }

    // ==================== Mask Tests ====================

    #[test]
    fn test_zero_mask_block_copies_input() {
        let volume = random_volume((1, 2, 3, 4, 4, 4), 100.0, 4);
        let mut mask = Array6::<f64>::ones(volume.raw_dim());
        mask.slice_mut(s![0, 1, 2, .., .., ..]).fill(0.0);

        for clip in [0.0, 0.2, 0.9, 5.0] {
            let config = ClaheConfig::default().with_clip_limit(clip);
            let out = equalize(volume.view(), Some(mask.view()), &config).unwrap();

            assert_eq!(
                out.slice(s![0, 1, 2, .., .., ..]),
                volume.slice(s![0, 1, 2, .., .., ..])
            );
            assert_ne!(
                out.slice(s![0, 1, 1, .., .., ..]),
                volume.slice(s![0, 1, 1, .., .., ..])
            );
        }
    }

    #[test]
    fn test_ones_mask_equals_no_mask() {
        let volume = random_volume((2, 2, 2, 6, 6, 6), 200.0, 5);
        let mask = Array6::<f64>::ones(volume.raw_dim());
        let config = ClaheConfig::default();

        let with_mask = equalize(volume.view(), Some(mask.view()), &config).unwrap();
        let without = equalize(volume.view(), None, &config).unwrap();

        assert_eq!(with_mask, without);
    }

    #[test]
    fn test_mismatched_mask_disables_masking() {
        let volume = random_volume((1, 1, 2, 4, 4, 4), 100.0, 6);
        let mask = Array6::<f64>::zeros((1, 1, 1, 4, 4, 4));
        let config = ClaheConfig::default();

        let masked = equalize(volume.view(), Some(mask.view()), &config).unwrap();
        let plain = equalize(volume.view(), None, &config).unwrap();

        assert_eq!(masked, plain);
    }

    #[test]
    fn test_bool_mask_matches_float_mask() {
        let volume = random_volume((1, 2, 2, 4, 4, 4), 100.0, 17);
        let mut valid = Array6::from_elem(volume.raw_dim(), true);
        valid.slice_mut(s![0, 0, 1, .., .., ..]).fill(false);
        valid[[0, 1, 0, 2, 2, 2]] = false;

        let float_mask = valid.mapv(|b| if b { 1.0 } else { 0.0 });
        let config = ClaheConfig::default();

        let from_bool = equalize(
            volume.view(),
            Some(crate::mask::mask_from_bool(valid.view()).view()),
            &config,
        )
        .unwrap();
        let from_float = equalize(volume.view(), Some(float_mask.view()), &config).unwrap();

        assert_eq!(from_bool, from_float);
        assert_eq!(
            from_bool.slice(s![0, 0, 1, .., .., ..]),
            volume.slice(s![0, 0, 1, .., .., ..])
        );
    }

    #[test]
    fn test_partial_mask_zeroes_contribute_to_bin_zero() {
        let volume = Array6::from_elem((1, 1, 1, 2, 2, 2), 50.0);
        let mut mask = Array6::<f64>::ones(volume.raw_dim());
        mask[[0, 0, 0, 0, 0, 0]] = 0.0;
        mask[[0, 0, 0, 1, 1, 1]] = 0.0;

        let out = equalize(volume.view(), Some(mask.view()), &plain_config()).unwrap();

        // 6 voxels in bin 50, 2 masked voxels in bin 0
        assert_eq!(out[[0, 0, 0, 0, 1, 0]], 1.0);
        assert!((out[[0, 0, 0, 0, 0, 0]] - 2.0 / 6.0).abs() < 1e-12);
    }

    // ==================== Clip Tests ====================

    #[test]
    fn test_disabled_clip_matches_plain_equalization() {
        // Integer intensities in [0, 100] land in their own bin
        let mut rng = SimpleLcg::new(7);
        let volume =
            Array6::from_shape_fn((1, 1, 1, 8, 8, 8), |_| (rng.next_u64() >> 33) as f64 % 101.0);

        let mut counts = vec![0.0f64; 256];
        for &v in volume.iter() {
            counts[v as usize] += 1.0;
        }
        let max = counts.iter().copied().fold(0.0, f64::max);
        let expected = volume.mapv(|v| counts[v as usize] / max * 255.0 / 255.0);

        for clip in [0.0, -1.0, 1.0, 2.5] {
            let out = equalize(volume.view(), None, &plain_config().with_clip_limit(clip)).unwrap();
            assert_eq!(out, expected);
        }
    }

    #[test]
    fn test_disabled_clip_real_valued_intensities() {
        // Real values in [0, 100]: the histc bin is floor(v * 256 / 255) while the
        // lookup index is trunc(v), so the two disagree just below each integer.
        let volume = random_volume((1, 1, 1, 8, 8, 8), 100.0, 16);

        let bins_per_unit = 256.0 / 255.0;
        let mut counts = vec![0.0f64; 256];
        for &v in volume.iter() {
            counts[(v * bins_per_unit).floor() as usize] += 1.0;
        }
        let max = counts.iter().copied().fold(0.0, f64::max);
        let expected = volume.mapv(|v| counts[v.trunc() as usize] / max * 255.0 / 255.0);

        assert!(volume
            .iter()
            .any(|&v| (v * bins_per_unit).floor() != v.trunc()));

        for clip in [0.0, -1.0, 1.0, 2.5] {
            let out = equalize(volume.view(), None, &plain_config().with_clip_limit(clip)).unwrap();
            assert_eq!(out, expected);
        }
    }

    #[test]
    fn test_lookup_index_differs_from_bin() {
        // 99.7 is binned into 100 but looks up entry 99, which is empty
        let volume =
            Array6::from_shape_vec((1, 1, 1, 1, 1, 3), vec![99.7f64, 99.7, 50.2]).unwrap();
        let out = equalize(volume.view(), None, &plain_config()).unwrap();

        assert_eq!(out[[0, 0, 0, 0, 0, 0]], 0.0);
        assert_eq!(out[[0, 0, 0, 0, 0, 1]], 0.0);
        assert_eq!(out[[0, 0, 0, 0, 0, 2]], 0.5);
    }

    #[test]
    fn test_clip_effect_shrinks_toward_one() {
        let volume = random_volume((1, 1, 1, 8, 8, 8), 100.0, 8);
        let reference = equalize(volume.view(), None, &plain_config()).unwrap();

        let distances: Vec<f64> = [0.3, 0.6, 0.9]
            .iter()
            .map(|&clip| {
                let out =
                    equalize(volume.view(), None, &plain_config().with_clip_limit(clip)).unwrap();
                abs_diff(&out, &reference)
            })
            .collect();

        assert!(distances[0] > distances[1]);
        assert!(distances[1] > distances[2]);
        assert!(distances[2] > 0.0);
    }

    // ==================== Degenerate Block Tests ====================

    #[test]
    fn test_constant_block_maps_to_constant() {
        let volume = Array6::from_elem((1, 1, 1, 4, 4, 4), 9.0f64);

        for block_norm in [false, true] {
            let config = ClaheConfig::default()
                .with_adjust_edges(false)
                .with_block_norm(block_norm);
            let out = equalize(volume.view(), None, &config).unwrap();

            let first = out[[0, 0, 0, 0, 0, 0]];
            assert!(first.is_finite());
            assert!(out.iter().all(|&v| v == first));
        }
    }

    #[test]
    fn test_empty_volume() {
        let volume = Array6::<f32>::zeros((0, 2, 3, 4, 4, 4));
        let out = equalize(volume.view(), None, &ClaheConfig::default()).unwrap();
        assert_eq!(out.dim(), (0, 2, 3, 4, 4, 4));

        let flat = Array6::<f32>::zeros((1, 1, 2, 4, 0, 4));
        let out = equalize(flat.view(), None, &ClaheConfig::default()).unwrap();
        assert_eq!(out.dim(), (1, 1, 2, 4, 0, 4));
    }

    // ==================== Edge Blending Tests ====================

    #[test]
    fn test_edge_blend_only_touches_boundary() {
        let volume = random_volume((1, 1, 2, 8, 8, 8), 100.0, 9);
        let base = ClaheConfig::default().with_overlap(2);

        let sharp = equalize(volume.view(), None, &base.clone().with_adjust_edges(false)).unwrap();
        let blended = equalize(volume.view(), None, &base).unwrap();

        let mut boundary_changed = false;
        for ((b, c, i, x, y, z), &v) in blended.indexed_iter() {
            let interior = [x, y, z].iter().all(|&p| (2..6).contains(&p));
            let reference = sharp[[b, c, i, x, y, z]];
            if interior {
                assert_eq!(v, reference);
            } else if v != reference {
                boundary_changed = true;
            }
        }
        assert!(boundary_changed);
    }

    #[test]
    fn test_equalize_block_matches_grid() {
        let volume = random_volume((1, 1, 1, 9, 9, 9), 100.0, 10);
        let config = ClaheConfig::default();

        let grid = equalize(volume.view(), None, &config).unwrap();
        let single = equalize_block(volume.slice(s![0, 0, 0, .., .., ..]), &config).unwrap();

        assert_eq!(grid.slice(s![0, 0, 0, .., .., ..]), single);
    }

    // ==================== Driver Tests ====================

    #[test]
    fn test_deterministic_across_thread_counts() {
        let volume = random_volume((2, 3, 4, 6, 6, 6), 255.0, 11);
        let config = ClaheConfig::default().with_block_norm(true);

        let single = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| equalize(volume.view(), None, &config).unwrap());
        let parallel = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap()
            .install(|| equalize(volume.view(), None, &config).unwrap());

        assert_eq!(single, parallel);
    }

    #[test]
    fn test_blocks_are_independent() {
        let volume = random_volume((1, 2, 2, 5, 5, 5), 100.0, 12);
        let config = ClaheConfig::default();
        let full = equalize(volume.view(), None, &config).unwrap();

        let mut modified = volume.clone();
        modified.slice_mut(s![0, 0, 0, .., .., ..]).fill(3.0);
        let out = equalize(modified.view(), None, &config).unwrap();

        assert_eq!(
            out.slice(s![0, 1, 1, .., .., ..]),
            full.slice(s![0, 1, 1, .., .., ..])
        );
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let volume = random_volume((1, 1, 1, 4, 4, 4), 10.0, 13);
        let config = ClaheConfig::default().with_nbins(1);

        assert!(matches!(
            equalize(volume.view(), None, &config),
            Err(ClaheError::InvalidBins(1))
        ));
    }

    #[test]
    fn test_cancel_flag() {
        let volume = random_volume((1, 1, 4, 4, 4, 4), 10.0, 14);
        let config = ClaheConfig::default();

        let cancel = AtomicBool::new(true);
        let result = equalize_with_cancel(volume.view(), None, &config, &cancel);
        assert!(matches!(result, Err(ClaheError::Cancelled)));

        let cancel = AtomicBool::new(false);
        let result = equalize_with_cancel(volume.view(), None, &config, &cancel).unwrap();
        assert_eq!(result, equalize(volume.view(), None, &config).unwrap());
    }

    #[test]
    fn test_f32_volume() {
        let volume = random_volume((1, 2, 2, 6, 6, 6), 100.0, 15).mapv(|v| v as f32);
        let out = equalize(volume.view(), None, &ClaheConfig::<f32>::default()).unwrap();

        assert!(out.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}
