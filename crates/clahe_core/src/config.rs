//! Equalizer configuration.
//!
//! A single [`ClaheConfig`] drives every variant of the algorithm: clipping,
//! block normalization and edge blending are all switches on the same core.

use crate::error::ClaheError;
use crate::float_trait::ClaheFloat;

// =============================================================================
// Constants
// =============================================================================

/// Default clip limit applied to the normalized CDF
const DEFAULT_CLIP_LIMIT: f64 = 0.2;

/// Default number of histogram bins
const DEFAULT_NBINS: usize = 256;

/// Default smoothing overlap (0 = derive from block size)
const DEFAULT_OVERLAP: usize = 0;

const PROFILE_TIMING_ENV: &str = "CLAHE_PROFILE_TIMING";

// =============================================================================
// Types
// =============================================================================

/// Configuration for volumetric CLAHE.
///
/// Use `Default::default()` for the standard settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaheConfig<F: ClaheFloat> {
    /// Clip limit on the normalized CDF. Redistribution is active only for
    /// `0 < clip_limit < 1`. Default: 0.2
    pub clip_limit: F,
    /// Number of histogram bins; intensities span `[0, nbins - 1]`. Default: 256
    pub nbins: usize,
    /// Edge smoothing width in voxels; 0 derives it from the block size. Default: 0
    pub overlap: usize,
    /// Taper block boundaries with Gaussian weights. Default: true
    pub adjust_edges: bool,
    /// Min-max stretch each block into `[0, hmax]` before binning. Default: false
    pub block_norm: bool,
}

impl<F: ClaheFloat> Default for ClaheConfig<F> {
    fn default() -> Self {
        Self {
            clip_limit: F::from_f64_c(DEFAULT_CLIP_LIMIT),
            nbins: DEFAULT_NBINS,
            overlap: DEFAULT_OVERLAP,
            adjust_edges: true,
            block_norm: false,
        }
    }
}

impl<F: ClaheFloat> ClaheConfig<F> {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clip_limit(mut self, clip_limit: F) -> Self {
        self.clip_limit = clip_limit;
        self
    }

    pub fn with_nbins(mut self, nbins: usize) -> Self {
        self.nbins = nbins;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_adjust_edges(mut self, adjust_edges: bool) -> Self {
        self.adjust_edges = adjust_edges;
        self
    }

    pub fn with_block_norm(mut self, block_norm: bool) -> Self {
        self.block_norm = block_norm;
        self
    }

    /// Upper end of the histogram range.
    #[inline]
    pub fn hmax(&self) -> usize {
        self.nbins.saturating_sub(1)
    }

    /// Whether clip-limit redistribution runs for this configuration.
    #[inline]
    pub fn clipping_enabled(&self) -> bool {
        self.clip_limit > F::zero() && self.clip_limit < F::one()
    }

    /// Validate the configuration parameters.
    ///
    /// Clip limits outside `(0, 1)` are legal and simply disable clipping;
    /// only non-finite values are rejected.
    pub fn validate(&self) -> Result<(), ClaheError> {
        if self.nbins < 2 {
            return Err(ClaheError::InvalidBins(self.nbins));
        }
        if !self.clip_limit.is_finite() {
            return Err(ClaheError::InvalidClipLimit(
                self.clip_limit.to_f64().unwrap_or(f64::NAN),
            ));
        }
        Ok(())
    }
}

/// Convert a signed parameter (e.g. from Python) into a count, rejecting negatives.
pub fn usize_param(name: &'static str, value: i64) -> Result<usize, ClaheError> {
    usize::try_from(value).map_err(|_| ClaheError::InvalidParameter {
        name,
        value: value.to_string(),
    })
}

fn parse_switch(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Whether `CLAHE_PROFILE_TIMING` asks for a timing line per call.
pub(crate) fn profile_timing_enabled() -> bool {
    std::env::var(PROFILE_TIMING_ENV).map_or(false, |raw| parse_switch(&raw))
}
