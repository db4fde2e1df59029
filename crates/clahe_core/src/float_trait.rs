//! Float trait abstraction for f32/f64 support.
//!
//! Every stage of the equalizer is generic over [`ClaheFloat`], so volumes can be
//! processed in either single or double precision without duplicated code.

use num_traits::{Float, FromPrimitive, NumAssign};
use std::fmt::Debug;
use std::iter::Sum;

/// Trait alias for floating point types supported by the equalizer.
///
/// Combines:
/// - Basic float operations (Float, NumAssign)
/// - Conversion from primitive types (FromPrimitive)
/// - Iteration support (Sum)
/// - Thread safety for the parallel block driver
pub trait ClaheFloat:
    Float + FromPrimitive + NumAssign + Sum + Debug + Send + Sync + 'static
{
    /// Full scale of the equalization lookup table.
    const LOOKUP_SCALE: Self;

    /// Create a value from an f64 constant.
    fn from_f64_c(val: f64) -> Self;

    /// Create a value from a usize constant.
    fn usize_as(val: usize) -> Self;
}

impl ClaheFloat for f32 {
    const LOOKUP_SCALE: Self = 255.0;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val as f32
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f32
    }
}

impl ClaheFloat for f64 {
    const LOOKUP_SCALE: Self = 255.0;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f64
    }
}
