pub mod direct;
pub mod plan;
pub mod segment;
pub mod vector;

pub use direct::DirectConvolver;
pub use plan::{PartitionPlan, SegmentDescriptor};
pub use segment::{SegmentKernel, SegmentState};

use rustfft::FftNum;
use rustfft::num_traits::Float;

/// Floating-point sample type the engine is instantiated for.
///
/// Implemented for `f32` and `f64`; every numeric kernel in the crate is
/// generic over it so the two precisions share one code path.
pub trait Sample: FftNum + Float + Default {
    /// Converts a configuration value into this precision.
    fn lit(value: f64) -> Self;

    fn as_f64(self) -> f64;
}

impl Sample for f32 {
    #[inline]
    fn lit(value: f64) -> Self {
        value as Self
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for f64 {
    #[inline]
    fn lit(value: f64) -> Self {
        value
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}
