//! Numeric building blocks shared by the stacking pipeline.

pub mod bilinear;
pub mod stats;

pub use bilinear::{BilinearSampler, EdgePolicy, InterpolationError};
pub use stats::{
    mean_std, median, median_in_place, sigma_clipped_stats, ClippedStats, StatsError,
};
