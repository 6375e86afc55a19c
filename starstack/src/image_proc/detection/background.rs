//! Sky background estimation.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use stack_math::{sigma_clipped_stats, StatsError};

/// Rejection threshold for background clipping, in standard deviations.
pub const BACKGROUND_CLIP_SIGMA: f64 = 3.0;

/// Maximum number of clipping passes.
pub const BACKGROUND_CLIP_ITERATIONS: usize = 10;

/// Sigma-clipped statistics of the sky level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub iterations: usize,
}

/// Estimate the background from every finite pixel of `image`.
pub fn estimate_background(image: &ArrayView2<f64>) -> Result<BackgroundStats, StatsError> {
    let values: Vec<f64> = image.iter().copied().collect();
    let stats = sigma_clipped_stats(&values, BACKGROUND_CLIP_SIGMA, BACKGROUND_CLIP_ITERATIONS)?;

    Ok(BackgroundStats {
        mean: stats.mean,
        median: stats.median,
        std: stats.std_dev,
        iterations: stats.iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::simple_normal_array;

    #[test]
    fn test_background_of_noise_field() {
        let image = simple_normal_array((128, 128), 200.0, 4.0, 11);
        let stats = estimate_background(&image.view()).unwrap();

        assert!((stats.median - 200.0).abs() < 0.2, "median {}", stats.median);
        assert!((stats.std - 4.0).abs() < 0.3, "std {}", stats.std);
    }

    #[test]
    fn test_bright_pixels_do_not_bias_background() {
        let mut image = simple_normal_array((64, 64), 50.0, 2.0, 3);
        for i in 0..40 {
            image[[i, i]] = 10_000.0;
        }

        let stats = estimate_background(&image.view()).unwrap();

        assert!((stats.median - 50.0).abs() < 0.3);
        assert!(stats.std < 2.5);
        assert!(stats.iterations >= 1);
    }
}
