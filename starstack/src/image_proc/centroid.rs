//! Flux-weighted centroids of masked source windows.

use nalgebra::{Matrix2, SymmetricEigen, Vector2};
use ndarray::ArrayView2;

/// Largest ratio of principal variances still accepted as a point source.
pub const MAX_ASPECT_RATIO: f64 = 2.5;

/// Position and shape of the flux inside a mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    /// `(x = col, y = row)` relative to the window origin
    pub position: Vector2<f64>,
    pub flux: f64,
    /// Flux-weighted covariance of pixel positions about `position`
    pub covariance: Matrix2<f64>,
}

impl Centroid {
    /// Major over minor principal variance; infinite for a degenerate shape.
    pub fn aspect_ratio(&self) -> f64 {
        let eigen = SymmetricEigen::new(self.covariance);
        let major = eigen.eigenvalues.max();
        let minor = eigen.eigenvalues.min();
        if minor > f64::EPSILON {
            major / minor
        } else {
            f64::INFINITY
        }
    }

    /// Mean squared distance of the flux from the centroid.
    pub fn spread(&self) -> f64 {
        self.covariance.trace()
    }

    /// Round enough to be a star rather than a trail or a cosmic-ray hit.
    pub fn is_point_like(&self) -> bool {
        self.flux > 0.0 && self.aspect_ratio() < MAX_ASPECT_RATIO
    }
}

/// Centroid of the `window` pixels selected by `mask`.
///
/// Intensities are the weights, so `window` should already be sky-subtracted.
/// Returns `None` when the selected pixels carry no positive flux.
///
/// # Panics
/// Panics if `window` and `mask` differ in shape.
pub fn measure_centroid(window: &ArrayView2<f64>, mask: &ArrayView2<bool>) -> Option<Centroid> {
    assert_eq!(window.dim(), mask.dim(), "window and mask shapes differ");

    let samples: Vec<(Vector2<f64>, f64)> = mask
        .indexed_iter()
        .filter(|&(_, &inside)| inside)
        .map(|((row, col), _)| (Vector2::new(col as f64, row as f64), window[[row, col]]))
        .collect();

    let (flux, first_moment) = samples
        .iter()
        .fold((0.0, Vector2::<f64>::zeros()), |(flux, sum), (p, v)| (flux + v, sum + p * *v));
    if flux < f64::EPSILON {
        return None;
    }

    let position = first_moment / flux;
    let covariance = samples.iter().fold(Matrix2::<f64>::zeros(), |acc, (p, v)| {
        let d = p - position;
        acc + d * d.transpose() * *v
    }) / flux;

    Some(Centroid {
        position,
        flux,
        covariance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn masked(pixels: &[(usize, usize, f64)], dim: (usize, usize)) -> (Array2<f64>, Array2<bool>) {
        let mut window = Array2::zeros(dim);
        let mut mask = Array2::from_elem(dim, false);
        for &(r, c, v) in pixels {
            window[[r, c]] = v;
            mask[[r, c]] = true;
        }
        (window, mask)
    }

    #[test]
    fn test_cross_is_centred_and_round() {
        let (window, mask) = masked(
            &[(2, 1, 50.0), (2, 2, 100.0), (2, 3, 50.0), (1, 2, 50.0), (3, 2, 50.0)],
            (5, 5),
        );

        let centroid = measure_centroid(&window.view(), &mask.view()).unwrap();

        assert_relative_eq!(centroid.position.x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(centroid.position.y, 2.0, epsilon = 1e-12);
        assert_relative_eq!(centroid.flux, 300.0);
        assert_relative_eq!(centroid.covariance[(0, 0)], 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(centroid.aspect_ratio(), 1.0, epsilon = 1e-9);
        assert!(centroid.is_point_like());
    }

    #[test]
    fn test_subpixel_position_of_gaussian() {
        let (cx, cy, sigma) = (4.3, 3.6, 1.2);
        let window = Array2::from_shape_fn((9, 9), |(r, c)| {
            let dx = c as f64 - cx;
            let dy = r as f64 - cy;
            1000.0 * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
        });
        let mask = Array2::from_elem((9, 9), true);

        let centroid = measure_centroid(&window.view(), &mask.view()).unwrap();

        assert_relative_eq!(centroid.position.x, cx, epsilon = 0.01);
        assert_relative_eq!(centroid.position.y, cy, epsilon = 0.01);
        assert_relative_eq!(centroid.spread(), 2.0 * sigma * sigma, epsilon = 0.1);
    }

    #[test]
    fn test_streak_is_rejected() {
        let mut pixels: Vec<(usize, usize, f64)> = (1..8).map(|c| (1, c, 100.0)).collect();
        pixels.extend([(0, 4, 10.0), (2, 4, 10.0)]);
        let (window, mask) = masked(&pixels, (3, 9));

        let centroid = measure_centroid(&window.view(), &mask.view()).unwrap();

        assert!(centroid.covariance[(0, 0)] > centroid.covariance[(1, 1)]);
        assert!(centroid.aspect_ratio() > MAX_ASPECT_RATIO);
        assert!(!centroid.is_point_like());
    }

    #[test]
    fn test_single_row_is_degenerate() {
        let (window, mask) = masked(&[(0, 0, 1.0), (0, 2, 1.0)], (1, 3));
        let centroid = measure_centroid(&window.view(), &mask.view()).unwrap();
        assert_relative_eq!(centroid.position.x, 1.0);
        assert_eq!(centroid.aspect_ratio(), f64::INFINITY);
    }

    #[test]
    fn test_no_flux_has_no_centroid() {
        let window = Array2::from_elem((3, 3), 5.0);
        let empty = Array2::from_elem((3, 3), false);
        assert!(measure_centroid(&window.view(), &empty.view()).is_none());

        let (negative, mask) = masked(&[(1, 1, -4.0), (1, 2, 1.0)], (3, 3));
        assert!(measure_centroid(&negative.view(), &mask.view()).is_none());
    }
}
