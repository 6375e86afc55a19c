//! Synthetic star fields for tests and benchmarks.
//!
//! Stars are rendered as circular Gaussians on a flat sky with seeded
//! Gaussian noise, so a whole drifting sequence is reproducible from a seed.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use crate::frame::Frame;

/// FWHM of a Gaussian in units of its sigma, `2 * sqrt(2 * ln 2)`.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// Rows of noise generated per rayon task.
const NOISE_CHUNK_ROWS: usize = 64;

/// A point source to render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticStar {
    pub x: f64,
    pub y: f64,
    /// Peak amplitude above the sky
    pub peak: f64,
}

/// Generate a 2D array of normally distributed values for testing purposes.
///
/// Deterministic for a given seed.
///
/// # Panics
/// Panics if `std_dev` is negative or not finite.
pub fn simple_normal_array(size: (usize, usize), mean: f64, std_dev: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal_dist = Normal::new(mean, std_dev).expect("Normal distribution parameters must be valid (std_dev >= 0)");
    Array2::from_shape_fn(size, |_| normal_dist.sample(&mut rng))
}

/// Noise field generated in parallel row chunks, each seeded from `seed`
/// plus its chunk index.
pub fn parallel_noise(size: (usize, usize), std_dev: f64, seed: u64) -> Array2<f64> {
    let mut field = Array2::zeros(size);
    let Ok(normal_dist) = Normal::new(0.0, std_dev) else {
        return field;
    };

    field
        .axis_chunks_iter_mut(Axis(0), NOISE_CHUNK_ROWS)
        .into_par_iter()
        .enumerate()
        .for_each(|(chunk_idx, mut chunk)| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(chunk_idx as u64));
            chunk.iter_mut().for_each(|v| *v = normal_dist.sample(&mut rng));
        });

    field
}

/// Noise-free image of `stars` with the given FWHM on a zero sky.
pub fn render_stars(size: (usize, usize), stars: &[SyntheticStar], fwhm: f64) -> Array2<f64> {
    let sigma = fwhm / FWHM_PER_SIGMA;
    let two_sigma_sq = 2.0 * sigma * sigma;
    // Beyond 6 sigma a star contributes nothing measurable
    let reach = (6.0 * sigma).ceil() as isize;
    let (height, width) = size;

    let mut image = Array2::zeros(size);
    for star in stars {
        let cx = star.x.round() as isize;
        let cy = star.y.round() as isize;
        for row in (cy - reach).max(0)..(cy + reach + 1).min(height as isize) {
            for col in (cx - reach).max(0)..(cx + reach + 1).min(width as isize) {
                let dx = col as f64 - star.x;
                let dy = row as f64 - star.y;
                image[[row as usize, col as usize]] += star.peak * (-(dx * dx + dy * dy) / two_sigma_sq).exp();
            }
        }
    }
    image
}

/// A star field observed repeatedly with pointing drift.
#[derive(Debug, Clone)]
pub struct SyntheticField {
    /// `(height, width)` of every frame
    pub size: (usize, usize),
    pub stars: Vec<SyntheticStar>,
    pub fwhm: f64,
    pub sky: f64,
    pub noise_std: f64,
}

impl SyntheticField {
    pub fn new(size: (usize, usize), stars: Vec<SyntheticStar>) -> Self {
        Self {
            size,
            stars,
            fwhm: 3.0,
            sky: 100.0,
            noise_std: 5.0,
        }
    }

    pub fn with_noise(mut self, noise_std: f64) -> Self {
        self.noise_std = noise_std;
        self
    }

    pub fn with_fwhm(mut self, fwhm: f64) -> Self {
        self.fwhm = fwhm;
        self
    }

    /// Noise-free image with every star displaced by `shift`.
    pub fn render(&self, shift: (f64, f64)) -> Array2<f64> {
        let shifted: Vec<SyntheticStar> = self
            .stars
            .iter()
            .map(|s| SyntheticStar {
                x: s.x + shift.0,
                y: s.y + shift.1,
                peak: s.peak,
            })
            .collect();
        render_stars(self.size, &shifted, self.fwhm) + self.sky
    }

    /// A calibrated frame with stars displaced by `shift` and fresh noise from `seed`.
    pub fn frame(&self, id: &str, index: usize, shift: (f64, f64), seed: u64) -> Frame {
        let data = self.render(shift) + parallel_noise(self.size, self.noise_std, seed);
        Frame::new(id, index, data)
    }

    /// Frames `0..shifts.len()` named `frame_NNN.fits`, each with its own noise seed.
    pub fn sequence(&self, shifts: &[(f64, f64)], seed: u64) -> Vec<Frame> {
        shifts
            .iter()
            .enumerate()
            .map(|(i, &shift)| self.frame(&format!("frame_{i:03}.fits"), i, shift, seed.wrapping_add(i as u64 * 1000)))
            .collect()
    }
}
