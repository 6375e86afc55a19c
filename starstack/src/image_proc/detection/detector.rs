//! Point-source detection on calibrated frames.
//!
//! Detection runs in four stages:
//!
//! 1. sigma-clipped background estimate (median `m`, std `s`)
//! 2. threshold at `m + threshold_sigma * s` and 4-connected labelling
//! 3. per component, brightest-first local maxima separated by more than
//!    `2 * fwhm`; components smaller than the PSF core are dropped as hot pixels
//! 4. flux-weighted centroid within `fwhm` of each maximum, rejecting
//!    elongated shapes
//!
//! An image with nothing above threshold produces an empty catalog, not an
//! error. Whether that is fatal is up to the caller.

use std::f64::consts::PI;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use stack_math::StatsError;
use thiserror::Error;

use super::background::{estimate_background, BackgroundStats};
use super::segmentation::{segment, threshold_mask, Component, Segmentation};
use super::PixelBox;
use crate::catalog::{Catalog, Source};
use crate::frame::Frame;
use crate::image_proc::centroid::{measure_centroid, Centroid};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("fwhm must be positive and finite, got {0}")]
    InvalidFwhm(f64),

    #[error("threshold must be positive and finite, got {0} sigma")]
    InvalidThreshold(f64),

    #[error("cannot detect sources in an empty {height}x{width} image")]
    EmptyImage { width: usize, height: usize },

    #[error("background estimation failed: {0}")]
    Background(#[from] StatsError),
}

/// Detection tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionParams {
    /// Expected point-source FWHM in pixels
    pub fwhm: f64,
    /// Detection threshold above background, in background standard deviations
    pub threshold_sigma: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            fwhm: 3.0,
            threshold_sigma: 5.0,
        }
    }
}

impl DetectionParams {
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !self.fwhm.is_finite() || self.fwhm <= 0.0 {
            return Err(DetectionError::InvalidFwhm(self.fwhm));
        }
        if !self.threshold_sigma.is_finite() || self.threshold_sigma <= 0.0 {
            return Err(DetectionError::InvalidThreshold(self.threshold_sigma));
        }
        Ok(())
    }

    /// Smallest component accepted as a source: the area of a disc of
    /// diameter `fwhm / 2`, and never less than two pixels.
    pub fn min_component_area(&self) -> usize {
        let core = 0.25 * PI * (self.fwhm / 2.0).powi(2);
        (core.ceil() as usize).max(2)
    }

    /// Minimum distance between two maxima reported as separate sources.
    pub fn min_separation(&self) -> f64 {
        2.0 * self.fwhm
    }
}

/// A measured source in image coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPeak {
    pub x: f64,
    pub y: f64,
    /// Brightest pixel minus background median
    pub peak: f64,
    pub flux: f64,
    pub aspect_ratio: f64,
}

/// Everything measured during one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub background: BackgroundStats,
    pub threshold: f64,
    /// Connected components above threshold
    pub components: usize,
    /// Components dropped for being smaller than the PSF core
    pub rejected_small: usize,
    /// Maxima dropped for elongated or non-positive moments
    pub rejected_shape: usize,
    pub peaks: Vec<DetectedPeak>,
}

#[derive(Debug, Clone, Copy)]
struct Maximum {
    row: usize,
    col: usize,
    value: f64,
}

impl Maximum {
    fn distance(&self, other: &Maximum) -> f64 {
        let dr = self.row as f64 - other.row as f64;
        let dc = self.col as f64 - other.col as f64;
        (dr * dr + dc * dc).sqrt()
    }
}

fn is_local_maximum(image: &ArrayView2<f64>, row: usize, col: usize) -> bool {
    let (height, width) = image.dim();
    let value = image[[row, col]];
    let rows = row.saturating_sub(1)..=(row + 1).min(height - 1);

    rows.flat_map(|r| (col.saturating_sub(1)..=(col + 1).min(width - 1)).map(move |c| (r, c)))
        .filter(|&(r, c)| (r, c) != (row, col))
        .all(|(r, c)| value >= image[[r, c]])
}

/// Local maxima of one component, brightest first, thinned to `min_separation`.
fn component_maxima(
    image: &ArrayView2<f64>,
    labels: &ArrayView2<usize>,
    component: &Component,
    min_separation: f64,
) -> Vec<Maximum> {
    let mut maxima = Vec::new();
    for row in component.bounds.rows() {
        for col in component.bounds.cols() {
            if labels[[row, col]] == component.label && is_local_maximum(image, row, col) {
                maxima.push(Maximum {
                    row,
                    col,
                    value: image[[row, col]],
                });
            }
        }
    }

    maxima.sort_by(|a, b| {
        b.value
            .total_cmp(&a.value)
            .then(a.row.cmp(&b.row))
            .then(a.col.cmp(&b.col))
    });

    let mut kept: Vec<Maximum> = Vec::new();
    for candidate in maxima {
        if kept.iter().all(|k| k.distance(&candidate) > min_separation) {
            kept.push(candidate);
        }
    }
    kept
}

/// Run detection on a raw pixel array and return the full summary.
pub fn find_sources(image: &ArrayView2<f64>, params: &DetectionParams) -> Result<DetectionSummary, DetectionError> {
    params.validate()?;

    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return Err(DetectionError::EmptyImage { width, height });
    }

    let background = estimate_background(image)?;
    let threshold = background.median + params.threshold_sigma * background.std;

    let mask = threshold_mask(image, threshold);
    let Segmentation { labels, components } = segment(&mask.view());

    let min_area = params.min_component_area();
    let radius = params.fwhm;
    let margin = radius.ceil() as usize;

    let mut summary = DetectionSummary {
        background,
        threshold,
        components: components.len(),
        rejected_small: 0,
        rejected_shape: 0,
        peaks: Vec::new(),
    };

    for component in &components {
        if component.area < min_area {
            summary.rejected_small += 1;
            continue;
        }

        let maxima = component_maxima(image, &labels.view(), component, params.min_separation());

        for maximum in maxima {
            let Some(window) = PixelBox::point(maximum.row, maximum.col)
                .grown(margin, (height, width))
                .clipped_to(&component.bounds)
            else {
                continue;
            };

            let sub_image = window.slice(image.view()).mapv(|v| v - background.median);
            let sub_labels = window.slice(labels.view());
            let centre_row = (maximum.row - window.top) as f64;
            let centre_col = (maximum.col - window.left) as f64;

            let sub_mask = Array2::from_shape_fn(sub_image.dim(), |(r, c)| {
                let dr = r as f64 - centre_row;
                let dc = c as f64 - centre_col;
                sub_labels[[r, c]] == component.label && (dr * dr + dc * dc).sqrt() <= radius
            });

            let Some(centroid) = measure_centroid(&sub_image.view(), &sub_mask.view()).filter(Centroid::is_point_like)
            else {
                summary.rejected_shape += 1;
                continue;
            };

            summary.peaks.push(DetectedPeak {
                x: centroid.position.x + window.left as f64,
                y: centroid.position.y + window.top as f64,
                peak: maximum.value - background.median,
                flux: centroid.flux,
                aspect_ratio: centroid.aspect_ratio(),
            });
        }
    }

    Ok(summary)
}

/// Detect point sources on `frame` and build its catalog.
pub fn detect(frame: &Frame, params: &DetectionParams) -> Result<Catalog, DetectionError> {
    let summary = find_sources(&frame.data(), params)?;

    log::debug!(
        "{}: background median={:.2} std={:.2} ({} clip passes), threshold={:.2}, \
         {} components, {} sources ({} too small, {} misshapen)",
        frame.id(),
        summary.background.median,
        summary.background.std,
        summary.background.iterations,
        summary.threshold,
        summary.components,
        summary.peaks.len(),
        summary.rejected_small,
        summary.rejected_shape,
    );

    let frame_id = frame.id();
    let sources = summary.peaks.into_iter().map(|p| Source {
        x: p.x,
        y: p.y,
        peak: p.peak,
        flux: p.flux,
        frame_id: frame_id.to_string(),
    });

    Ok(Catalog::build(frame_id, sources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{render_stars, simple_normal_array, SyntheticStar};
    use approx::assert_relative_eq;

    fn star(x: f64, y: f64, peak: f64) -> SyntheticStar {
        SyntheticStar { x, y, peak }
    }

    fn noisy_field(stars: &[SyntheticStar], seed: u64) -> Array2<f64> {
        let noise = simple_normal_array((100, 100), 100.0, 5.0, seed);
        noise + render_stars((100, 100), stars, 3.0)
    }

    #[test]
    fn test_min_component_area() {
        let params = DetectionParams {
            fwhm: 3.0,
            threshold_sigma: 5.0,
        };
        assert_eq!(params.min_component_area(), 2);

        let wide = DetectionParams {
            fwhm: 8.0,
            ..params
        };
        assert_eq!(wide.min_component_area(), 13);
    }

    #[test]
    fn test_detects_isolated_stars_with_subpixel_accuracy() {
        let stars = [star(20.3, 30.7, 800.0), star(70.0, 60.0, 1200.0), star(45.4, 85.25, 500.0)];
        let frame = Frame::new("field", 0, noisy_field(&stars, 1));

        let catalog = detect(&frame, &DetectionParams::default()).unwrap();

        assert_eq!(catalog.len(), 3);
        let brightest = catalog.brightest().unwrap();
        assert_relative_eq!(brightest.x, 70.0, epsilon = 0.1);
        assert_relative_eq!(brightest.y, 60.0, epsilon = 0.1);
        assert!((brightest.peak - 1200.0).abs() < 30.0);

        for truth in &stars {
            let found = catalog
                .sources()
                .iter()
                .find(|s| (s.x - truth.x).abs() < 0.2 && (s.y - truth.y).abs() < 0.2);
            assert!(found.is_some(), "star at ({}, {}) not recovered", truth.x, truth.y);
        }
        assert!(catalog.sources().iter().all(|s| s.frame_id == "field"));
    }

    #[test]
    fn test_pure_noise_yields_empty_catalog() {
        let frame = Frame::new("noise", 0, simple_normal_array((100, 100), 100.0, 5.0, 9));
        let catalog = detect(&frame, &DetectionParams::default()).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_hot_pixel_is_rejected() {
        let mut image = simple_normal_array((50, 50), 100.0, 5.0, 21);
        image[[25, 25]] = 5000.0;

        let summary = find_sources(&image.view(), &DetectionParams::default()).unwrap();

        assert!(summary.peaks.is_empty());
        assert_eq!(summary.rejected_small, 1);
    }

    #[test]
    fn test_close_maxima_are_merged() {
        // Two maxima less than 2*fwhm apart inside one component.
        let stars = [star(50.0, 50.0, 1000.0), star(53.0, 50.0, 900.0)];
        let summary = find_sources(&noisy_field(&stars, 4).view(), &DetectionParams::default()).unwrap();
        assert_eq!(summary.peaks.len(), 1);
    }

    #[test]
    fn test_invalid_parameters() {
        let frame = Frame::new("f", 0, Array2::zeros((10, 10)));
        let bad = DetectionParams {
            fwhm: 0.0,
            threshold_sigma: 5.0,
        };
        assert_eq!(detect(&frame, &bad).unwrap_err(), DetectionError::InvalidFwhm(0.0));

        let empty = Frame::new("e", 0, Array2::zeros((0, 10)));
        assert!(matches!(
            detect(&empty, &DetectionParams::default()),
            Err(DetectionError::EmptyImage { .. })
        ));
    }

    #[test]
    fn test_flat_image_has_no_sources() {
        let frame = Frame::new("flat", 0, Array2::from_elem((20, 20), 42.0));
        let catalog = detect(&frame, &DetectionParams::default()).unwrap();
        assert!(catalog.is_empty());
    }
}
