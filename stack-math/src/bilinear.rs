//! Bilinear sampling of pixel grids at continuous coordinates.
//!
//! Pixel centres sit on integer coordinates: `data[[row, col]]` is the value at
//! `(x = col, y = row)`. Samples that need pixels outside the grid resolve them
//! through an [`EdgePolicy`].

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How samples that fall outside the source grid are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum EdgePolicy {
    /// Repeat the nearest edge pixel
    #[default]
    Clamp,
    /// Treat everything outside the grid as zero
    Zero,
}

/// Error types for bilinear sampling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpolationError {
    #[error("cannot sample an empty {rows}x{cols} grid")]
    EmptyGrid { rows: usize, cols: usize },
}

/// Bilinear sampler over a borrowed pixel grid.
#[derive(Debug, Clone)]
pub struct BilinearSampler<'a> {
    /// 2D data array indexed as [row, col]
    data: ArrayView2<'a, f64>,
    edge_policy: EdgePolicy,
}

impl<'a> BilinearSampler<'a> {
    pub fn new(data: ArrayView2<'a, f64>, edge_policy: EdgePolicy) -> Result<Self, InterpolationError> {
        let (rows, cols) = data.dim();
        if rows == 0 || cols == 0 {
            return Err(InterpolationError::EmptyGrid { rows, cols });
        }
        Ok(Self { data, edge_policy })
    }

    /// Pixel value at integer coordinates, with the edge policy applied off-grid.
    pub fn pixel(&self, col: isize, row: isize) -> f64 {
        let (rows, cols) = self.data.dim();
        let inside = col >= 0 && row >= 0 && (col as usize) < cols && (row as usize) < rows;
        if inside {
            return self.data[[row as usize, col as usize]];
        }
        match self.edge_policy {
            EdgePolicy::Clamp => {
                let r = row.clamp(0, rows as isize - 1) as usize;
                let c = col.clamp(0, cols as isize - 1) as usize;
                self.data[[r, c]]
            }
            EdgePolicy::Zero => 0.0,
        }
    }

    /// Sample the grid at `(x, y)`.
    ///
    /// Integer coordinates return the stored pixel exactly. Non-finite
    /// coordinates yield NaN.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        if !x.is_finite() || !y.is_finite() {
            return f64::NAN;
        }

        let x0 = x.floor();
        let y0 = y.floor();
        let x_weight = x - x0;
        let y_weight = y - y0;
        let col = x0 as isize;
        let row = y0 as isize;

        let q11 = self.pixel(col, row);
        if x_weight == 0.0 && y_weight == 0.0 {
            return q11;
        }
        let q21 = self.pixel(col + 1, row);
        let q12 = self.pixel(col, row + 1);
        let q22 = self.pixel(col + 1, row + 1);

        let r1 = q11 * (1.0 - x_weight) + q21 * x_weight;
        let r2 = q12 * (1.0 - x_weight) + q22 * x_weight;

        r1 * (1.0 - y_weight) + r2 * y_weight
    }
}
