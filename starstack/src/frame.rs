//! Calibrated exposures as they enter the stacking pipeline.

use ndarray::{s, Array2, ArrayView2};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("border of {border} px leaves nothing of a {width}x{height} frame")]
    BorderTooLarge {
        border: usize,
        width: usize,
        height: usize,
    },
}

/// A single calibrated exposure.
///
/// Pixel data is indexed `[y, x]` (row-major), matching the rest of the crate.
/// `index` is the frame's position in the input sequence and `id` is the
/// human-readable handle (usually the source filename) carried into reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    id: String,
    index: usize,
    data: Array2<f64>,
    calibrated: bool,
}

impl Frame {
    /// Wrap already-calibrated pixel data.
    pub fn new(id: impl Into<String>, index: usize, data: Array2<f64>) -> Self {
        Self {
            id: id.into(),
            index,
            data,
            calibrated: true,
        }
    }

    /// Mark whether bias, dark and flat correction have been applied.
    pub fn with_calibrated(mut self, calibrated: bool) -> Self {
        self.calibrated = calibrated;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// `(height, width)`, the same order as `Array2::dim`.
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Copy of this frame with `border` pixels removed from every edge.
    pub fn trimmed(&self, border: usize) -> Result<Frame, FrameError> {
        if border == 0 {
            return Ok(self.clone());
        }

        let (height, width) = self.dim();
        if 2 * border >= width || 2 * border >= height {
            return Err(FrameError::BorderTooLarge {
                border,
                width,
                height,
            });
        }

        let data = self
            .data
            .slice(s![border..height - border, border..width - border])
            .to_owned();

        Ok(Frame {
            id: self.id.clone(),
            index: self.index,
            data,
            calibrated: self.calibrated,
        })
    }
}
