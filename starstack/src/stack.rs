//! Mean and median combination of aligned frames.
//!
//! The accumulator keeps a running sum for the mean and every aligned frame
//! for the per-pixel median. It is finalized exactly once.

use ndarray::{Array2, Axis};
use rayon::prelude::*;
use stack_math::median_in_place;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StackError {
    #[error("cannot accumulate into a stack that has been finalized")]
    AccumulateAfterFinalize,

    #[error("stack has already been finalized")]
    AlreadyFinalized,

    #[error("cannot finalize a stack with no frames")]
    Empty,

    #[error("frame is {found:?} but the stack is {expected:?} (rows, cols)")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Composite images produced by [`Stack::finalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct StackImages {
    pub mean: Array2<f64>,
    pub median: Array2<f64>,
    /// Number of frames combined
    pub frames: usize,
}

/// Accumulator for aligned frames of a fixed size.
#[derive(Debug, Clone)]
pub struct Stack {
    width: usize,
    height: usize,
    sum: Array2<f64>,
    frames: Vec<Array2<f64>>,
    finalized: bool,
}

impl Stack {
    /// Create an empty stack for frames of the given dimensions.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            sum: Array2::zeros((height, width)),
            frames: Vec::new(),
            finalized: false,
        }
    }

    /// `(height, width)` of frames this stack accepts.
    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Add an aligned frame.
    pub fn accumulate(&mut self, frame: Array2<f64>) -> Result<(), StackError> {
        if self.finalized {
            return Err(StackError::AccumulateAfterFinalize);
        }
        if frame.dim() != self.dim() {
            return Err(StackError::DimensionMismatch {
                expected: self.dim(),
                found: frame.dim(),
            });
        }

        self.sum += &frame;
        self.frames.push(frame);
        Ok(())
    }

    /// Produce the mean and median composites and release the frame buffer.
    ///
    /// The mean divides by the number of frames actually accumulated. For an
    /// even count the median is the mean of the two central values.
    pub fn finalize(&mut self) -> Result<StackImages, StackError> {
        if self.finalized {
            return Err(StackError::AlreadyFinalized);
        }
        if self.frames.is_empty() {
            return Err(StackError::Empty);
        }

        let n = self.frames.len();
        let mean = &self.sum / n as f64;
        let median = self.median();

        self.finalized = true;
        self.frames.clear();
        self.sum.fill(0.0);

        Ok(StackImages {
            mean,
            median,
            frames: n,
        })
    }

    fn median(&self) -> Array2<f64> {
        let mut median = Array2::zeros((self.height, self.width));
        let frames = &self.frames;

        median
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut out_row)| {
                let mut column = Vec::with_capacity(frames.len());
                for (col, value) in out_row.iter_mut().enumerate() {
                    column.clear();
                    column.extend(frames.iter().map(|f| f[[row, col]]));
                    *value = median_in_place(&mut column).unwrap_or(f64::NAN);
                }
            });

        median
    }
}
