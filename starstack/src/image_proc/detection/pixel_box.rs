//! Inclusive rectangular pixel regions.

use std::ops::RangeInclusive;

use ndarray::{s, ArrayView2};

/// Rows `top..=bottom` and columns `left..=right` of an image.
///
/// Always holds at least one pixel: boxes start from a single pixel and only grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl PixelBox {
    pub fn point(row: usize, col: usize) -> Self {
        Self {
            top: row,
            left: col,
            bottom: row,
            right: col,
        }
    }

    /// Grow to cover `(row, col)`.
    pub fn include(&mut self, row: usize, col: usize) {
        self.top = self.top.min(row);
        self.left = self.left.min(col);
        self.bottom = self.bottom.max(row);
        self.right = self.right.max(col);
    }

    pub fn rows(&self) -> RangeInclusive<usize> {
        self.top..=self.bottom
    }

    pub fn cols(&self) -> RangeInclusive<usize> {
        self.left..=self.right
    }

    /// `(height, width)` in pixels.
    pub fn dim(&self) -> (usize, usize) {
        (self.bottom - self.top + 1, self.right - self.left + 1)
    }

    /// This box widened by `margin` pixels on every side, kept inside a
    /// `(height, width)` image.
    pub fn grown(&self, margin: usize, image_dim: (usize, usize)) -> Self {
        let (height, width) = image_dim;
        Self {
            top: self.top.saturating_sub(margin),
            left: self.left.saturating_sub(margin),
            bottom: (self.bottom + margin).min(height.saturating_sub(1)),
            right: (self.right + margin).min(width.saturating_sub(1)),
        }
    }

    /// Overlap with `other`, if any.
    pub fn clipped_to(&self, other: &PixelBox) -> Option<PixelBox> {
        let top = self.top.max(other.top);
        let left = self.left.max(other.left);
        let bottom = self.bottom.min(other.bottom);
        let right = self.right.min(other.right);
        (top <= bottom && left <= right).then_some(PixelBox {
            top,
            left,
            bottom,
            right,
        })
    }

    /// The pixels of `image` under this box.
    pub fn slice<'a, T>(&self, image: ArrayView2<'a, T>) -> ArrayView2<'a, T> {
        image.slice_move(s![self.rows(), self.cols()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_include_grows_from_a_point() {
        let mut region = PixelBox::point(5, 7);
        region.include(2, 9);
        region.include(4, 8);

        assert_eq!(region, PixelBox { top: 2, left: 7, bottom: 5, right: 9 });
        assert_eq!(region.dim(), (4, 3));
    }

    #[test]
    fn test_grown_stays_inside_image() {
        let region = PixelBox { top: 1, left: 1, bottom: 3, right: 8 };
        assert_eq!(
            region.grown(2, (5, 10)),
            PixelBox { top: 0, left: 0, bottom: 4, right: 9 }
        );
    }

    #[test]
    fn test_clipped_to() {
        let a = PixelBox { top: 0, left: 0, bottom: 4, right: 4 };
        let b = PixelBox { top: 3, left: 2, bottom: 8, right: 8 };
        assert_eq!(a.clipped_to(&b), Some(PixelBox { top: 3, left: 2, bottom: 4, right: 4 }));
        assert_eq!(a.clipped_to(&PixelBox::point(6, 6)), None);
    }

    #[test]
    fn test_slice_is_inclusive() {
        let image = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64);
        let sub = PixelBox { top: 1, left: 2, bottom: 2, right: 3 }.slice(image.view());
        assert_eq!(sub.dim(), (2, 2));
        assert_eq!(sub[[0, 0]], 6.0);
        assert_eq!(sub[[1, 1]], 11.0);
    }
}
