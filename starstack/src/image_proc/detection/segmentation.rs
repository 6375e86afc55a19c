//! Foreground segmentation into 4-connected components.
//!
//! A raster pass hands out provisional labels and records which of them
//! touch; a disjoint-set forest resolves those into components. A second pass
//! writes the final labels and collects each component's area and bounds.

use ndarray::{Array2, ArrayView2};

use super::PixelBox;

/// `true` wherever `image >= threshold`. NaN pixels are never foreground.
pub fn threshold_mask(image: &ArrayView2<f64>, threshold: f64) -> Array2<bool> {
    image.mapv(|pixel| pixel >= threshold)
}

/// Provisional labels and the merges between them. Label 0 is background.
struct LabelForest {
    parent: Vec<usize>,
}

impl LabelForest {
    fn new() -> Self {
        Self { parent: vec![0] }
    }

    fn fresh(&mut self) -> usize {
        let label = self.parent.len();
        self.parent.push(label);
        label
    }

    /// Representative of `label`'s set, halving the path as it climbs.
    fn root(&mut self, mut label: usize) -> usize {
        while self.parent[label] != label {
            let grandparent = self.parent[self.parent[label]];
            self.parent[label] = grandparent;
            label = grandparent;
        }
        label
    }

    /// Join two sets under the smaller root.
    fn join(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.root(a), self.root(b));
        let (keep, absorb) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[absorb] = keep;
    }

    /// Final label for every provisional label: consecutive from 1, numbered
    /// by the smallest provisional label of each set.
    fn compact(&mut self) -> Vec<usize> {
        let mut compact = vec![0; self.parent.len()];
        let mut assigned = 0;
        for label in 1..self.parent.len() {
            let root = self.root(label);
            if compact[root] == 0 {
                assigned += 1;
                compact[root] = assigned;
            }
            compact[label] = compact[root];
        }
        compact
    }
}

/// One connected foreground region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Value of this component's pixels in [`Segmentation::labels`]
    pub label: usize,
    /// Pixel count
    pub area: usize,
    pub bounds: PixelBox,
}

/// Labelled image plus per-component summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// 0 for background, otherwise the owning component's label
    pub labels: Array2<usize>,
    /// `components[i]` has label `i + 1`; ordered by first pixel in raster order
    pub components: Vec<Component>,
}

/// Split the foreground of `mask` into 4-connected components.
pub fn segment(mask: &ArrayView2<bool>) -> Segmentation {
    let (height, width) = mask.dim();
    let mut labels = Array2::<usize>::zeros((height, width));
    let mut forest = LabelForest::new();

    for row in 0..height {
        for col in 0..width {
            if !mask[[row, col]] {
                continue;
            }
            let above = if row > 0 { labels[[row - 1, col]] } else { 0 };
            let left = if col > 0 { labels[[row, col - 1]] } else { 0 };

            labels[[row, col]] = match (above, left) {
                (0, 0) => forest.fresh(),
                (label, 0) | (0, label) => label,
                (a, b) => {
                    if a != b {
                        forest.join(a, b);
                    }
                    a.min(b)
                }
            };
        }
    }

    let compact = forest.compact();
    let mut components: Vec<Component> = Vec::new();

    for ((row, col), label) in labels.indexed_iter_mut() {
        if *label == 0 {
            continue;
        }
        *label = compact[*label];
        match components.get_mut(*label - 1) {
            Some(component) => {
                component.area += 1;
                component.bounds.include(row, col);
            }
            None => components.push(Component {
                label: *label,
                area: 1,
                bounds: PixelBox::point(row, col),
            }),
        }
    }

    Segmentation { labels, components }
}
