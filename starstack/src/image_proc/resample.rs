//! Sub-pixel translation of images.

use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use stack_math::{BilinearSampler, EdgePolicy};

/// Rows handed to each rayon task.
const ROW_CHUNK: usize = 16;

/// Translate `image` by `(dx, dy)` pixels.
///
/// The output has the input's dimensions and satisfies
/// `out(x, y) = in(x - dx, y - dy)` under bilinear interpolation, so content
/// moves towards `+x` for positive `dx`. Samples falling outside the input
/// are filled according to `edge_policy`. Rows are computed in parallel.
pub fn resample(image: &ArrayView2<f64>, dx: f64, dy: f64, edge_policy: EdgePolicy) -> Array2<f64> {
    let Ok(sampler) = BilinearSampler::new(image.view(), edge_policy) else {
        // Nothing to sample from an empty grid
        return image.to_owned();
    };

    let mut out = Array2::zeros(image.dim());
    out.axis_chunks_iter_mut(Axis(0), ROW_CHUNK)
        .into_par_iter()
        .enumerate()
        .for_each(|(chunk_idx, mut chunk)| {
            let first_row = chunk_idx * ROW_CHUNK;
            for ((r, c), value) in chunk.indexed_iter_mut() {
                let x = c as f64 - dx;
                let y = (first_row + r) as f64 - dy;
                *value = sampler.sample(x, y);
            }
        });

    out
}
