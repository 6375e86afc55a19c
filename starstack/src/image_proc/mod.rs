//! Image processing for registration: source detection, centroiding and
//! sub-pixel resampling.

pub mod centroid;
pub mod detection;
pub mod resample;

pub use centroid::{measure_centroid, Centroid};
pub use resample::resample;
