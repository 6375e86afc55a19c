//! Point-source detection.
//!
//! - **background**: sigma-clipped sky statistics
//! - **segmentation**: threshold masks and 4-connected components
//! - **pixel_box**: rectangular pixel regions
//! - **detector**: the full detection pass producing a [`Catalog`](crate::catalog::Catalog)

pub mod background;
pub mod detector;
pub mod pixel_box;
pub mod segmentation;

pub use background::{estimate_background, BackgroundStats};
pub use detector::{detect, find_sources, DetectedPeak, DetectionError, DetectionParams, DetectionSummary};
pub use pixel_box::PixelBox;
pub use segmentation::{segment, threshold_mask, Component, Segmentation};
