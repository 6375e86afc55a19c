//! Per-frame source catalogs ranked by brightness.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A detected point source in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Column coordinate (sub-pixel)
    pub x: f64,
    /// Row coordinate (sub-pixel)
    pub y: f64,
    /// Background-subtracted peak value
    pub peak: f64,
    /// Background-subtracted flux inside the centroid window
    pub flux: f64,
    /// Id of the frame the source was measured on
    pub frame_id: String,
}

impl Source {
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// Ordering used for catalog rank: peak descending, then y, then x ascending.
fn rank_order(a: &Source, b: &Source) -> Ordering {
    b.peak
        .total_cmp(&a.peak)
        .then_with(|| a.y.total_cmp(&b.y))
        .then_with(|| a.x.total_cmp(&b.x))
}

/// Sources from one frame, sorted brightest first.
///
/// The first `tracker_count` entries are the trackers used for matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    frame_id: String,
    sources: Vec<Source>,
    tracker_count: usize,
}

impl Catalog {
    /// Rank `sources` and build a catalog with every source enabled as a tracker.
    pub fn build(frame_id: impl Into<String>, sources: impl IntoIterator<Item = Source>) -> Self {
        let mut sources: Vec<Source> = sources.into_iter().collect();
        sources.sort_by(rank_order);
        let tracker_count = sources.len();
        Self {
            frame_id: frame_id.into(),
            sources,
            tracker_count,
        }
    }

    /// Restrict the tracker set to the `n` brightest sources.
    pub fn with_trackers(mut self, n: usize) -> Self {
        self.tracker_count = n.min(self.sources.len());
        self
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn trackers(&self) -> &[Source] {
        &self.sources[..self.tracker_count]
    }

    pub fn brightest(&self) -> Option<&Source> {
        self.sources.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(x: f64, y: f64, peak: f64) -> Source {
        Source {
            x,
            y,
            peak,
            flux: peak * 10.0,
            frame_id: "f0".to_string(),
        }
    }

    #[test]
    fn test_build_sorts_by_peak_descending() {
        let catalog = Catalog::build(
            "f0",
            vec![source(1.0, 1.0, 5.0), source(2.0, 2.0, 50.0), source(3.0, 3.0, 20.0)],
        );
        let peaks: Vec<f64> = catalog.sources().iter().map(|s| s.peak).collect();
        assert_eq!(peaks, vec![50.0, 20.0, 5.0]);
        assert_eq!(catalog.brightest().unwrap().x, 2.0);
    }

    #[test]
    fn test_equal_peaks_break_ties_on_position() {
        let catalog = Catalog::build(
            "f0",
            vec![source(9.0, 4.0, 10.0), source(3.0, 4.0, 10.0), source(1.0, 2.0, 10.0)],
        );
        let positions: Vec<(f64, f64)> = catalog.sources().iter().map(|s| (s.x, s.y)).collect();
        assert_eq!(positions, vec![(1.0, 2.0), (3.0, 4.0), (9.0, 4.0)]);
    }

    #[test]
    fn test_trackers_are_brightest_subset() {
        let sources = (0..20).map(|i| source(i as f64, 0.0, i as f64));
        let catalog = Catalog::build("f0", sources).with_trackers(10);

        assert_eq!(catalog.len(), 20);
        assert_eq!(catalog.trackers().len(), 10);
        assert!(catalog.trackers().iter().all(|s| s.peak >= 10.0));
    }

    #[test]
    fn test_trackers_clamped_to_catalog_size() {
        let catalog = Catalog::build("f0", vec![source(0.0, 0.0, 1.0)]).with_trackers(10);
        assert_eq!(catalog.trackers().len(), 1);

        let empty = Catalog::build("f1", Vec::new()).with_trackers(10);
        assert!(empty.is_empty());
        assert!(empty.trackers().is_empty());
        assert!(empty.brightest().is_none());
    }
}
