//! Run diagnostics: per-frame offsets, exclusions and summary counts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FrameFailure;

/// Offset applied to one accepted frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetLogEntry {
    pub frame_index: usize,
    pub filename: String,
    pub dx: f64,
    pub dy: f64,
    pub votes: usize,
}

/// A frame left out of the stack and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub frame_index: usize,
    pub filename: String,
    pub reason: FrameFailure,
}

/// Diagnostic report for one stacking run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackReport {
    /// Frames in the stacking window, reference included
    pub requested: usize,
    /// Frames combined into the composites, reference included
    pub succeeded: usize,
    /// Identifier of the reference frame
    pub reference: String,
    /// Sources in the reference catalog
    pub reference_sources: usize,
    pub offsets: Vec<OffsetLogEntry>,
    pub exclusions: Vec<Exclusion>,
    /// Whether the run was cancelled before every frame was processed
    pub cancelled: bool,
}

impl StackReport {
    /// Non-reference frames that reached an outcome, accepted or excluded.
    pub fn processed(&self) -> usize {
        self.succeeded.saturating_sub(1) + self.exclusions.len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Generate a human-readable markdown summary of the run.
    pub fn generate_human_report(&self) -> String {
        let mut report = String::new();

        report.push_str("# Stacking Report\n\n");
        report.push_str(&format!(
            "Stacked {} of {} frames against reference `{}` ({} sources).\n\n",
            self.succeeded, self.requested, self.reference, self.reference_sources
        ));
        if self.cancelled {
            report.push_str("**Run was cancelled; the composites are partial.**\n\n");
        }

        report.push_str("## Offsets\n\n");
        if self.offsets.is_empty() {
            report.push_str("No frames were aligned besides the reference.\n\n");
        } else {
            report.push_str("| Frame | File | dx (px) | dy (px) | Votes |\n");
            report.push_str("|-------|------|---------|---------|-------|\n");
            for entry in &self.offsets {
                report.push_str(&format!(
                    "| {} | {} | {:+.3} | {:+.3} | {} |\n",
                    entry.frame_index, entry.filename, entry.dx, entry.dy, entry.votes
                ));
            }
            report.push('\n');
        }

        report.push_str("## Exclusions\n\n");
        if self.exclusions.is_empty() {
            report.push_str("None.\n");
        } else {
            for exclusion in &self.exclusions {
                report.push_str(&format!(
                    "- frame {} (`{}`): {}\n",
                    exclusion.frame_index, exclusion.filename, exclusion.reason
                ));
            }
        }

        report
    }
}
