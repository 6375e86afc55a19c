use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::frame::FrameError;
use crate::stack::StackError;
use crate::state::{PipelineEvent, PipelineState};

/// Why a non-reference frame was left out of the stack.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameFailure {
    /// Detection errored or found nothing above threshold.
    #[error("source detection failed: {detail}")]
    SourceDetection { detail: String },

    /// No consensus translation against the reference catalog.
    #[error("alignment failed: {detail}")]
    Alignment { detail: String },

    /// Frame size differs from the reference.
    #[error("frame is {found:?} but the reference is {expected:?} (rows, cols)")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Skipped because the run was cancelled first.
    #[error("cancelled before processing")]
    Cancelled,
}

/// Errors that end a stacking run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The skip/nframes window selected nothing.
    #[error("no frames to stack: {available} supplied, skip = {skip}")]
    NoFrames { available: usize, skip: usize },

    #[error("frame {frame} has not been calibrated")]
    Uncalibrated { frame: String },

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The reference frame produced no usable catalog.
    #[error("reference frame {frame}: {reason}")]
    ReferenceDetection { frame: String, reason: String },

    /// A frame failed under [`FailurePolicy::Abort`](crate::config::FailurePolicy::Abort).
    #[error("aborted at frame {frame_index} ({filename}): {reason}")]
    Aborted {
        frame_index: usize,
        filename: String,
        reason: FrameFailure,
    },

    #[error("stack error: {0}")]
    Stack(#[from] StackError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid state transition from {from:?} on {event:?}")]
    InvalidTransition {
        from: PipelineState,
        event: PipelineEvent,
    },
}
