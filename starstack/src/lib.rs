//! Star-registered alignment and stacking of astronomical exposures.
//!
//! Calibrated frames of one sky region are registered to the first frame of
//! the window using detected point sources, resampled onto its pixel grid and
//! combined into mean and median composites.
//!
//! - **frame**: calibrated input exposures
//! - **image_proc**: source detection, centroiding and resampling
//! - **catalog**: brightness-ranked sources with a tracker subset
//! - **matcher**: translation consensus between two catalogs
//! - **stack**: mean and median accumulation
//! - **pipeline**: the run orchestrator and its state machine
//! - **report**: per-run diagnostics

pub mod catalog;
pub mod config;
pub mod error;
pub mod frame;
pub mod image_proc;
pub mod matcher;
pub mod pipeline;
pub mod report;
pub mod stack;
pub mod state;
pub mod test_util;

pub use catalog::{Catalog, Source};
pub use config::{ConfigError, EdgePolicy, FailurePolicy, StackConfig};
pub use error::{FrameFailure, PipelineError};
pub use frame::{Frame, FrameError};
pub use matcher::{match_catalogs, MatchError, MatchParams, Offset};
pub use pipeline::{align_frame, build_catalog, AlignedFrame, CancellationToken, StackOutput, StackPipeline};
pub use report::{Exclusion, OffsetLogEntry, StackReport};
pub use stack::{Stack, StackError, StackImages};
pub use state::{PipelineEvent, PipelineState};
