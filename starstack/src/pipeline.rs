//! Star-registered stacking of a frame sequence.
//!
//! The first frame of the window is the reference: its catalog is fixed for
//! the run and it is stacked unshifted. Every other frame is detected, matched
//! against the reference catalog and resampled onto the reference grid in
//! parallel. Results are then replayed in frame order through the state
//! machine and into the [`Stack`], so the report is deterministic regardless
//! of scheduling.
//!
//! With [`StackConfig::align`] off no catalog is built and every frame is
//! stacked as-is.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;

use crate::catalog::Catalog;
use crate::config::{FailurePolicy, StackConfig};
use crate::error::{FrameFailure, PipelineError};
use crate::frame::Frame;
use crate::image_proc::detection::{detect, DetectionError};
use crate::image_proc::resample;
use crate::matcher::{match_catalogs, Offset};
use crate::report::{Exclusion, OffsetLogEntry, StackReport};
use crate::stack::Stack;
use crate::state::{PipelineEvent, PipelineState};

/// Shared flag that stops frames from being started once set.
///
/// Frames already being aligned finish; frames not yet started are excluded
/// with [`FrameFailure::Cancelled`]. Only the caller sets it: the pipeline
/// never cancels on its own, so a token can be reused across runs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A frame resampled onto the reference grid.
#[derive(Debug, Clone)]
pub struct AlignedFrame {
    pub data: Array2<f64>,
    pub offset: Offset,
    /// Sources detected on the frame before alignment
    pub sources: usize,
}

/// Composites and diagnostics from a completed run.
#[derive(Debug, Clone)]
pub struct StackOutput {
    pub mean: Array2<f64>,
    pub median: Array2<f64>,
    pub report: StackReport,
}

struct FrameOutcome<'a> {
    frame: &'a Frame,
    result: Result<AlignedFrame, FrameFailure>,
}

/// Detect sources on `frame` and restrict the catalog to the configured trackers.
pub fn build_catalog(frame: &Frame, config: &StackConfig) -> Result<Catalog, DetectionError> {
    Ok(detect(frame, &config.detection_params())?.with_trackers(config.num_trackers))
}

/// Detect, match and resample one frame onto the reference grid.
pub fn align_frame(
    frame: &Frame,
    reference: &Catalog,
    reference_dim: (usize, usize),
    config: &StackConfig,
) -> Result<AlignedFrame, FrameFailure> {
    if frame.dim() != reference_dim {
        return Err(FrameFailure::DimensionMismatch {
            expected: reference_dim,
            found: frame.dim(),
        });
    }

    let catalog = build_catalog(frame, config).map_err(|e| FrameFailure::SourceDetection {
        detail: e.to_string(),
    })?;
    if catalog.is_empty() {
        return Err(FrameFailure::SourceDetection {
            detail: "no sources above threshold".to_string(),
        });
    }

    let offset = match_catalogs(reference, &catalog, &config.match_params())
        .map_err(|e| FrameFailure::Alignment { detail: e.to_string() })?;

    let data = resample(&frame.data(), -offset.dx, -offset.dy, config.edge_policy);

    Ok(AlignedFrame {
        data,
        offset,
        sources: catalog.len(),
    })
}

/// Pass `frame` through unshifted, for runs without registration.
fn unshifted_frame(frame: &Frame, reference_dim: (usize, usize)) -> Result<AlignedFrame, FrameFailure> {
    if frame.dim() != reference_dim {
        return Err(FrameFailure::DimensionMismatch {
            expected: reference_dim,
            found: frame.dim(),
        });
    }
    Ok(AlignedFrame {
        data: frame.data().to_owned(),
        offset: Offset {
            dx: 0.0,
            dy: 0.0,
            votes: 0,
            pairs: 0,
            mean_residual: None,
        },
        sources: 0,
    })
}

/// Select the `skip`/`nframes` window, check calibration and trim borders.
fn select_window(frames: &[Frame], config: &StackConfig) -> Result<Vec<Frame>, PipelineError> {
    let start = config.skip.min(frames.len());
    let end = config.skip.saturating_add(config.nframes).min(frames.len());

    if start == end {
        return Err(PipelineError::NoFrames {
            available: frames.len(),
            skip: config.skip,
        });
    }
    if end - start < config.nframes {
        log::warn!(
            "Requested {} frames after skipping {}, only {} available",
            config.nframes,
            config.skip,
            end - start
        );
    }

    let window = &frames[start..end];
    if let Some(raw) = window.iter().find(|f| !f.is_calibrated()) {
        return Err(PipelineError::Uncalibrated {
            frame: raw.id().to_string(),
        });
    }

    window
        .iter()
        .map(|f| f.trimmed(config.border).map_err(PipelineError::from))
        .collect()
}

/// Stacking pipeline for one configuration.
#[derive(Debug)]
pub struct StackPipeline {
    config: StackConfig,
    state: PipelineState,
    cancel: CancellationToken,
}

impl StackPipeline {
    pub fn new(config: StackConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            state: PipelineState::Idle,
            cancel: CancellationToken::new(),
        })
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn apply(&mut self, event: PipelineEvent) -> Result<(), PipelineError> {
        let next = self.state.next(event).ok_or(PipelineError::InvalidTransition {
            from: self.state,
            event,
        })?;
        log::debug!("Pipeline {:?} -> {:?} on {:?}", self.state, next, event);
        self.state = next;
        Ok(())
    }

    /// Align and stack `frames`.
    ///
    /// Any error leaves the pipeline in [`PipelineState::Failed`].
    pub fn run(&mut self, frames: &[Frame]) -> Result<StackOutput, PipelineError> {
        self.state = PipelineState::Idle;
        let result = self.run_window(frames);
        if result.is_err() {
            self.state = PipelineState::Failed;
        }
        result
    }

    fn run_window(&mut self, frames: &[Frame]) -> Result<StackOutput, PipelineError> {
        let window = select_window(frames, &self.config)?;
        let Some((reference_frame, rest)) = window.split_first() else {
            return Err(PipelineError::NoFrames {
                available: frames.len(),
                skip: self.config.skip,
            });
        };

        log::info!(
            "Stacking {} frames (skip {}, border {}), reference {}",
            window.len(),
            self.config.skip,
            self.config.border,
            reference_frame.id()
        );

        self.apply(PipelineEvent::Start)?;
        let reference = if self.config.align {
            match build_catalog(reference_frame, &self.config) {
                Ok(catalog) if !catalog.is_empty() => Some(catalog),
                outcome => {
                    let reason = match outcome {
                        Err(e) => e.to_string(),
                        Ok(_) => "no sources above threshold".to_string(),
                    };
                    log::warn!("Reference frame {} unusable: {reason}", reference_frame.id());
                    self.apply(PipelineEvent::ReferenceFailed)?;
                    return Err(PipelineError::ReferenceDetection {
                        frame: reference_frame.id().to_string(),
                        reason,
                    });
                }
            }
        } else {
            None
        };

        let (height, width) = reference_frame.dim();
        let mut stack = Stack::new(width, height);
        stack.accumulate(reference_frame.data().to_owned())?;
        self.apply(PipelineEvent::ReferenceBuilt)?;
        match &reference {
            Some(catalog) => log::info!(
                "Reference catalog for {}: {} sources, {} trackers",
                catalog.frame_id(),
                catalog.len(),
                catalog.trackers().len()
            ),
            None => log::info!("Registration disabled, stacking frames unshifted"),
        }

        let outcomes = self.align_all(reference.as_ref(), (height, width), rest)?;

        let mut offsets = Vec::new();
        let mut exclusions = Vec::new();

        for outcome in outcomes {
            let frame_index = outcome.frame.index();
            let filename = outcome.frame.id().to_string();
            self.apply(PipelineEvent::FrameStarted(frame_index))?;

            match outcome.result {
                Ok(aligned) => {
                    stack.accumulate(aligned.data)?;
                    if reference.is_some() {
                        log::info!(
                            "Frame {frame_index} ({filename}): offset ({:+.3}, {:+.3}) px, {} votes, {} sources",
                            aligned.offset.dx,
                            aligned.offset.dy,
                            aligned.offset.votes,
                            aligned.sources
                        );
                        offsets.push(OffsetLogEntry {
                            frame_index,
                            filename,
                            dx: aligned.offset.dx,
                            dy: aligned.offset.dy,
                            votes: aligned.offset.votes,
                        });
                    } else {
                        log::debug!("Frame {frame_index} ({filename}) stacked unshifted");
                    }
                    self.apply(PipelineEvent::FrameAccumulated(frame_index))?;
                }
                Err(reason) => {
                    let aborting =
                        self.config.on_frame_failure == FailurePolicy::Abort && reason != FrameFailure::Cancelled;
                    if aborting {
                        log::error!("Aborting at frame {frame_index} ({filename}): {reason}");
                        self.apply(PipelineEvent::Abort)?;
                        return Err(PipelineError::Aborted {
                            frame_index,
                            filename,
                            reason,
                        });
                    }

                    log::warn!("Excluding frame {frame_index} ({filename}): {reason}");
                    exclusions.push(Exclusion {
                        frame_index,
                        filename,
                        reason,
                    });
                    self.apply(PipelineEvent::FrameExcluded(frame_index))?;
                }
            }
        }

        self.apply(PipelineEvent::Finalize)?;
        let images = stack.finalize()?;
        self.apply(PipelineEvent::Finalized)?;

        let cancelled = exclusions.iter().any(|e| e.reason == FrameFailure::Cancelled);
        let report = StackReport {
            requested: window.len(),
            succeeded: images.frames,
            reference: reference_frame.id().to_string(),
            reference_sources: reference.as_ref().map_or(0, Catalog::len),
            offsets,
            exclusions,
            cancelled,
        };

        log::info!(
            "Stacked {} of {} frames ({} excluded{})",
            report.succeeded,
            report.requested,
            report.exclusions.len(),
            if cancelled { ", cancelled" } else { "" }
        );

        Ok(StackOutput {
            mean: images.mean,
            median: images.median,
            report,
        })
    }

    fn align_all<'f>(
        &self,
        reference: Option<&Catalog>,
        reference_dim: (usize, usize),
        frames: &'f [Frame],
    ) -> Result<Vec<FrameOutcome<'f>>, PipelineError> {
        // Position of the earliest frame that has failed so far under Abort.
        // Later frames are skipped; earlier ones still run, so the failure
        // reported is always the first in frame order.
        let first_failure = AtomicUsize::new(usize::MAX);
        let work = || {
            frames
                .par_iter()
                .enumerate()
                .map(|(position, frame)| FrameOutcome {
                    frame,
                    result: self.align_one(reference, reference_dim, (position, frame), &first_failure),
                })
                .collect::<Vec<_>>()
        };

        match self.config.max_threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
                Ok(pool.install(work))
            }
            None => Ok(work()),
        }
    }

    fn align_one(
        &self,
        reference: Option<&Catalog>,
        reference_dim: (usize, usize),
        (position, frame): (usize, &Frame),
        first_failure: &AtomicUsize,
    ) -> Result<AlignedFrame, FrameFailure> {
        let abort = self.config.on_frame_failure == FailurePolicy::Abort;
        if self.cancel.is_cancelled() || (abort && position > first_failure.load(Ordering::SeqCst)) {
            return Err(FrameFailure::Cancelled);
        }

        let result = match reference {
            Some(catalog) => align_frame(frame, catalog, reference_dim, &self.config),
            None => unshifted_frame(frame, reference_dim),
        };
        if result.is_err() && abort {
            first_failure.fetch_min(position, Ordering::SeqCst);
        }
        result
    }
}
