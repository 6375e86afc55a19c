use serde::{Deserialize, Serialize};

/// Stacking pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// Nothing has run yet
    Idle,
    /// Detecting sources on the reference frame
    BuildingReference,
    /// Reference catalog fixed, waiting for the next frame
    Ready,
    /// Aligning the frame at this sequence index
    ProcessingFrame { index: usize },
    /// Frame at this sequence index has been added to the stack
    Accumulated { index: usize },
    /// Computing the composites
    Finalizing,
    /// Composites and report produced
    Done,
    /// Run ended by a fatal error
    Failed,
}

/// Events that drive [`PipelineState`] transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    Start,
    ReferenceBuilt,
    ReferenceFailed,
    FrameStarted(usize),
    FrameAccumulated(usize),
    FrameExcluded(usize),
    Finalize,
    Finalized,
    Abort,
}

impl PipelineState {
    /// State reached by applying `event`, or `None` if the transition is not allowed.
    pub fn next(&self, event: PipelineEvent) -> Option<PipelineState> {
        use PipelineEvent as E;
        use PipelineState::*;

        match (*self, event) {
            (Idle, E::Start) => Some(BuildingReference),

            (BuildingReference, E::ReferenceBuilt) => Some(Ready),
            (BuildingReference, E::ReferenceFailed) => Some(Failed),

            (Ready | Accumulated { .. }, E::FrameStarted(index)) => Some(ProcessingFrame { index }),
            (ProcessingFrame { index }, E::FrameAccumulated(done)) if done == index => {
                Some(Accumulated { index })
            }
            (ProcessingFrame { index }, E::FrameExcluded(skipped)) if skipped == index => Some(Ready),

            (Ready | Accumulated { .. }, E::Finalize) => Some(Finalizing),
            (Finalizing, E::Finalized) => Some(Done),

            (Done | Failed, E::Abort) => None,
            (_, E::Abort) => Some(Failed),

            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}
