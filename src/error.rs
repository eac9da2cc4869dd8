//! Error types for the tracking front-end.

use std::fmt;

use thiserror::Error;

use crate::tracking::frame::FrameId;

/// Step of `VoPipeline::add_frame` an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Matching,
    RelativePoseEstimation,
    ScaleNormalization,
    Correspondences,
    PnP,
    Triangulation,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Matching => "matching",
            Self::RelativePoseEstimation => "relative pose estimation",
            Self::ScaleNormalization => "scale normalization",
            Self::Correspondences => "3d-2d correspondences",
            Self::PnP => "pnp",
            Self::Triangulation => "triangulation",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("unknown feature match method: {0} (expected 1 = global threshold, 2 = ratio test)")]
    UnknownMatchMethod(u8),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Not enough geometry to go on; the frame is skipped.
    #[error("{frame_id}: degenerate geometry at {stage}: {reason}")]
    Degenerate {
        frame_id: FrameId,
        stage: PipelineStage,
        reason: String,
    },

    /// An external solver could not produce a model; the frame is skipped.
    #[error("{frame_id}: solver failed at {stage}: {source}")]
    SolverFailure {
        frame_id: FrameId,
        stage: PipelineStage,
        #[source]
        source: anyhow::Error,
    },
}

impl TrackingError {
    pub(crate) fn degenerate(
        frame_id: FrameId,
        stage: PipelineStage,
        reason: impl Into<String>,
    ) -> Self {
        Self::Degenerate {
            frame_id,
            stage,
            reason: reason.into(),
        }
    }

    pub(crate) fn solver(frame_id: FrameId, stage: PipelineStage, source: anyhow::Error) -> Self {
        Self::SolverFailure {
            frame_id,
            stage,
            source,
        }
    }

    /// Stage of a per-frame error, `None` for configuration errors.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Degenerate { stage, .. } | Self::SolverFailure { stage, .. } => Some(*stage),
            Self::UnknownMatchMethod(_) | Self::InvalidConfig(_) => None,
        }
    }

    /// True for errors that only cost the current frame.
    pub fn is_recoverable(&self) -> bool {
        self.stage().is_some()
    }
}
