//! Tracking results and diagnostics structures.
//!
//! These types describe what happened during processing of a single frame:
//! - high level tracking state and what the frame was used for
//! - correspondence counts along the pipeline
//! - timing information for profiling

use std::sync::Arc;

use crate::error::TrackingError;
use crate::geometry::SE3;
use crate::tracking::TrackingState;
use crate::tracking::frame::Frame;

/// What a frame contributed to the trajectory.
#[derive(Debug)]
pub enum FrameOutcome {
    /// First frame: identity pose, kept as the initialization reference.
    Initialized,
    /// Not enough parallax yet; pose copied from the initialization frame.
    AwaitingParallax { mean_displacement_px: f64 },
    /// Two-view initialization succeeded with this frame.
    /// `mean_depth_m` is the mean inlier depth after scale normalization.
    Bootstrapped { mean_depth_m: f64 },
    /// Pose estimated against the previous reference.
    Tracked,
    /// Frame dropped, pose carried over from the reference.
    Skipped(TrackingError),
}

impl FrameOutcome {
    /// True if the frame received a newly estimated pose.
    pub fn has_new_pose(&self) -> bool {
        matches!(self, Self::Bootstrapped { .. } | Self::Tracked)
    }
}

/// Summary of tracking for a single frame.
#[derive(Debug)]
pub struct TrackingResult {
    /// State after processing the frame.
    pub state: TrackingState,
    pub frame: Arc<Frame>,
    pub outcome: FrameOutcome,
    pub metrics: TrackingMetrics,
    pub timing: TimingStats,
}

impl TrackingResult {
    /// T_w_c of the processed frame.
    pub fn pose(&self) -> &SE3 {
        &self.frame.world_pose
    }
}

/// Scalar metrics useful for debugging tracking quality.
#[derive(Debug, Clone, Default)]
pub struct TrackingMetrics {
    pub n_keypoints: usize,
    pub n_matches: usize,
    pub n_inliers: usize,
    /// 3-D to 2-D pairs handed to PnP.
    pub n_correspondences: usize,
    /// Size of the compact reference matched against.
    pub n_reference_keypoints: usize,
    pub mean_displacement_px: Option<f64>,
}

/// Timing breakdown for a frame.
#[derive(Debug, Clone, Default)]
pub struct TimingStats {
    pub total_ms: f64,
    pub extract_ms: f64,
    pub match_ms: f64,
    pub solve_ms: f64,
}
