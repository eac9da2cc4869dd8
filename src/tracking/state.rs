//! Tracker state as seen by callers.

/// State of the visual odometry pipeline.
///
/// `Blank` -> `Initialization` on the first frame, `Initialization` ->
/// `Tracking` once two-view initialization succeeds. `Tracking` has no exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    /// No frame seen yet.
    #[default]
    Blank,
    /// Waiting for enough parallax against the first frame.
    Initialization,
    /// Chaining poses frame to frame.
    Tracking,
}
