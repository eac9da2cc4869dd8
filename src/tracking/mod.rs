//! Tracking: turns images into camera poses.
//!
//! - Frame extraction (detection, grid selection, description)
//! - Descriptor matching against the current reference
//! - Two-view initialization with monocular scale normalization
//! - Frame-to-frame tracking by PnP on the reference's triangulated inliers

pub mod frame;
pub mod grid;
pub mod matching;
pub mod reference;
pub mod result;
pub mod state;
pub mod tracker;

pub use state::TrackingState;
pub use tracker::VoPipeline;
