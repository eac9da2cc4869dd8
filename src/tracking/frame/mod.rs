//! Frame-level data: camera model, features, and the per-image `Frame`.

pub mod camera;
pub mod features;

use std::fmt;

use anyhow::{Result, ensure};
use image::GrayImage;
use nalgebra::Vector3;

use crate::config::DetectorConfig;
use crate::geometry::SE3;
use crate::tracking::grid::GridKeypointFilter;
use crate::tracking::matching::{FeatureMatch, FeatureMatcher, MatchResult};

pub use camera::CameraModel;
pub use features::{DESCRIPTOR_BYTES, Descriptor, FeatureDetector, FeatureSet, Keypoint};

/// Ingestion index of an image, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl FrameId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// One ingested image and everything the tracker learned about it.
///
/// `matches` and `inlier_matches` are expressed against the reference the
/// frame was tracked from: `query_idx` indexes the reference keypoints,
/// `train_idx` this frame's keypoints. `inlier_points` is index-aligned with
/// `inlier_matches` and holds camera-frame coordinates in this frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
    pub matches: Vec<FeatureMatch>,
    pub inlier_matches: Vec<FeatureMatch>,
    /// T_w_c.
    pub world_pose: SE3,
    /// T_cur_ref: maps reference-camera points into this camera.
    pub relative_pose: SE3,
    pub inlier_points: Vec<Vector3<f64>>,
}

impl Frame {
    pub fn new(id: FrameId, features: FeatureSet) -> Result<Self> {
        ensure!(
            features.keypoints.len() == features.descriptors.len(),
            "{}: {} keypoints but {} descriptors",
            id,
            features.keypoints.len(),
            features.descriptors.len()
        );
        Ok(Self {
            id,
            keypoints: features.keypoints,
            descriptors: features.descriptors,
            matches: Vec::new(),
            inlier_matches: Vec::new(),
            world_pose: SE3::identity(),
            relative_pose: SE3::identity(),
            inlier_points: Vec::new(),
        })
    }

    /// Detect, spatially filter and describe keypoints in `image`.
    pub fn extract<D: FeatureDetector>(
        id: FrameId,
        image: &GrayImage,
        detector: &mut D,
        detector_config: &DetectorConfig,
        grid_filter: &GridKeypointFilter,
    ) -> Result<Self> {
        let raw = detector.detect(image, detector_config)?;
        let selected = grid_filter.select(&raw, image.height() as usize, image.width() as usize);
        let features = detector.describe(image, selected, detector_config)?;
        Self::new(id, features)
    }

    /// Match `reference_descriptors` (query) against this frame (train) and
    /// store the result in `matches`.
    pub fn match_features(
        &mut self,
        reference_descriptors: &[Descriptor],
        matcher: &FeatureMatcher,
    ) -> MatchResult {
        let result = matcher.match_descriptors(reference_descriptors, &self.descriptors);
        self.matches = result.matches.clone();
        result
    }

    pub fn num_features(&self) -> usize {
        self.keypoints.len()
    }

    /// Camera centre in world coordinates.
    pub fn camera_center(&self) -> Vector3<f64> {
        self.world_pose.translation
    }

    /// Copy the pose of `source`, used when this frame adds no information.
    pub(crate) fn hold_pose_of(&mut self, source: &Frame, relative_pose: SE3) {
        self.world_pose = source.world_pose.clone();
        self.relative_pose = relative_pose;
    }
}
