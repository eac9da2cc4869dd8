//! Two-view and PnP geometry, consumed through the `GeometrySolver` trait.
//!
//! The tracker only decides which estimate to request and how to compose the
//! results. Robust estimation (essential / homography RANSAC, PnP-RANSAC) and
//! triangulation are provided by the caller.

use anyhow::Result;
use nalgebra::{Point2, Vector3};

use crate::geometry::SE3;
use crate::tracking::frame::{CameraModel, Keypoint};
use crate::tracking::matching::FeatureMatch;

/// Model a relative pose candidate was recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Essential,
    Homography,
}

/// One decomposition of an essential or homography matrix.
#[derive(Debug, Clone)]
pub struct RelativePoseCandidate {
    pub kind: CandidateKind,
    /// T_cur_ref: maps reference-camera points into the current camera.
    pub pose: SE3,
    /// Matches consistent with the model, a subset of the input matches.
    pub inlier_matches: Vec<FeatureMatch>,
    /// Plane normal for homography decompositions.
    pub plane_normal: Option<Vector3<f64>>,
    /// Triangulated inliers in the reference camera frame, index-aligned
    /// with `inlier_matches`. Translation is only known up to scale.
    pub points_ref: Vec<Vector3<f64>>,
}

/// Quality of a candidate, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateError {
    /// Mean epipolar constraint residual of the inliers.
    pub epipolar: f64,
    /// Mean reprojection error of the triangulated inliers on the
    /// normalized image plane.
    pub triangulation: f64,
}

pub trait GeometrySolver {
    /// Estimate relative pose candidates between the reference and current
    /// keypoints with a robust estimator.
    ///
    /// The essential-matrix candidate must be present in the output when
    /// estimation succeeds; homography candidates are only requested when
    /// `compute_homography` is set.
    fn estimate_relative_poses(
        &mut self,
        ref_keypoints: &[Keypoint],
        cur_keypoints: &[Keypoint],
        matches: &[FeatureMatch],
        camera: &CameraModel,
        compute_homography: bool,
    ) -> Result<Vec<RelativePoseCandidate>>;

    /// Errors per candidate, in the order of `candidates`.
    fn evaluate_candidates(
        &mut self,
        ref_keypoints: &[Keypoint],
        cur_keypoints: &[Keypoint],
        candidates: &[RelativePoseCandidate],
        camera: &CameraModel,
    ) -> Result<Vec<CandidateError>>;

    /// Robust PnP: pose T_cam_obj of the camera observing `points3d` at
    /// pixel positions `points2d`.
    fn solve_pnp(
        &mut self,
        points3d: &[Vector3<f64>],
        points2d: &[Point2<f64>],
        camera: &CameraModel,
    ) -> Result<SE3>;

    /// Triangulate `matches` given the relative pose T_cur_ref.
    ///
    /// Returns points in the current camera frame, index-aligned with
    /// `matches`.
    fn triangulate(
        &mut self,
        ref_keypoints: &[Keypoint],
        cur_keypoints: &[Keypoint],
        matches: &[FeatureMatch],
        pose: &SE3,
        camera: &CameraModel,
    ) -> Result<Vec<Vector3<f64>>>;
}
