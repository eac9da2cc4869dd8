//! Deterministic stand-ins for the detector and geometry solver.

use std::collections::VecDeque;

use anyhow::{Result, anyhow, bail};
use image::GrayImage;
use nalgebra::{Point2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::DetectorConfig;
use crate::geometry::{CandidateError, CandidateKind, GeometrySolver, RelativePoseCandidate, SE3};
use crate::tracking::frame::{
    CameraModel, DESCRIPTOR_BYTES, Descriptor, FeatureDetector, FeatureSet, Keypoint,
};
use crate::tracking::matching::FeatureMatch;

pub fn random_descriptors(n: usize, seed: u64) -> Vec<Descriptor> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let mut bytes = [0u8; DESCRIPTOR_BYTES];
            rng.fill(&mut bytes[..]);
            Descriptor(bytes)
        })
        .collect()
}

pub fn features_at(positions: &[(f64, f64)], seed: u64) -> FeatureSet {
    FeatureSet {
        keypoints: positions.iter().map(|&(x, y)| Keypoint::new(x, y)).collect(),
        descriptors: random_descriptors(positions.len(), seed),
    }
}

/// Same descriptors, keypoints moved by `(dx, dy)`.
pub fn shifted(features: &FeatureSet, dx: f64, dy: f64) -> FeatureSet {
    FeatureSet {
        keypoints: features
            .keypoints
            .iter()
            .map(|kp| Keypoint::new(kp.pt.x + dx, kp.pt.y + dy))
            .collect(),
        descriptors: features.descriptors.clone(),
    }
}

/// Replays one feature set per image, ignoring pixel content.
pub struct ScriptedDetector {
    frames: VecDeque<FeatureSet>,
    current: Option<FeatureSet>,
}

impl ScriptedDetector {
    pub fn new(frames: Vec<FeatureSet>) -> Self {
        Self {
            frames: frames.into(),
            current: None,
        }
    }
}

impl FeatureDetector for ScriptedDetector {
    fn detect(&mut self, _image: &GrayImage, _config: &DetectorConfig) -> Result<Vec<Keypoint>> {
        let features = self
            .frames
            .pop_front()
            .ok_or_else(|| anyhow!("script exhausted"))?;
        let keypoints = features.keypoints.clone();
        self.current = Some(features);
        Ok(keypoints)
    }

    fn describe(
        &mut self,
        _image: &GrayImage,
        keypoints: Vec<Keypoint>,
        _config: &DetectorConfig,
    ) -> Result<FeatureSet> {
        let current = self
            .current
            .take()
            .ok_or_else(|| anyhow!("describe called before detect"))?;
        let descriptors = keypoints
            .iter()
            .map(|kp| {
                current
                    .keypoints
                    .iter()
                    .position(|k| k == kp)
                    .map(|i| current.descriptors[i])
                    .ok_or_else(|| anyhow!("keypoint {:?} was not detected", kp.pt))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FeatureSet {
            keypoints,
            descriptors,
        })
    }
}

/// Solver returning fixed poses and points at a fixed depth.
#[derive(Debug, Clone)]
pub struct StubSolver {
    /// T_cur_ref reported by the essential candidate.
    pub essential_pose: SE3,
    /// T_cur_ref returned by PnP.
    pub pnp_pose: SE3,
    /// Depth given to every unprojected point.
    pub depth: f64,
    /// The last `outliers` input matches are rejected by the estimator.
    pub outliers: usize,
    /// 0-based `estimate_relative_poses` calls that fail.
    pub failing_estimates: Vec<usize>,
    /// Report only the homography candidate.
    pub omit_essential: bool,
    /// Append an inlier whose `train_idx` is past the current keypoints.
    pub stray_inlier: bool,
    pub fail_pnp: bool,
    /// Points dropped from the end of each triangulation.
    pub missing_points: usize,
    pub calls: Vec<&'static str>,
    estimate_calls: usize,
}

impl StubSolver {
    pub fn new(essential_pose: SE3, pnp_pose: SE3, depth: f64) -> Self {
        Self {
            essential_pose,
            pnp_pose,
            depth,
            outliers: 0,
            failing_estimates: Vec::new(),
            omit_essential: false,
            stray_inlier: false,
            fail_pnp: false,
            missing_points: 0,
            calls: Vec::new(),
            estimate_calls: 0,
        }
    }
}

impl GeometrySolver for StubSolver {
    fn estimate_relative_poses(
        &mut self,
        ref_keypoints: &[Keypoint],
        cur_keypoints: &[Keypoint],
        matches: &[FeatureMatch],
        camera: &CameraModel,
        compute_homography: bool,
    ) -> Result<Vec<RelativePoseCandidate>> {
        self.calls.push("estimate");
        let call = self.estimate_calls;
        self.estimate_calls += 1;
        if self.failing_estimates.contains(&call) {
            bail!("RANSAC found no consistent model");
        }

        let n_keep = matches.len().saturating_sub(self.outliers);
        let mut inlier_matches = matches[..n_keep].to_vec();
        let mut points_ref: Vec<Vector3<f64>> = inlier_matches
            .iter()
            .map(|m| camera.unproject(&ref_keypoints[m.query_idx].pt, self.depth))
            .collect();
        if self.stray_inlier {
            inlier_matches.push(FeatureMatch::new(0, cur_keypoints.len(), 0.0));
            points_ref.push(Vector3::new(0.0, 0.0, self.depth));
        }

        let mut candidates = Vec::new();
        if !self.omit_essential {
            candidates.push(RelativePoseCandidate {
                kind: CandidateKind::Essential,
                pose: self.essential_pose.clone(),
                inlier_matches: inlier_matches.clone(),
                plane_normal: None,
                points_ref: points_ref.clone(),
            });
        }
        if compute_homography {
            candidates.push(RelativePoseCandidate {
                kind: CandidateKind::Homography,
                pose: self.essential_pose.clone(),
                inlier_matches,
                plane_normal: Some(Vector3::z()),
                points_ref,
            });
        }
        Ok(candidates)
    }

    fn evaluate_candidates(
        &mut self,
        _ref_keypoints: &[Keypoint],
        _cur_keypoints: &[Keypoint],
        candidates: &[RelativePoseCandidate],
        _camera: &CameraModel,
    ) -> Result<Vec<CandidateError>> {
        self.calls.push("evaluate");
        Ok(candidates
            .iter()
            .map(|_| CandidateError {
                epipolar: 0.0,
                triangulation: 0.0,
            })
            .collect())
    }

    fn solve_pnp(
        &mut self,
        points3d: &[Vector3<f64>],
        _points2d: &[Point2<f64>],
        _camera: &CameraModel,
    ) -> Result<SE3> {
        self.calls.push("pnp");
        if self.fail_pnp {
            bail!("PnP RANSAC did not converge");
        }
        if points3d.len() < 4 {
            bail!("PnP needs 4 points, got {}", points3d.len());
        }
        Ok(self.pnp_pose.clone())
    }

    fn triangulate(
        &mut self,
        _ref_keypoints: &[Keypoint],
        cur_keypoints: &[Keypoint],
        matches: &[FeatureMatch],
        _pose: &SE3,
        camera: &CameraModel,
    ) -> Result<Vec<Vector3<f64>>> {
        self.calls.push("triangulate");
        let n_points = matches.len().saturating_sub(self.missing_points);
        Ok(matches[..n_points]
            .iter()
            .map(|m| camera.unproject(&cur_keypoints[m.train_idx].pt, self.depth))
            .collect())
    }
}
