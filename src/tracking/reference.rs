//! Reference data for steady-state tracking.

use std::collections::HashMap;

use nalgebra::{Point2, Vector3};

use crate::geometry::SE3;
use crate::tracking::frame::{Descriptor, Frame, FrameId, Keypoint};
use crate::tracking::matching::FeatureMatch;

/// The previous frame reduced to its triangulated inliers.
///
/// Entry `i` holds the keypoint and descriptor of the frame's `i`-th inlier
/// match together with its 3-D point, so a match against the compact
/// descriptors indexes the 3-D points directly. `matches` and
/// `inlier_matches` are the frame's inlier matches with `train_idx`
/// rewritten to `i`.
///
/// Built as a new value; the source `Frame` is left untouched.
#[derive(Debug, Clone)]
pub struct CompactReference {
    pub frame_id: FrameId,
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
    pub matches: Vec<FeatureMatch>,
    pub inlier_matches: Vec<FeatureMatch>,
    /// Camera-frame points of the reference, index-aligned with the above.
    pub points: Vec<Vector3<f64>>,
    /// T_w_c of the reference.
    pub world_pose: SE3,
}

impl CompactReference {
    pub fn from_frame(frame: &Frame) -> Self {
        let n = frame.inlier_matches.len();
        let mut keypoints = Vec::with_capacity(n);
        let mut descriptors = Vec::with_capacity(n);
        let mut inlier_matches = Vec::with_capacity(n);

        for (i, m) in frame.inlier_matches.iter().enumerate() {
            keypoints.push(frame.keypoints[m.train_idx]);
            descriptors.push(frame.descriptors[m.train_idx]);
            inlier_matches.push(FeatureMatch {
                train_idx: i,
                ..*m
            });
        }

        Self {
            frame_id: frame.id,
            keypoints,
            descriptors,
            matches: inlier_matches.clone(),
            inlier_matches,
            points: frame.inlier_points.clone(),
            world_pose: frame.world_pose.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// 3-D reference points paired with their 2-D observations in the current
/// frame.
#[derive(Debug, Clone, Default)]
pub struct Correspondences {
    pub points3d: Vec<Vector3<f64>>,
    pub points2d: Vec<Point2<f64>>,
}

impl Correspondences {
    pub fn len(&self) -> usize {
        self.points3d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points3d.is_empty()
    }
}

/// Intersect the current inlier matches with the reference's triangulated
/// inliers.
///
/// A current match whose `query_idx` equals the `train_idx` of the `j`-th
/// reference inlier observes `ref_points[j]`.
pub fn find_3d_2d_correspondences(
    cur_inliers: &[FeatureMatch],
    cur_keypoints: &[Keypoint],
    ref_inliers: &[FeatureMatch],
    ref_points: &[Vector3<f64>],
) -> Correspondences {
    let point_of: HashMap<usize, usize> = ref_inliers
        .iter()
        .enumerate()
        .filter(|(j, _)| *j < ref_points.len())
        .map(|(j, m)| (m.train_idx, j))
        .collect();

    let mut out = Correspondences::default();
    for m in cur_inliers {
        if let Some(&j) = point_of.get(&m.query_idx) {
            out.points3d.push(ref_points[j]);
            out.points2d.push(cur_keypoints[m.train_idx].pt);
        }
    }
    out
}
