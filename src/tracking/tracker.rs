//! Main tracker: turns a stream of images into one camera pose per image.
//!
//! - The first image becomes the initialization reference (identity pose).
//! - Following images are matched against it until the mean keypoint
//!   displacement shows enough parallax (or a frame count forces it); the
//!   essential-matrix pose is then scale-normalized and the triangulated
//!   inliers seed tracking.
//! - In steady state each image is matched against the previous frame's
//!   inliers, posed by PnP on their 3-D points, and triangulated to become
//!   the next reference.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow};
use image::GrayImage;
use tracing::{debug, info, warn};

use crate::config::VoConfig;
use crate::error::{PipelineStage, TrackingError};
use crate::geometry::{CandidateKind, GeometrySolver, RelativePoseCandidate, SE3};
use crate::tracking::TrackingState;
use crate::tracking::frame::{CameraModel, FeatureDetector, Frame, FrameId, Keypoint};
use crate::tracking::grid::GridKeypointFilter;
use crate::tracking::matching::{FeatureMatch, FeatureMatcher, mean_keypoint_displacement};
use crate::tracking::reference::{CompactReference, find_3d_2d_correspondences};
use crate::tracking::result::{FrameOutcome, TimingStats, TrackingMetrics, TrackingResult};

/// Minimum matches handed to the essential-matrix estimator (five-point
/// minimal set).
const MIN_MATCHES_FOR_ESSENTIAL: usize = 5;

/// Minimum 3-D to 2-D correspondences for PnP.
const MIN_PNP_CORRESPONDENCES: usize = 4;

/// Internal state, carrying the reference each phase matches against.
enum PipelineState {
    Blank,
    Bootstrapping(Arc<Frame>),
    Tracking(Arc<Frame>),
}

impl PipelineState {
    fn public(&self) -> TrackingState {
        match self {
            Self::Blank => TrackingState::Blank,
            Self::Bootstrapping(_) => TrackingState::Initialization,
            Self::Tracking(_) => TrackingState::Tracking,
        }
    }
}

/// Result of one state transition.
struct Transition {
    next: PipelineState,
    frame: Arc<Frame>,
    outcome: FrameOutcome,
}

enum BootstrapStep {
    NeedsParallax { mean_displacement_px: f64 },
    Initialized { mean_depth_m: f64 },
}

/// Monocular visual odometry front-end.
pub struct VoPipeline<D, S> {
    config: VoConfig,
    camera: CameraModel,
    detector: D,
    solver: S,
    grid_filter: GridKeypointFilter,
    matcher: FeatureMatcher,
    state: PipelineState,
    frame_count: u64,
    /// World pose (T_w_c) of every ingested frame.
    trajectory: Vec<SE3>,
}

impl<D: FeatureDetector, S: GeometrySolver> VoPipeline<D, S> {
    pub fn new(
        config: VoConfig,
        camera: CameraModel,
        detector: D,
        solver: S,
    ) -> std::result::Result<Self, TrackingError> {
        config.validate()?;
        Ok(Self {
            grid_filter: GridKeypointFilter::new(config.grid.clone()),
            matcher: FeatureMatcher::new(config.matcher.clone()),
            config,
            camera,
            detector,
            solver,
            state: PipelineState::Blank,
            frame_count: 0,
            trajectory: Vec::new(),
        })
    }

    pub fn state(&self) -> TrackingState {
        self.state.public()
    }

    pub fn config(&self) -> &VoConfig {
        &self.config
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn trajectory(&self) -> &[SE3] {
        &self.trajectory
    }

    /// Frame the next image will be matched against.
    pub fn reference(&self) -> Option<&Arc<Frame>> {
        match &self.state {
            PipelineState::Blank => None,
            PipelineState::Bootstrapping(frame) | PipelineState::Tracking(frame) => Some(frame),
        }
    }

    /// Process the next image of the sequence.
    ///
    /// Errors only come from the feature detector. Geometric failures skip
    /// the frame and are reported through `FrameOutcome::Skipped`.
    pub fn add_frame(&mut self, image: &GrayImage) -> Result<TrackingResult> {
        let t_start = Instant::now();
        let id = FrameId::new(self.frame_count);
        let frame = Frame::extract(
            id,
            image,
            &mut self.detector,
            &self.config.detector,
            &self.grid_filter,
        )?;
        self.frame_count += 1;

        let mut timing = TimingStats {
            extract_ms: elapsed_ms(t_start),
            ..Default::default()
        };
        let mut metrics = TrackingMetrics {
            n_keypoints: frame.num_features(),
            ..Default::default()
        };
        debug!(frame_id = %id, n_keypoints = metrics.n_keypoints, "extracted features");

        let state = std::mem::replace(&mut self.state, PipelineState::Blank);
        let transition = match state {
            PipelineState::Blank => Self::start(frame),
            PipelineState::Bootstrapping(init) => {
                self.bootstrap(init, frame, &mut metrics, &mut timing)
            }
            PipelineState::Tracking(reference) => {
                self.track(reference, frame, &mut metrics, &mut timing)
            }
        };

        self.state = transition.next;
        self.trajectory.push(transition.frame.world_pose.clone());
        timing.total_ms = elapsed_ms(t_start);

        Ok(TrackingResult {
            state: self.state.public(),
            frame: transition.frame,
            outcome: transition.outcome,
            metrics,
            timing,
        })
    }

    /// Blank -> Initialization.
    fn start(mut frame: Frame) -> Transition {
        frame.world_pose = SE3::identity();
        frame.relative_pose = SE3::identity();
        let frame = Arc::new(frame);
        debug!(frame_id = %frame.id, "initialization reference set");
        Transition {
            next: PipelineState::Bootstrapping(frame.clone()),
            frame,
            outcome: FrameOutcome::Initialized,
        }
    }

    /// Initialization -> Initialization | Tracking.
    fn bootstrap(
        &mut self,
        init: Arc<Frame>,
        mut frame: Frame,
        metrics: &mut TrackingMetrics,
        timing: &mut TimingStats,
    ) -> Transition {
        let step = self.try_bootstrap(&init, &mut frame, metrics, timing);

        let outcome = match step {
            Ok(BootstrapStep::Initialized { mean_depth_m }) => {
                info!(
                    frame_id = %frame.id,
                    init_frame_id = %init.id,
                    n_inliers = frame.inlier_matches.len(),
                    "initialization succeeded, tracking"
                );
                let frame = Arc::new(frame);
                return Transition {
                    next: PipelineState::Tracking(frame.clone()),
                    frame,
                    outcome: FrameOutcome::Bootstrapped { mean_depth_m },
                };
            }
            Ok(BootstrapStep::NeedsParallax { mean_displacement_px }) => {
                debug!(
                    frame_id = %frame.id,
                    mean_displacement_px,
                    "not enough parallax, frame skipped"
                );
                FrameOutcome::AwaitingParallax { mean_displacement_px }
            }
            Err(err) => {
                warn!(
                    frame_id = %frame.id,
                    stage = ?err.stage(),
                    "initialization frame skipped: {}",
                    err
                );
                FrameOutcome::Skipped(err)
            }
        };

        frame.hold_pose_of(&init, init.relative_pose.clone());
        Transition {
            next: PipelineState::Bootstrapping(init),
            frame: Arc::new(frame),
            outcome,
        }
    }

    fn try_bootstrap(
        &mut self,
        init: &Frame,
        frame: &mut Frame,
        metrics: &mut TrackingMetrics,
        timing: &mut TimingStats,
    ) -> std::result::Result<BootstrapStep, TrackingError> {
        let id = frame.id;

        let t_match = Instant::now();
        frame.match_features(&init.descriptors, &self.matcher);
        timing.match_ms = elapsed_ms(t_match);
        metrics.n_matches = frame.matches.len();
        ensure_min(
            id,
            PipelineStage::Matching,
            "matches",
            frame.matches.len(),
            MIN_MATCHES_FOR_ESSENTIAL,
        )?;

        let t_solve = Instant::now();
        let candidates = self
            .solver
            .estimate_relative_poses(
                &init.keypoints,
                &frame.keypoints,
                &frame.matches,
                &self.camera,
                true,
            )
            .map_err(|e| TrackingError::solver(id, PipelineStage::RelativePoseEstimation, e))?;
        self.log_candidate_errors(id, &init.keypoints, &frame.keypoints, &candidates);

        // Essential matrix solution; homographies are only evaluated.
        let essential = take_essential(id, candidates)?;
        metrics.n_inliers = essential.inlier_matches.len();
        ensure_min(
            id,
            PipelineStage::RelativePoseEstimation,
            "inliers",
            essential.inlier_matches.len(),
            1,
        )?;
        check_match_indices(
            id,
            &essential.inlier_matches,
            init.keypoints.len(),
            frame.keypoints.len(),
        )?;
        if essential.points_ref.len() != essential.inlier_matches.len() {
            return Err(TrackingError::degenerate(
                id,
                PipelineStage::RelativePoseEstimation,
                format!(
                    "{} triangulated points for {} inliers",
                    essential.points_ref.len(),
                    essential.inlier_matches.len()
                ),
            ));
        }

        let mean_displacement_px = mean_keypoint_displacement(
            &init.keypoints,
            &frame.keypoints,
            &essential.inlier_matches,
        );
        metrics.mean_displacement_px = Some(mean_displacement_px);

        let enough_parallax =
            mean_displacement_px > self.config.bootstrap.bootstrap_min_displacement_px;
        let forced = id.0 >= self.config.bootstrap.bootstrap_frame_count;
        if !enough_parallax && !forced {
            timing.solve_ms = elapsed_ms(t_solve);
            return Ok(BootstrapStep::NeedsParallax { mean_displacement_px });
        }
        if !enough_parallax {
            info!(frame_id = %id, mean_displacement_px, "initialization forced by frame count");
        }

        // Fix the monocular scale: mean inlier depth becomes one metre,
        // expressed in `monocular_scale_unit` units.
        let RelativePoseCandidate {
            pose: mut relative,
            inlier_matches,
            points_ref,
            ..
        } = essential;
        let mut points: Vec<_> = points_ref
            .iter()
            .map(|p| relative.transform_point(p))
            .collect();
        let mean_depth = points.iter().map(|p| p.z).sum::<f64>() / points.len() as f64;
        let unit = self.config.bootstrap.monocular_scale_unit;
        let scale = mean_depth / unit;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(TrackingError::degenerate(
                id,
                PipelineStage::ScaleNormalization,
                format!("mean inlier depth {mean_depth}"),
            ));
        }
        relative.translation /= scale;
        for p in points.iter_mut() {
            *p /= scale;
        }
        let mean_depth_m = points.iter().map(|p| p.z).sum::<f64>() / points.len() as f64 / unit;

        frame.world_pose = init.world_pose.compose(&relative.inverse());
        frame.relative_pose = relative;
        frame.inlier_matches = inlier_matches;
        frame.inlier_points = points;
        timing.solve_ms = elapsed_ms(t_solve);

        Ok(BootstrapStep::Initialized { mean_depth_m })
    }

    /// Tracking -> Tracking.
    fn track(
        &mut self,
        reference: Arc<Frame>,
        mut frame: Frame,
        metrics: &mut TrackingMetrics,
        timing: &mut TimingStats,
    ) -> Transition {
        let compact = CompactReference::from_frame(&reference);
        metrics.n_reference_keypoints = compact.len();

        match self.try_track(&compact, &mut frame, metrics, timing) {
            Ok(()) => {
                debug!(
                    frame_id = %frame.id,
                    reference_id = %compact.frame_id,
                    n_inliers = frame.inlier_matches.len(),
                    n_correspondences = metrics.n_correspondences,
                    "tracked frame"
                );
                let frame = Arc::new(frame);
                Transition {
                    next: PipelineState::Tracking(frame.clone()),
                    frame,
                    outcome: FrameOutcome::Tracked,
                }
            }
            Err(err) => {
                warn!(
                    frame_id = %frame.id,
                    reference_id = %compact.frame_id,
                    stage = ?err.stage(),
                    "frame skipped, pose held: {}",
                    err
                );
                frame.hold_pose_of(&reference, SE3::identity());
                Transition {
                    next: PipelineState::Tracking(reference),
                    frame: Arc::new(frame),
                    outcome: FrameOutcome::Skipped(err),
                }
            }
        }
    }

    fn try_track(
        &mut self,
        reference: &CompactReference,
        frame: &mut Frame,
        metrics: &mut TrackingMetrics,
        timing: &mut TimingStats,
    ) -> std::result::Result<(), TrackingError> {
        let id = frame.id;

        let t_match = Instant::now();
        frame.match_features(&reference.descriptors, &self.matcher);
        timing.match_ms = elapsed_ms(t_match);
        metrics.n_matches = frame.matches.len();
        ensure_min(
            id,
            PipelineStage::Matching,
            "matches",
            frame.matches.len(),
            MIN_MATCHES_FOR_ESSENTIAL,
        )?;

        // The essential matrix only serves as an outlier filter here.
        let t_solve = Instant::now();
        let candidates = self
            .solver
            .estimate_relative_poses(
                &reference.keypoints,
                &frame.keypoints,
                &frame.matches,
                &self.camera,
                false,
            )
            .map_err(|e| TrackingError::solver(id, PipelineStage::RelativePoseEstimation, e))?;
        let inlier_matches = take_essential(id, candidates)?.inlier_matches;
        metrics.n_inliers = inlier_matches.len();
        ensure_min(
            id,
            PipelineStage::RelativePoseEstimation,
            "inliers",
            inlier_matches.len(),
            1,
        )?;
        check_match_indices(
            id,
            &inlier_matches,
            reference.keypoints.len(),
            frame.keypoints.len(),
        )?;

        let correspondences = find_3d_2d_correspondences(
            &inlier_matches,
            &frame.keypoints,
            &reference.inlier_matches,
            &reference.points,
        );
        metrics.n_correspondences = correspondences.len();
        ensure_min(
            id,
            PipelineStage::Correspondences,
            "3d-2d correspondences",
            correspondences.len(),
            MIN_PNP_CORRESPONDENCES,
        )?;

        let relative = self
            .solver
            .solve_pnp(&correspondences.points3d, &correspondences.points2d, &self.camera)
            .map_err(|e| TrackingError::solver(id, PipelineStage::PnP, e))?;

        let points = self
            .solver
            .triangulate(
                &reference.keypoints,
                &frame.keypoints,
                &inlier_matches,
                &relative,
                &self.camera,
            )
            .map_err(|e| TrackingError::solver(id, PipelineStage::Triangulation, e))?;
        if points.len() != inlier_matches.len() {
            return Err(TrackingError::degenerate(
                id,
                PipelineStage::Triangulation,
                format!("{} points for {} inliers", points.len(), inlier_matches.len()),
            ));
        }
        timing.solve_ms = elapsed_ms(t_solve);

        frame.world_pose = reference.world_pose.compose(&relative.inverse());
        frame.relative_pose = relative;
        frame.inlier_matches = inlier_matches;
        frame.inlier_points = points;
        Ok(())
    }

    fn log_candidate_errors(
        &mut self,
        id: FrameId,
        ref_keypoints: &[Keypoint],
        cur_keypoints: &[Keypoint],
        candidates: &[RelativePoseCandidate],
    ) {
        match self
            .solver
            .evaluate_candidates(ref_keypoints, cur_keypoints, candidates, &self.camera)
        {
            Ok(errors) => {
                for (candidate, error) in candidates.iter().zip(errors.iter()) {
                    debug!(
                        frame_id = %id,
                        kind = ?candidate.kind,
                        n_inliers = candidate.inlier_matches.len(),
                        epipolar_error = error.epipolar,
                        triangulation_error = error.triangulation,
                        "relative pose candidate"
                    );
                }
            }
            Err(e) => warn!(frame_id = %id, "candidate evaluation failed: {:#}", e),
        }
    }
}

fn take_essential(
    id: FrameId,
    candidates: Vec<RelativePoseCandidate>,
) -> std::result::Result<RelativePoseCandidate, TrackingError> {
    candidates
        .into_iter()
        .find(|c| c.kind == CandidateKind::Essential)
        .ok_or_else(|| {
            TrackingError::solver(
                id,
                PipelineStage::RelativePoseEstimation,
                anyhow!("no essential-matrix candidate"),
            )
        })
}

fn ensure_min(
    id: FrameId,
    stage: PipelineStage,
    what: &str,
    found: usize,
    required: usize,
) -> std::result::Result<(), TrackingError> {
    if found < required {
        return Err(TrackingError::degenerate(
            id,
            stage,
            format!("{found} {what}, need {required}"),
        ));
    }
    Ok(())
}

/// Inliers must index the keypoint sets they were estimated from.
fn check_match_indices(
    id: FrameId,
    matches: &[FeatureMatch],
    n_query: usize,
    n_train: usize,
) -> std::result::Result<(), TrackingError> {
    match matches
        .iter()
        .find(|m| m.query_idx >= n_query || m.train_idx >= n_train)
    {
        Some(m) => Err(TrackingError::degenerate(
            id,
            PipelineStage::RelativePoseEstimation,
            format!(
                "inlier ({}, {}) outside {} reference / {} current keypoints",
                m.query_idx, m.train_idx, n_query, n_train
            ),
        )),
        None => Ok(()),
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
