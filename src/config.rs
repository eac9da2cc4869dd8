//! Tracking front-end configuration.
//!
//! A `VoConfig` is built once at startup (usually `VoConfig::default()` with a
//! few overrides) and handed to `VoPipeline::new`, which validates it and
//! passes each component its own section.

use serde::{Deserialize, Serialize};

use crate::error::TrackingError;

/// Parameters forwarded to the keypoint detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Number of keypoints the detector should extract.
    pub keypoints_to_extract: usize,
    /// Scale step between pyramid levels.
    pub scale_factor: f64,
    /// Number of pyramid levels.
    pub level_pyramid: u32,
    /// FAST corner threshold.
    pub score_threshold: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            keypoints_to_extract: 5000,
            scale_factor: 1.2,
            level_pyramid: 4,
            score_threshold: 15,
        }
    }
}

/// Spatial non-max suppression over a regular grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridFilterConfig {
    /// Scan stops once more than this many keypoints are kept.
    pub max_keypoints_after_filter: usize,
    /// Cell side length in pixels.
    pub grid_cell_size: usize,
    pub max_points_per_cell: usize,
}

impl Default for GridFilterConfig {
    fn default() -> Self {
        Self {
            max_keypoints_after_filter: 1000,
            grid_cell_size: 8,
            max_points_per_cell: 2,
        }
    }
}

/// Descriptor matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MatchMethod {
    /// Nearest neighbour, accepted below `max(min_distance * match_ratio, 30)`.
    GlobalThreshold,
    /// Two nearest neighbours, Lowe's ratio test.
    RatioTest,
}

impl TryFrom<u8> for MatchMethod {
    type Error = TrackingError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(Self::GlobalThreshold),
            2 => Ok(Self::RatioTest),
            other => Err(TrackingError::UnknownMatchMethod(other)),
        }
    }
}

impl From<MatchMethod> for u8 {
    fn from(method: MatchMethod) -> Self {
        match method {
            MatchMethod::GlobalThreshold => 1,
            MatchMethod::RatioTest => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub match_method: MatchMethod,
    /// Multiplier on the minimum distance (global threshold method).
    pub match_ratio: f64,
    /// Nearest / second nearest ratio (ratio test method).
    pub lowe_ratio: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_method: MatchMethod::RatioTest,
            match_ratio: 2.0,
            lowe_ratio: 0.6,
        }
    }
}

/// Two-view initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Frame id from which initialization is forced regardless of parallax.
    pub bootstrap_frame_count: u64,
    /// Mean inlier keypoint displacement (pixels) required to initialize.
    pub bootstrap_min_displacement_px: f64,
    /// Length units per metre; the initial cloud is scaled to a mean depth
    /// of one metre.
    pub monocular_scale_unit: f64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            bootstrap_frame_count: 14,
            bootstrap_min_displacement_px: 50.0,
            monocular_scale_unit: 100.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoConfig {
    pub detector: DetectorConfig,
    pub grid: GridFilterConfig,
    pub matcher: MatcherConfig,
    pub bootstrap: BootstrapConfig,
}

impl VoConfig {
    pub fn validate(&self) -> Result<(), TrackingError> {
        let invalid = |msg: &str| Err(TrackingError::InvalidConfig(msg.to_string()));

        if self.detector.keypoints_to_extract == 0 {
            return invalid("keypoints_to_extract must be positive");
        }
        if !(self.detector.scale_factor > 1.0) {
            return invalid("scale_factor must be greater than 1");
        }
        if self.detector.level_pyramid == 0 {
            return invalid("level_pyramid must be positive");
        }
        if self.grid.grid_cell_size == 0 {
            return invalid("grid_cell_size must be positive");
        }
        if self.grid.max_points_per_cell == 0 {
            return invalid("max_points_per_cell must be positive");
        }
        if !(self.matcher.match_ratio > 0.0) {
            return invalid("match_ratio must be positive");
        }
        if !(self.matcher.lowe_ratio > 0.0 && self.matcher.lowe_ratio < 1.0) {
            return invalid("lowe_ratio must lie in (0, 1)");
        }
        if !(self.bootstrap.bootstrap_min_displacement_px >= 0.0) {
            return invalid("bootstrap_min_displacement_px must be non-negative");
        }
        let unit = self.bootstrap.monocular_scale_unit;
        if !(unit > 0.0 && unit.is_finite()) {
            return invalid("monocular_scale_unit must be positive");
        }
        Ok(())
    }
}
