//! Keypoints, binary descriptors and the detector capability.

use anyhow::Result;
use image::GrayImage;
use nalgebra::Point2;

use crate::config::DetectorConfig;

/// Number of bytes in an ORB descriptor (256 bits).
pub const DESCRIPTOR_BYTES: usize = 32;

/// A detected image feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Pixel position (x = column, y = row).
    pub pt: Point2<f64>,
}

impl Keypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            pt: Point2::new(x, y),
        }
    }
}

/// Binary feature descriptor, compared by Hamming distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u8; DESCRIPTOR_BYTES]);

impl Descriptor {
    /// Number of differing bits.
    pub fn distance(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Keypoints with their index-aligned descriptors.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Keypoint detection and description, provided by the caller.
///
/// `detect` is expected to return keypoints ranked best first; the grid filter
/// keeps that order when it drops crowded keypoints.
pub trait FeatureDetector {
    fn detect(&mut self, image: &GrayImage, config: &DetectorConfig) -> Result<Vec<Keypoint>>;

    /// Compute descriptors for `keypoints`.
    ///
    /// Implementations may drop keypoints they cannot describe (e.g. near the
    /// image border) but must return the surviving keypoints index-aligned
    /// with their descriptors.
    fn describe(
        &mut self,
        image: &GrayImage,
        keypoints: Vec<Keypoint>,
        config: &DetectorConfig,
    ) -> Result<FeatureSet>;
}
