//! Descriptor matching between a reference frame and the current frame.

use nalgebra::distance;
use tracing::debug;

use crate::config::{MatchMethod, MatcherConfig};
use crate::tracking::frame::{Descriptor, Keypoint};

/// Lower bound on the global-threshold acceptance distance.
pub const MIN_DISTANCE_THRESHOLD: f32 = 30.0;

/// A correspondence between two descriptor sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    /// Index into the reference (query) keypoints.
    pub query_idx: usize,
    /// Index into the current (train) keypoints.
    pub train_idx: usize,
    pub distance: f32,
}

impl FeatureMatch {
    pub fn new(query_idx: usize, train_idx: usize, distance: f32) -> Self {
        Self {
            query_idx,
            train_idx,
            distance,
        }
    }
}

/// Accepted matches plus statistics for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// De-duplicated matches sorted by `train_idx`.
    pub matches: Vec<FeatureMatch>,
    /// Smallest first-neighbour distance seen, `None` without candidates.
    pub min_distance: Option<f32>,
    pub max_distance: Option<f32>,
    /// Acceptance distance used by the global threshold method.
    pub distance_threshold: Option<f32>,
}

pub struct FeatureMatcher {
    config: MatcherConfig,
}

impl FeatureMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match every `query` descriptor against `train`.
    pub fn match_descriptors(&self, query: &[Descriptor], train: &[Descriptor]) -> MatchResult {
        let mut result = match self.config.match_method {
            MatchMethod::GlobalThreshold => self.match_global_threshold(query, train),
            MatchMethod::RatioTest => self.match_ratio_test(query, train),
        };
        remove_duplicated_matches(&mut result.matches);

        debug!(
            method = ?self.config.match_method,
            threshold = ?result.distance_threshold,
            min_dist = ?result.min_distance,
            max_dist = ?result.max_distance,
            n_matches = result.matches.len(),
            "matched features"
        );
        result
    }

    fn match_global_threshold(&self, query: &[Descriptor], train: &[Descriptor]) -> MatchResult {
        let all_matches: Vec<FeatureMatch> = query
            .iter()
            .enumerate()
            .filter_map(|(query_idx, desc)| {
                let (nearest, _) = two_nearest(desc, train);
                nearest.map(|(train_idx, dist)| {
                    FeatureMatch::new(query_idx, train_idx, dist as f32)
                })
            })
            .collect();

        let (min_distance, max_distance) = distance_range(all_matches.iter().map(|m| m.distance));
        let Some(min_dist) = min_distance else {
            return MatchResult::default();
        };

        let threshold = (min_dist * self.config.match_ratio as f32).max(MIN_DISTANCE_THRESHOLD);
        let matches = all_matches
            .into_iter()
            .filter(|m| m.distance < threshold)
            .collect();

        MatchResult {
            matches,
            min_distance,
            max_distance,
            distance_threshold: Some(threshold),
        }
    }

    fn match_ratio_test(&self, query: &[Descriptor], train: &[Descriptor]) -> MatchResult {
        let ratio = self.config.lowe_ratio as f32;
        let mut matches = Vec::new();
        let mut first_distances = Vec::with_capacity(query.len());

        for (query_idx, desc) in query.iter().enumerate() {
            let (nearest, second) = two_nearest(desc, train);
            let Some((train_idx, best)) = nearest else {
                continue;
            };
            first_distances.push(best as f32);

            // Without a second neighbour the ratio cannot be checked.
            if let Some((_, second_best)) = second {
                if (best as f32) < ratio * second_best as f32 {
                    matches.push(FeatureMatch::new(query_idx, train_idx, best as f32));
                }
            }
        }

        let (min_distance, max_distance) = distance_range(first_distances.into_iter());
        MatchResult {
            matches,
            min_distance,
            max_distance,
            distance_threshold: None,
        }
    }
}

/// Brute-force search for the two nearest `train` descriptors.
fn two_nearest(
    desc: &Descriptor,
    train: &[Descriptor],
) -> (Option<(usize, u32)>, Option<(usize, u32)>) {
    let mut best: Option<(usize, u32)> = None;
    let mut second: Option<(usize, u32)> = None;

    for (idx, other) in train.iter().enumerate() {
        let dist = desc.distance(other);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {
                if second.map_or(true, |(_, second_dist)| dist < second_dist) {
                    second = Some((idx, dist));
                }
            }
            _ => {
                second = best;
                best = Some((idx, dist));
            }
        }
    }

    (best, second)
}

fn distance_range(distances: impl Iterator<Item = f32>) -> (Option<f32>, Option<f32>) {
    distances.fold((None, None), |(min, max), d| {
        (
            Some(min.map_or(d, |m: f32| m.min(d))),
            Some(max.map_or(d, |m: f32| m.max(d))),
        )
    })
}

/// Keep one match per `train_idx`, the one with the smallest distance.
///
/// The result is sorted by `train_idx`. Exact distance ties keep the match
/// that came first in the input.
pub fn remove_duplicated_matches(matches: &mut Vec<FeatureMatch>) {
    matches.sort_by(|a, b| {
        a.train_idx
            .cmp(&b.train_idx)
            .then(a.distance.total_cmp(&b.distance))
    });
    matches.dedup_by_key(|m| m.train_idx);
}

/// Mean pixel distance between matched keypoints, 0.0 for no matches.
pub fn mean_keypoint_displacement(
    query_keypoints: &[Keypoint],
    train_keypoints: &[Keypoint],
    matches: &[FeatureMatch],
) -> f64 {
    if matches.is_empty() {
        return 0.0;
    }
    let total: f64 = matches
        .iter()
        .map(|m| distance(&query_keypoints[m.query_idx].pt, &train_keypoints[m.train_idx].pt))
        .sum();
    total / matches.len() as f64
}
