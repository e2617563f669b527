//! Frame-to-frame motion estimation and consistency correction.
//!
//! Every light in a frame pair shares the platform's motion. Observations whose
//! own displacement disagrees with the consensus (the element-wise median) are
//! treated as detector noise or mismatches and moved onto the consensus.

use nalgebra as na;
use serde_derive::Serialize;

use crate::config::ValidatorConfig;
use crate::math::median_vector;
use crate::observation::LightObservation;

/// Criteria for pairing an observation with one from the previous frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchCriteria {
    pub max_distance: f32,
    pub max_brightness_diff: f32,
    pub same_class: bool,
}

/// A current observation (by index) paired with its previous-frame neighbour
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPair {
    pub current: usize,
    pub previous: usize,
    pub motion: na::Vector2<f32>,
}

/// Pairs each current observation with its nearest compatible predecessor.
/// Unpaired observations are left out.
pub fn match_nearest(
    current: &[LightObservation],
    previous: &[LightObservation],
    criteria: &MatchCriteria,
) -> Vec<MatchedPair> {
    current
        .iter()
        .enumerate()
        .filter_map(|(ci, cur)| {
            previous
                .iter()
                .enumerate()
                .filter(|(_, prev)| {
                    (cur.brightness - prev.brightness).abs() <= criteria.max_brightness_diff
                        && (!criteria.same_class || cur.class == prev.class)
                })
                .map(|(pi, prev)| (pi, cur.distance(prev)))
                .filter(|&(_, dist)| dist < criteria.max_distance)
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(pi, _)| MatchedPair {
                    current: ci,
                    previous: pi,
                    motion: cur.position() - previous[pi].position(),
                })
        })
        .collect()
}

/// Median displacement between two frames, `None` when either frame or the
/// set of matched pairs is smaller than `min_pairs`
pub fn estimate_motion(
    current: &[LightObservation],
    previous: &[LightObservation],
    criteria: &MatchCriteria,
    min_pairs: usize,
) -> Option<na::Vector2<f32>> {
    if current.len() < min_pairs || previous.len() < min_pairs {
        return None;
    }

    let pairs = match_nearest(current, previous, criteria);
    if pairs.len() < min_pairs || pairs.is_empty() {
        return None;
    }

    let motions: Vec<_> = pairs.iter().map(|p| p.motion).collect();
    median_vector(&motions)
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CorrectionResult {
    pub total_observations: usize,
    pub outliers_detected: usize,
    pub outliers_corrected: usize,
    pub median_motion: (f32, f32),
    pub max_deviation: f32,
    pub corrected_ids: Vec<u32>,
}

impl CorrectionResult {
    fn skipped(total_observations: usize) -> Self {
        Self {
            total_observations,
            outliers_detected: 0,
            outliers_corrected: 0,
            median_motion: (0.0, 0.0),
            max_deviation: 0.0,
            corrected_ids: Vec::new(),
        }
    }
}

/// Cumulative diagnostics over a video
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ValidatorStats {
    pub validations: u64,
    pub corrections: u64,
    pub peak_deviation: f32,
}

#[derive(Debug, Clone)]
pub struct MotionValidator {
    config: ValidatorConfig,
    stats: ValidatorStats,
}

impl MotionValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            stats: ValidatorStats::default(),
        }
    }

    #[inline]
    pub fn stats(&self) -> &ValidatorStats {
        &self.stats
    }

    #[inline]
    pub fn criteria(&self) -> MatchCriteria {
        MatchCriteria {
            max_distance: self.config.match_distance,
            max_brightness_diff: self.config.max_brightness_diff,
            same_class: true,
        }
    }

    /// Validates `current` against `previous`, moving outliers onto the
    /// consensus motion in place
    pub fn validate(
        &mut self,
        current: &mut [LightObservation],
        previous: &[LightObservation],
    ) -> CorrectionResult {
        let min = self.config.min_observations;
        let total = current.len();

        if total < min || previous.len() < min {
            return CorrectionResult::skipped(total);
        }

        let pairs = match_nearest(current, previous, &self.criteria());
        if pairs.len() < min {
            return CorrectionResult::skipped(total);
        }

        let motions: Vec<_> = pairs.iter().map(|p| p.motion).collect();
        let median = match median_vector(&motions) {
            Some(m) => m,
            None => return CorrectionResult::skipped(total),
        };

        self.stats.validations += 1;

        let mut result = CorrectionResult::skipped(total);
        result.median_motion = (median.x, median.y);

        let magnitude = median.norm();
        if magnitude < self.config.stationary_threshold {
            return result;
        }

        let mut outliers = Vec::new();
        for pair in &pairs {
            let deviation = (pair.motion - median).norm() / magnitude;
            result.max_deviation = result.max_deviation.max(deviation);

            if deviation > self.config.variance_threshold {
                outliers.push(*pair);
            }
        }

        result.outliers_detected = outliers.len();
        self.stats.peak_deviation = self.stats.peak_deviation.max(result.max_deviation);

        if outliers.len() as f32 > pairs.len() as f32 * self.config.max_outlier_ratio {
            log::debug!(
                "frame {}: {}/{} motion outliers, leaving positions as measured",
                current.first().map_or(0, |o| o.frame),
                outliers.len(),
                pairs.len()
            );
            return result;
        }

        for pair in outliers {
            let corrected = previous[pair.previous].position() + median;
            let obs = &mut current[pair.current];

            log::trace!(
                "frame {} light {}: ({:.1}, {:.1}) -> ({:.1}, {:.1})",
                obs.frame,
                obs.id,
                obs.x(),
                obs.y(),
                corrected.x,
                corrected.y
            );

            obs.set_position(corrected);
            result.corrected_ids.push(obs.id);
        }

        result.outliers_corrected = result.corrected_ids.len();
        self.stats.corrections += result.outliers_corrected as u64;

        result
    }
}

impl Default for MotionValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}
