use std::collections::BTreeMap;

use nalgebra as na;
use serde_derive::Serialize;

use crate::config::TrackerConfig;
use crate::motion::{estimate_motion, CorrectionResult, MatchCriteria, MotionValidator, ValidatorStats};
use crate::observation::{LightObservation, ObservationKey};
use crate::track::Track;

/// Where one observation of the last update ended up
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub key: ObservationKey,
    pub track_id: u32,
    pub spawned: bool,
}

/// Greedy weighted nearest-neighbor tracker.
///
/// Frames must be fed in order. Tracks are never removed: once a track goes
/// longer than `max_frame_gap` without an observation it is no longer
/// matched but stays in the collection for reporting.
pub struct Tracker {
    config: TrackerConfig,
    validator: MotionValidator,
    tracks: BTreeMap<u32, Track>,
    next_id: u32,
    previous: Vec<LightObservation>,
    global_motion: Option<na::Vector2<f32>>,
    last_correction: Option<CorrectionResult>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            validator: MotionValidator::new(config.validator.clone()),
            config,
            tracks: BTreeMap::new(),
            next_id: 1,
            previous: Vec::new(),
            global_motion: None,
            last_correction: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn update(&mut self, mut observations: Vec<LightObservation>) -> Vec<Assignment> {
        let frame = match observations.first() {
            Some(obs) => obs.frame,
            None => return Vec::new(),
        };

        self.last_correction = Some(self.validator.validate(&mut observations, &self.previous));
        self.global_motion = estimate_motion(
            &observations,
            &self.previous,
            &self.global_criteria(),
            self.config.min_global_motion_pairs,
        );

        let mut order: Vec<(u32, usize)> = self
            .tracks
            .values()
            .filter(|t| t.is_active_at(frame, self.config.max_frame_gap))
            .map(|t| (t.id, t.len()))
            .collect();

        // longer tracks pick first, ties by age
        order.sort_by(|a, b| b.1.cmp(&a.1));

        let mut pool: Vec<Option<LightObservation>> = observations.iter().cloned().map(Some).collect();
        let mut assignments = Vec::with_capacity(pool.len());

        for (track_id, _) in order {
            let best = match self.tracks.get(&track_id) {
                Some(track) => self.best_candidate(track, frame, &pool),
                None => None,
            };

            let (idx, score) = match best {
                Some(best) => best,
                None => continue,
            };

            if score >= self.config.match_threshold {
                continue;
            }

            if let (Some(obs), Some(track)) = (pool[idx].take(), self.tracks.get_mut(&track_id)) {
                assignments.push(Assignment {
                    key: obs.key(),
                    track_id,
                    spawned: false,
                });
                track.push(obs);
            }
        }

        for obs in pool.into_iter().flatten() {
            let id = self.next_id;
            self.next_id += 1;

            log::trace!(
                "frame {}: new track {} at ({:.1}, {:.1}) {}",
                frame,
                id,
                obs.x(),
                obs.y(),
                obs.class.as_str()
            );

            assignments.push(Assignment {
                key: obs.key(),
                track_id: id,
                spawned: true,
            });
            self.tracks.insert(id, Track::new(id, obs));
        }

        self.previous = observations;

        assignments
    }

    fn global_criteria(&self) -> MatchCriteria {
        MatchCriteria {
            max_distance: self.config.global_motion_distance,
            ..self.validator.criteria()
        }
    }

    fn best_candidate(
        &self,
        track: &Track,
        frame: u32,
        pool: &[Option<LightObservation>],
    ) -> Option<(usize, f32)> {
        let gap = track.frame_gap(frame);
        let predicted = track.predict(frame, self.config.velocity_window, self.global_motion);

        pool.iter()
            .enumerate()
            .filter_map(|(idx, obs)| Some((idx, obs.as_ref()?)))
            .filter(|(_, obs)| self.is_compatible(track, obs))
            .map(|(idx, obs)| (idx, self.score(track, obs, predicted, gap)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    #[inline]
    fn is_compatible(&self, track: &Track, obs: &LightObservation) -> bool {
        !self.config.strict_class || obs.class == track.class
    }

    /// Matching cost of `obs` for `track`; lower is better
    pub fn score(&self, track: &Track, obs: &LightObservation, predicted: na::Point2<f32>, gap: u32) -> f32 {
        let cfg = &self.config;
        let last = track.last();

        let to_predicted = na::distance(&obs.position(), &predicted);
        let to_last = obs.distance(last);

        let mut score = cfg.predicted_weight * to_predicted + cfg.last_known_weight * to_last;

        if obs.class != track.class {
            score += cfg.class_mismatch_penalty;
        }

        score += cfg.brightness_weight * (obs.brightness - last.brightness).abs();

        let speed = to_last / gap.max(1) as f32;
        if speed > cfg.max_plausible_speed {
            score += cfg.speed_penalty_weight * speed;
        }

        score
    }

    #[inline]
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    #[inline]
    pub fn track(&self, id: u32) -> Option<&Track> {
        self.tracks.get(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks still eligible for matching at `frame`
    pub fn active_tracks(&self, frame: u32) -> impl Iterator<Item = &Track> {
        let max_gap = self.config.max_frame_gap;
        self.tracks.values().filter(move |t| t.is_active_at(frame, max_gap))
    }

    #[inline]
    pub fn global_motion(&self) -> Option<na::Vector2<f32>> {
        self.global_motion
    }

    #[inline]
    pub fn last_correction(&self) -> Option<&CorrectionResult> {
        self.last_correction.as_ref()
    }

    #[inline]
    pub fn validator_stats(&self) -> &ValidatorStats {
        self.validator.stats()
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks.into_values().collect()
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
