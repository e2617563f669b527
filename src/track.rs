use nalgebra as na;
use serde_derive::Serialize;

use crate::observation::{LightClass, LightObservation, ObservationKey};

/// Persistent identity of one light across frames.
///
/// Observations are only ever appended; a track that stops receiving them is
/// left in place and simply no longer matched.
#[derive(Serialize, Debug, Clone)]
pub struct Track {
    pub id: u32,
    // fixed to the first observation's label
    pub class: LightClass,
    observations: Vec<LightObservation>,
}

impl Track {
    pub(crate) fn new(id: u32, first: LightObservation) -> Self {
        Self {
            id,
            class: first.class,
            observations: vec![first],
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, obs: LightObservation) {
        self.observations.push(obs);
    }

    #[inline]
    pub fn observations(&self) -> &[LightObservation] {
        &self.observations
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    #[inline]
    pub fn last(&self) -> &LightObservation {
        // a track is created with one observation and never shrinks
        &self.observations[self.observations.len() - 1]
    }

    #[inline]
    pub fn first_frame(&self) -> u32 {
        self.observations[0].frame
    }

    #[inline]
    pub fn last_frame(&self) -> u32 {
        self.last().frame
    }

    #[inline]
    pub fn frame_gap(&self, frame: u32) -> u32 {
        frame.saturating_sub(self.last_frame())
    }

    #[inline]
    pub fn is_active_at(&self, frame: u32, max_gap: u32) -> bool {
        self.frame_gap(frame) <= max_gap
    }

    pub fn contains(&self, key: ObservationKey) -> bool {
        self.observations.iter().any(|o| o.key() == key)
    }

    pub fn positions(&self) -> impl Iterator<Item = na::Point2<f32>> + '_ {
        self.observations.iter().map(|o| o.position())
    }

    /// Per-frame velocity from the first and last of the `window` most recent
    /// observations
    pub fn velocity(&self, window: usize) -> Option<na::Vector2<f32>> {
        let n = self.observations.len();
        if n < 2 {
            return None;
        }

        let first = &self.observations[n - window.clamp(2, n)];
        let last = self.last();

        let frames = last.frame.saturating_sub(first.frame);
        if frames == 0 {
            return Some(na::Vector2::zeros());
        }

        Some((last.position() - first.position()) / frames as f32)
    }

    /// Expected position at `frame`: extrapolated along the track's own
    /// velocity, or shifted by the frame-wide motion while the track is too
    /// short to have one
    pub fn predict(
        &self,
        frame: u32,
        window: usize,
        global_motion: Option<na::Vector2<f32>>,
    ) -> na::Point2<f32> {
        let gap = self.frame_gap(frame) as f32;
        let last = self.last().position();

        match self.velocity(window) {
            Some(vel) => last + vel * gap,
            None => match global_motion {
                Some(motion) => last + motion * gap,
                None => last,
            },
        }
    }
}
