use crate::observation::LightObservation;

#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u32,
    pub timestamp_ms: f64,
    pub observations: Vec<LightObservation>,
}

impl Frame {
    pub fn new(index: u32, timestamp_ms: f64, observations: Vec<LightObservation>) -> Self {
        Self {
            index,
            timestamp_ms,
            observations,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &LightObservation> {
        self.observations.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
