//! Telemetry extraction and interpolation.
//!
//! Each parser turns one encoding into an ordered list of [`GpsSample`]s; the
//! [`Extractor`] tries them in order of trust and keeps the first non-empty
//! result, and [`interpolate`] maps a video frame onto that list.

pub mod atoms;
pub mod coords;
pub mod exiftool;
pub mod extractor;
pub mod gpmf;
pub mod interpolate;
pub mod srt;

mod tool;

pub use extractor::{Extractor, StrategyOutcome, TelemetrySource};
pub use interpolate::{interpolate, interpolate_at};

use serde_derive::{Deserialize, Serialize};

/// One telemetry fix
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GpsSample {
    pub timestamp_ms: f64,
    pub latitude: f64,
    pub longitude: f64,
    // meters
    pub altitude: f64,

    // m/s
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub speed: Option<f64>,

    // degrees in [0, 360)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub heading: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub satellites: Option<u32>,

    // meters
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub accuracy: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub frame: Option<u32>,
}

impl GpsSample {
    pub fn new(timestamp_ms: f64, latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            timestamp_ms,
            latitude,
            longitude,
            altitude,
            speed: None,
            heading: None,
            satellites: None,
            accuracy: None,
            frame: None,
        }
    }

    /// Same fix stamped with another time and frame
    #[inline]
    pub fn restamped(&self, timestamp_ms: f64, frame: Option<u32>) -> Self {
        Self {
            timestamp_ms,
            frame,
            ..*self
        }
    }

    #[inline]
    pub fn has_valid_position(&self) -> bool {
        coords::is_valid_position(self.latitude, self.longitude)
    }
}
