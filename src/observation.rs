use serde_derive::{Deserialize, Serialize};

use nalgebra as na;

use crate::telemetry::GpsSample;

/// Color/intensity label assigned by the detector
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LightClass {
    Red,
    Green,
    Blue,
    Yellow,
    White,
    HighIntensity,
    Generic,
    #[default]
    Unknown,
}

impl LightClass {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "red" => LightClass::Red,
            "green" => LightClass::Green,
            "blue" => LightClass::Blue,
            "yellow" => LightClass::Yellow,
            "white" => LightClass::White,
            "high_intensity" => LightClass::HighIntensity,
            "generic" => LightClass::Generic,
            _ => LightClass::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LightClass::Red => "red",
            LightClass::Green => "green",
            LightClass::Blue => "blue",
            LightClass::Yellow => "yellow",
            LightClass::White => "white",
            LightClass::HighIntensity => "high_intensity",
            LightClass::Generic => "generic",
            LightClass::Unknown => "unknown",
        }
    }
}

/// Stable join key of an observation: the frame it belongs to and its
/// frame-scoped detector id
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationKey {
    pub frame: u32,
    pub id: u32,
}

/// One detected bright region in one frame.
///
/// Contains (x,y) of the center and (w,h) of the bounding box. Position is the
/// only field that changes after detection: the motion validator may replace
/// it once per frame with a consensus-corrected value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LightObservation {
    pub id: u32,
    pub frame: u32,
    pub timestamp_ms: f64,
    x: f32,
    y: f32,
    pub w: f32,
    pub h: f32,
    pub area: f32,
    pub brightness: f32,
    pub rgb: [u8; 3],
    pub peak_intensity: f32,
    pub class: LightClass,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gps: Option<GpsSample>,
}

impl LightObservation {
    pub fn new(id: u32, frame: u32, timestamp_ms: f64, x: f32, y: f32, class: LightClass) -> Self {
        Self {
            id,
            frame,
            timestamp_ms,
            x,
            y,
            w: 0.0,
            h: 0.0,
            area: 0.0,
            brightness: 0.0,
            rgb: [0, 0, 0],
            peak_intensity: 0.0,
            class,
            gps: None,
        }
    }

    #[inline]
    pub fn with_size(mut self, w: f32, h: f32) -> Self {
        self.w = w;
        self.h = h;
        self.area = w * h;
        self
    }

    #[inline]
    pub fn with_appearance(mut self, brightness: f32, rgb: [u8; 3], peak_intensity: f32) -> Self {
        self.brightness = brightness;
        self.rgb = rgb;
        self.peak_intensity = peak_intensity;
        self
    }

    /// Enrichment step: returns a new observation carrying the telemetry fix
    #[inline]
    pub fn with_gps(mut self, gps: GpsSample) -> Self {
        self.gps = Some(gps);
        self
    }

    #[inline(always)]
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            frame: self.frame,
            id: self.id,
        }
    }

    #[inline(always)]
    pub fn x(&self) -> f32 {
        self.x
    }

    #[inline(always)]
    pub fn y(&self) -> f32 {
        self.y
    }

    #[inline(always)]
    pub fn position(&self) -> na::Point2<f32> {
        na::Point2::new(self.x, self.y)
    }

    #[inline]
    pub(crate) fn set_position(&mut self, pos: na::Point2<f32>) {
        self.x = pos.x;
        self.y = pos.y;
    }

    #[inline]
    pub fn distance(&self, other: &LightObservation) -> f32 {
        na::distance(&self.position(), &other.position())
    }
}
