use std::path::Path;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Motion consistency validation thresholds
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ValidatorConfig {
    /// minimum observations per frame and matched pairs before validating
    pub min_observations: usize,
    /// nearest-neighbor cutoff when pairing observations across frames, px
    pub match_distance: f32,
    pub max_brightness_diff: f32,
    /// median motion below this many px means the platform is stationary
    pub stationary_threshold: f32,
    /// deviation from the median motion, as a fraction of its magnitude
    pub variance_threshold: f32,
    /// above this share of outliers the frame pair is left uncorrected
    pub max_outlier_ratio: f32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_observations: 3,
            match_distance: 150.0,
            max_brightness_diff: 50.0,
            stationary_threshold: 0.5,
            variance_threshold: 0.01,
            max_outlier_ratio: 0.5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// frames without a match after which a track stops being matched
    pub max_frame_gap: u32,
    /// scores at or above this never match
    pub match_threshold: f32,
    pub global_motion_distance: f32,
    pub min_global_motion_pairs: usize,
    /// number of most recent observations used for velocity
    pub velocity_window: usize,
    pub predicted_weight: f32,
    pub last_known_weight: f32,
    /// observations labelled differently from a track are never matched to it
    pub strict_class: bool,
    /// score added for a label mismatch when `strict_class` is off
    pub class_mismatch_penalty: f32,
    pub brightness_weight: f32,
    /// px/frame above which jumps are penalized
    pub max_plausible_speed: f32,
    pub speed_penalty_weight: f32,
    pub validator: ValidatorConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_frame_gap: 10,
            match_threshold: 50.0,
            global_motion_distance: 100.0,
            min_global_motion_pairs: 3,
            velocity_window: 5,
            predicted_weight: 0.7,
            last_known_weight: 0.3,
            strict_class: true,
            class_mismatch_penalty: 20.0,
            brightness_weight: 0.05,
            max_plausible_speed: 30.0,
            speed_penalty_weight: 0.5,
            validator: ValidatorConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExtractorConfig {
    pub tool_timeout_ms: u64,
    pub ffprobe: String,
    pub ffmpeg: String,
    pub exiftool: String,
    pub max_atom_depth: usize,
    /// spacing of tool-reported fixes that carry no sample time
    pub default_sample_spacing_ms: f64,
    /// spacing of embedded text records that carry neither clock nor diff time
    pub default_frame_interval_ms: f64,
}

impl ExtractorConfig {
    #[inline]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            tool_timeout_ms: 10_000,
            ffprobe: "ffprobe".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            exiftool: "exiftool".to_string(),
            max_atom_depth: 10,
            default_sample_spacing_ms: 1000.0,
            default_frame_interval_ms: 1000.0 / 30.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// frame rate assumed for videos opened without one
    pub default_fps: f64,
    pub tracker: TrackerConfig,
    pub extractor: ExtractorConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_fps: 30.0,
            tracker: TrackerConfig::default(),
            extractor: ExtractorConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;

        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.tracker;

        if t.velocity_window < 2 {
            return Err(Error::Config("velocity_window must be at least 2".into()));
        }

        if t.match_threshold <= 0.0 {
            return Err(Error::Config("match_threshold must be positive".into()));
        }

        if !(0.0..=1.0).contains(&t.validator.max_outlier_ratio) {
            return Err(Error::Config("max_outlier_ratio must be within [0, 1]".into()));
        }

        if !(self.default_fps > 0.0 && self.default_fps.is_finite()) {
            return Err(Error::Config("default_fps must be positive".into()));
        }

        if self.extractor.tool_timeout_ms == 0 {
            return Err(Error::Config("tool_timeout_ms must be non-zero".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_override_keeps_defaults() {
        let cfg = AnalysisConfig::from_json_str(
            r#"{ "tracker": { "max_frame_gap": 3, "validator": { "variance_threshold": 0.05 } } }"#,
        )
        .unwrap();

        assert_eq!(cfg.tracker.max_frame_gap, 3);
        assert_eq!(cfg.tracker.match_threshold, 50.0);
        assert_eq!(cfg.tracker.validator.variance_threshold, 0.05);
        assert_eq!(cfg.tracker.validator.min_observations, 3);
        assert_eq!(cfg.extractor.max_atom_depth, 10);
        assert_eq!(cfg.default_fps, 30.0);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = AnalysisConfig::from_json_str(r#"{ "tracker": { "velocity_window": 1 } }"#);
        assert!(matches!(err, Err(Error::Config(_))));

        let err = AnalysisConfig::from_json_str(r#"{ "default_fps": 0 }"#);
        assert!(matches!(err, Err(Error::Config(_))));

        let err = AnalysisConfig::from_json_str(r#"{ "tracker": 5 }"#);
        assert!(matches!(err, Err(Error::Json(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        std::fs::write(&path, r#"{ "extractor": { "tool_timeout_ms": 2500 } }"#).unwrap();

        let cfg = AnalysisConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.extractor.tool_timeout(), Duration::from_millis(2500));
    }
}
