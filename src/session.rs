use std::path::Path;

use serde_derive::Serialize;

use crate::config::{AnalysisConfig, TrackerConfig};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::motion::ValidatorStats;
use crate::telemetry::{self, Extractor, GpsSample, TelemetrySource};
use crate::track::Track;
use crate::tracker::{Assignment, Tracker};

/// Everything one video's analysis produced
#[derive(Serialize, Debug, Clone)]
pub struct AnalysisReport {
    pub video: String,
    pub fps: f64,
    pub frames_processed: u64,
    pub source: Option<TelemetrySource>,
    pub samples: Vec<GpsSample>,
    pub tracks: Vec<Track>,
    pub diagnostics: ValidatorStats,
}

impl AnalysisReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Per-video state: the telemetry extracted up front and the tracker the
/// frames are fed through, in order.
pub struct VideoSession {
    name: String,
    fps: f64,
    source: Option<TelemetrySource>,
    samples: Vec<GpsSample>,
    tracker: Tracker,
    last_frame: Option<u32>,
    frames_processed: u64,
}

impl VideoSession {
    pub fn new<S: Into<String>>(
        name: S,
        fps: f64,
        telemetry: Option<(TelemetrySource, Vec<GpsSample>)>,
        config: TrackerConfig,
    ) -> Self {
        let (source, samples) = match telemetry {
            Some((source, samples)) => (Some(source), samples),
            None => (None, Vec::new()),
        };

        Self {
            name: name.into(),
            fps,
            source,
            samples,
            tracker: Tracker::new(config),
            last_frame: None,
            frames_processed: 0,
        }
    }

    /// Runs telemetry extraction for `video` and starts a session for it.
    /// A video without telemetry still gets a session, with no GPS attached.
    pub fn open(video: &Path, fps: f64, config: &AnalysisConfig) -> Self {
        let extractor = Extractor::new(config.extractor.clone());
        let telemetry = extractor.extract_with_source(video);

        let name = video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| video.display().to_string());

        Self::new(name, fps, telemetry, config.tracker.clone())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn fps(&self) -> f64 {
        self.fps
    }

    #[inline]
    pub fn source(&self) -> Option<TelemetrySource> {
        self.source
    }

    #[inline]
    pub fn samples(&self) -> &[GpsSample] {
        &self.samples
    }

    #[inline]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Telemetry fix for a frame; falls back to the frame's own timestamp
    /// when the session has no usable frame rate
    pub fn gps_at(&self, frame: &Frame) -> Option<GpsSample> {
        telemetry::interpolate(&self.samples, frame.index, self.fps)
            .or_else(|| telemetry::interpolate_at(&self.samples, frame.timestamp_ms, Some(frame.index)))
    }

    /// Attaches the frame's telemetry fix to every observation and tracks them
    pub fn process_frame(&mut self, frame: Frame) -> Result<Vec<Assignment>> {
        if let Some(last) = self.last_frame {
            if frame.index <= last {
                return Err(Error::FrameOrder {
                    last,
                    got: frame.index,
                });
            }
        }

        let gps = self.gps_at(&frame);
        let observations = match gps {
            Some(gps) => frame
                .observations
                .into_iter()
                .map(|obs| obs.with_gps(gps))
                .collect(),
            None => frame.observations,
        };

        self.last_frame = Some(frame.index);
        self.frames_processed += 1;

        Ok(self.tracker.update(observations))
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracker.tracks()
    }

    pub fn finish(self) -> AnalysisReport {
        let diagnostics = self.tracker.validator_stats().clone();

        log::info!(
            "{}: {} frames, {} tracks, {} corrections",
            self.name,
            self.frames_processed,
            self.tracker.len(),
            diagnostics.corrections
        );

        AnalysisReport {
            video: self.name,
            fps: self.fps,
            frames_processed: self.frames_processed,
            source: self.source,
            samples: self.samples,
            tracks: self.tracker.into_tracks(),
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{LightClass, LightObservation};
    use approx::assert_abs_diff_eq;

    fn frame(index: u32, x: f32) -> Frame {
        let ts = index as f64 * 100.0;
        Frame::new(
            index,
            ts,
            vec![LightObservation::new(0, index, ts, x, 50.0, LightClass::White)],
        )
    }

    fn telemetry() -> Option<(TelemetrySource, Vec<GpsSample>)> {
        Some((
            TelemetrySource::Sidecar,
            vec![
                GpsSample::new(0.0, 10.0, 20.0, 100.0),
                GpsSample::new(1000.0, 11.0, 21.0, 200.0),
            ],
        ))
    }

    #[test]
    fn test_observations_enriched() {
        let mut session = VideoSession::new("a.mp4", 10.0, telemetry(), TrackerConfig::default());

        session.process_frame(frame(5, 10.0)).unwrap();

        let track = session.tracks().next().unwrap();
        let gps = track.last().gps.unwrap();
        assert_abs_diff_eq!(gps.latitude, 10.5, epsilon = 1e-12);
        assert_abs_diff_eq!(gps.altitude, 150.0, epsilon = 1e-9);
        assert_eq!(gps.frame, Some(5));
        assert_eq!(gps.timestamp_ms, 500.0);
    }

    #[test]
    fn test_without_telemetry() {
        let mut session = VideoSession::new("b.mp4", 30.0, None, TrackerConfig::default());

        session.process_frame(frame(0, 10.0)).unwrap();
        session.process_frame(frame(1, 12.0)).unwrap();

        let report = session.finish();
        assert_eq!(report.source, None);
        assert_eq!(report.frames_processed, 2);
        assert_eq!(report.tracks.len(), 1);
        assert!(report.tracks[0].observations().iter().all(|o| o.gps.is_none()));
    }

    #[test]
    fn test_timestamp_fallback_without_fps() {
        let session = VideoSession::new("c.mp4", 0.0, telemetry(), TrackerConfig::default());

        let gps = session.gps_at(&frame(2, 0.0)).unwrap();
        assert_abs_diff_eq!(gps.latitude, 10.2, epsilon = 1e-12);
        assert_eq!(gps.frame, Some(2));
    }

    #[test]
    fn test_out_of_order_frame_rejected() {
        let mut session = VideoSession::new("d.mp4", 30.0, None, TrackerConfig::default());

        session.process_frame(frame(3, 10.0)).unwrap();
        let err = session.process_frame(frame(3, 10.0));

        assert!(matches!(err, Err(Error::FrameOrder { last: 3, got: 3 })));
        assert_eq!(session.tracker().track(1).unwrap().len(), 1);
    }

    #[test]
    fn test_report_json() {
        let mut session = VideoSession::new("e.mp4", 10.0, telemetry(), TrackerConfig::default());
        session.process_frame(frame(0, 10.0)).unwrap();

        let json = session.finish().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["video"], "e.mp4");
        assert_eq!(value["source"], "sidecar");
        assert_eq!(value["tracks"][0]["class"], "white");
        assert_eq!(value["samples"].as_array().unwrap().len(), 2);
    }
}
