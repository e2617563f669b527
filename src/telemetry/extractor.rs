use std::fmt;
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use super::{atoms, exiftool, gpmf, srt, GpsSample};
use crate::config::ExtractorConfig;
use crate::error::Error;

/// Telemetry strategies, most trusted first
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TelemetrySource {
    Sidecar,
    EmbeddedStream,
    MetadataTool,
    AtomScan,
}

impl TelemetrySource {
    pub const ALL: [TelemetrySource; 4] = [
        TelemetrySource::Sidecar,
        TelemetrySource::EmbeddedStream,
        TelemetrySource::MetadataTool,
        TelemetrySource::AtomScan,
    ];
}

impl fmt::Display for TelemetrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TelemetrySource::Sidecar => "sidecar",
            TelemetrySource::EmbeddedStream => "embedded stream",
            TelemetrySource::MetadataTool => "metadata tool",
            TelemetrySource::AtomScan => "atom scan",
        };

        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum StrategyOutcome {
    Samples(Vec<GpsSample>),
    Empty,
    Failed(Error),
}

impl From<crate::error::Result<Vec<GpsSample>>> for StrategyOutcome {
    fn from(res: crate::error::Result<Vec<GpsSample>>) -> Self {
        match res {
            Ok(samples) if samples.is_empty() => StrategyOutcome::Empty,
            Ok(samples) => StrategyOutcome::Samples(samples),
            Err(err) => StrategyOutcome::Failed(err),
        }
    }
}

pub struct Extractor {
    config: ExtractorConfig,
    strategies: Vec<TelemetrySource>,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            strategies: TelemetrySource::ALL.to_vec(),
        }
    }

    /// Restricts extraction to the given strategies, keeping their order
    pub fn with_strategies(mut self, strategies: &[TelemetrySource]) -> Self {
        self.strategies = strategies.to_vec();
        self
    }

    #[inline]
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Samples of the first strategy that yields any; empty when none do
    pub fn extract(&self, video: &Path) -> Vec<GpsSample> {
        self.extract_with_source(video)
            .map(|(_, samples)| samples)
            .unwrap_or_default()
    }

    pub fn extract_with_source(&self, video: &Path) -> Option<(TelemetrySource, Vec<GpsSample>)> {
        for &source in &self.strategies {
            match self.run_strategy(source, video) {
                StrategyOutcome::Samples(samples) => {
                    log::info!(
                        "{}: {} telemetry samples from {}",
                        video.display(),
                        samples.len(),
                        source
                    );
                    return Some((source, samples));
                }
                StrategyOutcome::Empty => {
                    log::debug!("{}: no telemetry from {}", video.display(), source)
                }
                StrategyOutcome::Failed(err) => {
                    log::warn!("{}: {} failed: {}", video.display(), source, err)
                }
            }
        }

        log::info!("{}: no telemetry found", video.display());
        None
    }

    pub fn run_strategy(&self, source: TelemetrySource, video: &Path) -> StrategyOutcome {
        let res = match source {
            TelemetrySource::Sidecar => match sidecar_path(video) {
                Some(path) => std::fs::read(&path)
                    .map(|bytes| srt::parse_srt(&String::from_utf8_lossy(&bytes)))
                    .map_err(Error::from),
                None => Ok(Vec::new()),
            },
            TelemetrySource::EmbeddedStream => gpmf::extract(video, &self.config),
            TelemetrySource::MetadataTool => exiftool::extract(video, &self.config),
            TelemetrySource::AtomScan => atoms::scan_file(video, self.config.max_atom_depth),
        };

        res.into()
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

/// `clip.MP4` -> `clip.srt` or `clip.SRT`, whichever exists
pub fn sidecar_path(video: &Path) -> Option<PathBuf> {
    ["srt", "SRT"]
        .iter()
        .map(|ext| video.with_extension(ext))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRT: &str = "1\n00:00:00,000 --> 00:00:00,033\nGPS (40.7580, -73.9855, 15) [12]\n\n\
                       2\n00:00:01,000 --> 00:00:01,033\nGPS (40.7590, -73.9865, 16) [12]\n";

    fn offline_config() -> ExtractorConfig {
        ExtractorConfig {
            ffprobe: "lighttrack-missing-ffprobe".into(),
            ffmpeg: "lighttrack-missing-ffmpeg".into(),
            exiftool: "lighttrack-missing-exiftool".into(),
            ..Default::default()
        }
    }

    fn location_movie() -> Vec<u8> {
        let payload = b"+40.7580-073.9855+011.234/";
        let boxed = |kind: &[u8], body: &[u8]| {
            let size = ((body.len() + 8) as u32).to_be_bytes();
            [&size[..], kind, body].concat()
        };

        boxed(b"moov", &boxed(b"udta", &boxed(b"\xA9xyz", payload)))
    }

    #[test]
    fn test_sidecar_wins() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("flight.MP4");
        std::fs::write(&video, location_movie()).unwrap();
        std::fs::write(dir.path().join("flight.SRT"), SRT).unwrap();

        let extractor = Extractor::new(offline_config());
        let (source, samples) = extractor.extract_with_source(&video).unwrap();

        assert_eq!(source, TelemetrySource::Sidecar);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].timestamp_ms, 1000.0);
    }

    #[test]
    fn test_falls_through_missing_tools_to_atoms() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("flight.mov");
        std::fs::write(&video, location_movie()).unwrap();

        let extractor = Extractor::new(offline_config());

        assert!(matches!(
            extractor.run_strategy(TelemetrySource::Sidecar, &video),
            StrategyOutcome::Empty
        ));
        assert!(matches!(
            extractor.run_strategy(TelemetrySource::EmbeddedStream, &video),
            StrategyOutcome::Failed(Error::ToolUnavailable(_))
        ));

        let (source, samples) = extractor.extract_with_source(&video).unwrap();
        assert_eq!(source, TelemetrySource::AtomScan);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].latitude, 40.758);
    }

    #[test]
    fn test_missing_video_yields_empty() {
        let extractor = Extractor::new(offline_config());
        let samples = extractor.extract(Path::new("/nonexistent/lighttrack/clip.mp4"));

        assert!(samples.is_empty());
    }

    #[test]
    fn test_strategy_subset() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("flight.mp4");
        std::fs::write(&video, location_movie()).unwrap();
        std::fs::write(dir.path().join("flight.srt"), SRT).unwrap();

        let extractor =
            Extractor::new(offline_config()).with_strategies(&[TelemetrySource::AtomScan]);
        let (source, _) = extractor.extract_with_source(&video).unwrap();

        assert_eq!(source, TelemetrySource::AtomScan);
    }
}
