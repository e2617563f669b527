pub mod config;
pub mod error;
pub mod frame;
pub mod math;
pub mod motion;
pub mod observation;
pub mod session;
pub mod telemetry;
pub mod tracker;

mod track;

pub use config::AnalysisConfig;
pub use frame::Frame;
pub use observation::{LightClass, LightObservation, ObservationKey};
pub use session::{AnalysisReport, VideoSession};
pub use telemetry::GpsSample;
pub use track::Track;
pub use tracker::{Assignment, Tracker};

use error::Error;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

pub trait Tracking {
    fn update(&mut self, frames: &[Frame], src: &str) -> Result<(), Error>;
    fn tracks(&self, src: &str) -> Rc<[Track]>;
}

/// Batch analyzer keeping one independent [`VideoSession`] per video, so a
/// failure in one video never touches another's state.
pub struct Analyzer {
    config: AnalysisConfig,
    sessions: HashMap<String, VideoSession>,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Extracts telemetry for `video` and registers its session under `src`,
    /// replacing any previous session of that name
    pub fn open(&mut self, src: &str, video: &Path, fps: Option<f64>) -> &mut VideoSession {
        let fps = fps.unwrap_or(self.config.default_fps);
        let session = VideoSession::open(video, fps, &self.config);

        match self.sessions.entry(src.to_string()) {
            Entry::Occupied(mut entry) => {
                log::debug!("{}: replacing open session", src);
                entry.insert(session);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(session),
        }
    }

    #[inline]
    pub fn session(&self, src: &str) -> Option<&VideoSession> {
        self.sessions.get(src)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(|k| k.as_str())
    }

    /// Closes the session of `src` and hands back its report
    pub fn finish(&mut self, src: &str) -> Option<AnalysisReport> {
        self.sessions.remove(src).map(VideoSession::finish)
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl crate::Tracking for Analyzer {
    fn update(&mut self, frames: &[Frame], src: &str) -> Result<(), Error> {
        if frames.is_empty() {
            return Ok(());
        }

        let config = &self.config;

        // frames of a video that was never opened are tracked without telemetry
        let session = self.sessions.entry(src.to_string()).or_insert_with(|| {
            VideoSession::new(src, config.default_fps, None, config.tracker.clone())
        });

        for frame in frames {
            session.process_frame(frame.clone())?;
        }

        Ok(())
    }

    #[inline]
    fn tracks(&self, src: &str) -> Rc<[Track]> {
        if let Some(session) = self.sessions.get(src) {
            return session.tracks().cloned().collect::<Vec<_>>().into();
        }

        Rc::new([])
    }
}
