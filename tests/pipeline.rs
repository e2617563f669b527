use std::path::Path;

use approx::assert_abs_diff_eq;
use lighttrack::telemetry::TelemetrySource;
use lighttrack::{AnalysisConfig, Analyzer, Frame, LightClass, LightObservation, Tracking};

const SRT: &str = "1\n00:00:00,000 --> 00:00:01,000\nGPS (40.0000, -74.0000, 10) [9]\n\n\
                   2\n00:00:01,000 --> 00:00:02,000\nGPS (40.0010, -74.0010, 20) [9]\n\n\
                   3\n00:00:02,000 --> 00:00:03,000\nGPS (40.0020, -74.0020, 30) [9]\n";

const LIGHTS: [(f32, LightClass); 4] = [
    (100.0, LightClass::White),
    (300.0, LightClass::Red),
    (500.0, LightClass::Green),
    (700.0, LightClass::White),
];

fn offline_config() -> AnalysisConfig {
    AnalysisConfig::from_json_str(
        r#"{
            "default_fps": 10.0,
            "extractor": {
                "ffprobe": "lighttrack-missing-ffprobe",
                "ffmpeg": "lighttrack-missing-ffmpeg",
                "exiftool": "lighttrack-missing-exiftool"
            }
        }"#,
    )
    .unwrap()
}

/// Four lights drifting with the camera at (3, 1) px/frame. Light 1 glitches
/// on frame 7, light 3 is hidden for frames 6..18.
fn flight(frames: u32) -> Vec<Frame> {
    (0..frames)
        .map(|f| {
            let ts = f as f64 * 100.0;
            let observations = LIGHTS
                .iter()
                .enumerate()
                .filter(|&(i, _)| !(i == 3 && (6..18).contains(&f)))
                .map(|(i, &(x, class))| {
                    let mut x = x + 3.0 * f as f32;
                    let mut y = 100.0 + f as f32;
                    if i == 1 && f == 7 {
                        x += 40.0;
                        y += 40.0;
                    }

                    LightObservation::new(i as u32, f, ts, x, y, class)
                        .with_size(6.0, 6.0)
                        .with_appearance(200.0, [255, 255, 255], 255.0)
                })
                .collect();

            Frame::new(f, ts, observations)
        })
        .collect()
}

#[test]
fn test_sidecar_flight() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("DJI_0001.MP4");
    std::fs::write(&video, b"").unwrap();
    std::fs::write(dir.path().join("DJI_0001.SRT"), SRT).unwrap();

    let mut analyzer = Analyzer::new(offline_config());
    let session = analyzer.open("dji", &video, None);

    assert_eq!(session.source(), Some(TelemetrySource::Sidecar));
    assert_eq!(session.samples().len(), 3);

    analyzer.update(&flight(20), "dji").unwrap();

    let tracks = analyzer.tracks("dji");
    assert_eq!(tracks.len(), 5);

    // the glitch on frame 7 is pulled back onto the shared motion
    let red = tracks.iter().find(|t| t.class == LightClass::Red).unwrap();
    assert_eq!(red.len(), 20);
    let glitch = &red.observations()[7];
    assert_abs_diff_eq!(glitch.x(), 321.0, epsilon = 1e-3);
    assert_abs_diff_eq!(glitch.y(), 107.0, epsilon = 1e-3);

    // the hidden light comes back as a new identity, the old one is kept
    let hidden: Vec<_> = tracks
        .iter()
        .filter(|t| t.observations()[0].id == 3)
        .collect();
    assert_eq!(hidden.len(), 2);
    assert_eq!(hidden[0].last_frame(), 5);
    assert_eq!(hidden[1].first_frame(), 18);

    let gps = red.observations()[15].gps.unwrap();
    assert_abs_diff_eq!(gps.latitude, 40.0015, epsilon = 1e-9);
    assert_abs_diff_eq!(gps.altitude, 25.0, epsilon = 1e-9);
    assert_eq!(gps.frame, Some(15));

    let report = analyzer.finish("dji").unwrap();
    assert_eq!(report.frames_processed, 20);
    assert_eq!(report.diagnostics.corrections, 1);
    assert!(report.diagnostics.validations > 0);
    assert!(analyzer.session("dji").is_none());
}

#[test]
fn test_videos_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("with_gps.mp4");
    std::fs::write(&video, b"").unwrap();
    std::fs::write(dir.path().join("with_gps.srt"), SRT).unwrap();

    let mut analyzer = Analyzer::new(offline_config());
    analyzer.open("a", &video, Some(10.0));
    analyzer.open("b", Path::new("/nonexistent/lighttrack/missing.mp4"), None);

    assert_eq!(analyzer.session("b").unwrap().source(), None);

    analyzer.update(&flight(4), "a").unwrap();
    analyzer.update(&flight(4), "b").unwrap();

    // replaying a frame is rejected without touching the other video
    assert!(analyzer.update(&flight(1), "b").is_err());

    let a = analyzer.finish("a").unwrap();
    let b = analyzer.finish("b").unwrap();

    assert_eq!(a.tracks.len(), 4);
    assert_eq!(b.tracks.len(), 4);
    assert!(a.tracks.iter().all(|t| t.last().gps.is_some()));
    assert!(b.tracks.iter().all(|t| t.last().gps.is_none()));
}

#[test]
fn test_frames_without_open_session() {
    let mut analyzer = Analyzer::default();

    analyzer.update(&flight(3), "adhoc").unwrap();

    assert_eq!(analyzer.tracks("adhoc").len(), 4);
    assert!(analyzer.tracks("unknown").is_empty());
}
