//! SubRip-style telemetry sidecar (`video.SRT` next to `video.MP4`).
//!
//! ```text
//! 1
//! 00:00:00,000 --> 00:00:00,033
//! GPS (40.7580, -73.9855, 15) [12]
//! ```
//!
//! Entries that also (or only) carry DJI-style bracket tags such as
//! `[latitude: 40.7580] [longitude: -73.9855] [abs_alt: 15.0]` are understood
//! as well.

use lazy_static::lazy_static;
use regex::Regex;

use super::coords::{parse_coordinate, parse_number};
use super::exiftool::TaggedFields;
use super::GpsSample;

lazy_static! {
    static ref TIME_RANGE: Regex =
        Regex::new(r"(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})\s*-->").unwrap();
    static ref GPS_TRIPLET: Regex =
        Regex::new(r"GPS\s*\(\s*([^,()]+?)\s*,\s*([^,()]+?)\s*(?:,\s*([^,()]+?)\s*)?\)").unwrap();
    static ref SATELLITES: Regex = Regex::new(r"\)\s*\[\s*(\d+)\s*\]").unwrap();
    static ref BLANK_LINE: Regex = Regex::new(r"\r?\n\s*\r?\n").unwrap();
}

pub fn parse_srt(text: &str) -> Vec<GpsSample> {
    BLANK_LINE
        .split(text.trim_start_matches('\u{feff}'))
        .filter_map(parse_entry)
        .collect()
}

fn parse_entry(entry: &str) -> Option<GpsSample> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let timestamp_ms = parse_start_ms(entry)?;
    let index = entry
        .lines()
        .next()
        .and_then(|l| l.trim().parse::<u32>().ok());

    let mut sample = if let Some(caps) = GPS_TRIPLET.captures(entry) {
        let lat = parse_coordinate(caps.get(1)?.as_str());
        let lon = parse_coordinate(caps.get(2)?.as_str());
        let alt = caps.get(3).and_then(|m| parse_number(m.as_str()));

        match (lat, lon) {
            (Some(lat), Some(lon)) => {
                let mut sample = GpsSample::new(timestamp_ms, lat, lon, alt.unwrap_or(0.0));
                sample.satellites = SATELLITES
                    .captures(&entry[caps.get(0)?.start()..])
                    .and_then(|c| c.get(1)?.as_str().parse().ok());
                sample
            }
            _ => {
                log::debug!("srt entry {:?} has unparseable coordinates", index);
                return None;
            }
        }
    } else {
        TaggedFields::parse(entry).sample(timestamp_ms)?
    };

    sample.frame = index;

    if !sample.has_valid_position() {
        log::debug!("srt entry {:?} out of range, skipped", index);
        return None;
    }

    Some(sample)
}

fn parse_start_ms(entry: &str) -> Option<f64> {
    let caps = TIME_RANGE.captures(entry)?;

    let h: f64 = caps.get(1)?.as_str().parse().ok()?;
    let m: f64 = caps.get(2)?.as_str().parse().ok()?;
    let s: f64 = caps.get(3)?.as_str().parse().ok()?;
    let frac = caps.get(4)?.as_str();
    let ms: f64 = frac.parse::<f64>().ok()? * 10f64.powi(3 - frac.len() as i32);

    Some(((h * 60.0 + m) * 60.0 + s) * 1000.0 + ms)
}
