//! Output of a third-party metadata dump tool (exiftool).
//!
//! Two modes are understood: embedded per-frame text records (DJI style,
//! `FrameCnt: 12 ... [latitude: 22.5] [longitude: 113.9] [abs_alt: 80.1]`)
//! and the structured JSON dump, where fixes appear as parallel lists of
//! coordinates and sample times spread over `DocN:` groups.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::atoms::parse_iso6709;
use super::coords::{parse_coordinate, parse_number};
use super::{tool, GpsSample};
use crate::config::ExtractorConfig;
use crate::error::{Error, Result};
use crate::math::normalize_heading;

lazy_static! {
    static ref FRAME_MARKER: Regex = Regex::new(r"FrameCnt\s*[:=]?\s*(\d+)").unwrap();
    static ref DIFF_TIME: Regex =
        Regex::new(r"DiffTime\s*[:=]?\s*(\d+(?:\.\d+)?)\s*ms").unwrap();
    static ref CLOCK: Regex = Regex::new(
        r"(\d{4})-(\d{2})-(\d{2})[ T](\d{2}):(\d{2}):(\d{2})(?:[.,](\d{1,6}))?"
    )
    .unwrap();
    static ref TAG: Regex = Regex::new(
        r"(?i)\b(latitude|longtitude|longitude|lat|lon|abs_alt|rel_alt|altitude|gb_yaw)\s*[:=]\s*([-+]?\d+(?:\.\d+)?)"
    )
    .unwrap();
    static ref DOC_GROUP: Regex = Regex::new(r"Doc(\d+)").unwrap();
    static ref DURATION: Regex = Regex::new(r"^(\d+):(\d{2}):(\d{2}(?:\.\d+)?)$").unwrap();
}

/// Tagged fields of one embedded text record
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TaggedFields {
    pub frame: Option<u32>,
    pub diff_time_ms: Option<f64>,
    pub clock_ms: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub abs_alt: Option<f64>,
    pub rel_alt: Option<f64>,
    pub altitude: Option<f64>,
    pub yaw: Option<f64>,
}

impl TaggedFields {
    pub fn parse(text: &str) -> Self {
        let mut fields = TaggedFields {
            frame: FRAME_MARKER
                .captures(text)
                .and_then(|c| c.get(1)?.as_str().parse().ok()),
            diff_time_ms: DIFF_TIME
                .captures(text)
                .and_then(|c| c.get(1)?.as_str().parse().ok()),
            clock_ms: CLOCK.captures(text).and_then(|c| clock_ms(&c)),
            ..Default::default()
        };

        for caps in TAG.captures_iter(text) {
            let value = match caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok()) {
                Some(v) => v,
                None => continue,
            };

            let slot = match caps[1].to_ascii_lowercase().as_str() {
                "latitude" | "lat" => &mut fields.latitude,
                "longitude" | "longtitude" | "lon" => &mut fields.longitude,
                "abs_alt" => &mut fields.abs_alt,
                "rel_alt" => &mut fields.rel_alt,
                "altitude" => &mut fields.altitude,
                "gb_yaw" => &mut fields.yaw,
                _ => continue,
            };

            if slot.is_none() {
                *slot = Some(value);
            }
        }

        fields
    }

    /// Builds a sample when the record carries a usable position. A 0/0
    /// position is what receivers report before the first lock.
    pub fn sample(&self, timestamp_ms: f64) -> Option<GpsSample> {
        let (lat, lon) = (self.latitude?, self.longitude?);

        if lat == 0.0 && lon == 0.0 {
            return None;
        }

        let altitude = self
            .abs_alt
            .or(self.altitude)
            .or(self.rel_alt)
            .unwrap_or(0.0);

        let mut sample = GpsSample::new(timestamp_ms, lat, lon, altitude);
        sample.heading = self.yaw.map(normalize_heading);
        sample.frame = self.frame;

        if sample.has_valid_position() {
            Some(sample)
        } else {
            None
        }
    }
}

fn clock_ms(caps: &regex::Captures<'_>) -> Option<f64> {
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok());

    let (day, h, m, s) = (num(3)?, num(4)?, num(5)?, num(6)?);
    let frac = caps
        .get(7)
        .and_then(|f| {
            let digits = f.as_str();
            let v = digits.parse::<f64>().ok()?;
            Some(v * 10f64.powi(3 - digits.len() as i32))
        })
        .unwrap_or(0.0);

    Some((((day * 24.0 + h) * 60.0 + m) * 60.0 + s) * 1000.0 + frac)
}

/// Parses embedded per-frame text records.
///
/// Timestamps come from the record clock relative to the first clocked
/// record, else from accumulated `DiffTime`, else from the frame counter and
/// `frame_interval_ms`.
pub fn parse_embedded_text(text: &str, frame_interval_ms: f64) -> Vec<GpsSample> {
    let starts: Vec<usize> = FRAME_MARKER.find_iter(text).map(|m| m.start()).collect();
    let mut samples = Vec::new();

    let mut base_clock = None;
    let mut elapsed = 0.0;

    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(text.len());
        let fields = TaggedFields::parse(&text[start..end]);

        let frame = match fields.frame {
            Some(frame) => frame,
            None => continue,
        };

        if n > 0 {
            elapsed += fields.diff_time_ms.unwrap_or(0.0);
        }

        let timestamp_ms = match (fields.clock_ms, fields.diff_time_ms) {
            (Some(clock), _) => clock - *base_clock.get_or_insert(clock),
            (None, Some(_)) => elapsed,
            (None, None) => frame.saturating_sub(1) as f64 * frame_interval_ms,
        };

        match fields.sample(timestamp_ms) {
            Some(sample) => samples.push(sample),
            None => log::trace!("embedded record for frame {} has no position", frame),
        }
    }

    samples
}

#[derive(Debug, Default)]
struct GroupFields {
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    altitude: Vec<f64>,
    time_s: Vec<f64>,
    speed: Vec<f64>,
    heading: Vec<f64>,
    satellites: Vec<f64>,
    position: Option<String>,
}

impl GroupFields {
    fn has_track(&self) -> bool {
        !self.latitude.is_empty() && !self.longitude.is_empty()
    }
}

/// Flattens a scalar-or-array JSON value through `parse`
fn values<F: Fn(&str) -> Option<f64>>(value: &Value, parse: &F) -> Vec<f64> {
    match value {
        Value::Number(n) => n.as_f64().into_iter().collect(),
        Value::String(s) => parse(s).into_iter().collect(),
        Value::Array(items) => items.iter().flat_map(|v| values(v, parse)).collect(),
        _ => Vec::new(),
    }
}

fn parse_sample_time(text: &str) -> Option<f64> {
    let text = text.trim();

    if let Some(caps) = DURATION.captures(text) {
        let h: f64 = caps[1].parse().ok()?;
        let m: f64 = caps[2].parse().ok()?;
        let s: f64 = caps[3].parse().ok()?;
        return Some((h * 60.0 + m) * 60.0 + s);
    }

    parse_number(text)
}

/// Parses a static location tag such as `40.758 -73.9855 15`,
/// `40 deg 45' 28.80" N, 73 deg 59' 7.80" W, 15 m` or `+40.7580-073.9855/`
pub fn parse_static_location(text: &str) -> Option<GpsSample> {
    let text = text.trim();

    let iso_like = text.starts_with(&['+', '-'][..])
        && text[1..].contains(&['+', '-'][..])
        && !text.contains(char::is_whitespace);

    if iso_like {
        return parse_iso6709(text);
    }

    let parts: Vec<&str> = if text.contains(',') {
        text.split(',').map(str::trim).collect()
    } else {
        text.split_whitespace().collect()
    };

    let lat = parse_coordinate(parts.first()?)?;
    let lon = parse_coordinate(parts.get(1)?)?;
    let alt = parts.get(2).and_then(|a| parse_number(a)).unwrap_or(0.0);

    let sample = GpsSample::new(0.0, lat, lon, alt);
    if sample.has_valid_position() {
        Some(sample)
    } else {
        None
    }
}

/// Parses the JSON dump (`exiftool -j -n -ee -G3`)
pub fn parse_json(json: &str, spacing_ms: f64) -> Result<Vec<GpsSample>> {
    let root: Value = serde_json::from_str(json)?;

    let docs = match root {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        _ => return Err(Error::malformed("expected a json object or array")),
    };

    let mut groups: BTreeMap<u32, GroupFields> = BTreeMap::new();

    for doc in &docs {
        let obj = match doc.as_object() {
            Some(obj) => obj,
            None => continue,
        };

        for (key, value) in obj {
            let (group, tag) = key.rsplit_once(':').unwrap_or(("", key.as_str()));
            let doc_no = DOC_GROUP
                .captures(group)
                .and_then(|c| c[1].parse::<u32>().ok())
                .unwrap_or(0);

            let fields = groups.entry(doc_no).or_default();

            match tag {
                "GPSLatitude" => fields.latitude.extend(values(value, &parse_coordinate)),
                "GPSLongitude" => fields.longitude.extend(values(value, &parse_coordinate)),
                "GPSAltitude" => fields.altitude.extend(values(value, &parse_number)),
                "SampleTime" => fields.time_s.extend(values(value, &parse_sample_time)),
                "GPSSpeed" => fields.speed.extend(values(value, &parse_number)),
                "GPSTrack" | "GPSImgDirection" => {
                    fields.heading.extend(values(value, &parse_number))
                }
                "GPSSatellites" => fields.satellites.extend(values(value, &parse_number)),
                "GPSCoordinates" | "GPSPosition" => {
                    fields.position = match value {
                        Value::String(s) => Some(s.clone()),
                        Value::Array(items) => Some(
                            items
                                .iter()
                                .map(|v| v.to_string().trim_matches('"').to_string())
                                .collect::<Vec<_>>()
                                .join(" "),
                        ),
                        _ => None,
                    }
                }
                _ => (),
            }
        }
    }

    // per-document tracks win over a file-level fix
    let tracked_docs = groups.iter().any(|(no, g)| *no > 0 && g.has_track());
    let mut samples = Vec::new();
    let mut index = 0usize;

    for (no, fields) in &groups {
        if tracked_docs && *no == 0 {
            continue;
        }

        let pairs = fields.latitude.len().min(fields.longitude.len());
        for i in 0..pairs {
            let pick = |v: &Vec<f64>| v.get(i).or_else(|| v.first().filter(|_| v.len() == 1)).copied();

            let timestamp_ms = fields
                .time_s
                .get(i)
                .map(|t| t * 1000.0)
                .unwrap_or(index as f64 * spacing_ms);
            index += 1;

            let mut sample = GpsSample::new(
                timestamp_ms,
                fields.latitude[i],
                fields.longitude[i],
                pick(&fields.altitude).unwrap_or(0.0),
            );
            // km/h
            sample.speed = pick(&fields.speed).map(|s| s / 3.6);
            sample.heading = pick(&fields.heading).map(normalize_heading);
            sample.satellites = pick(&fields.satellites).map(|s| s as u32);

            if sample.has_valid_position() {
                samples.push(sample);
            }
        }
    }

    if samples.is_empty() {
        if let Some(sample) = groups
            .values()
            .filter_map(|g| g.position.as_deref())
            .find_map(parse_static_location)
        {
            samples.push(sample);
        }
    }

    Ok(samples)
}

/// Runs the dump tool in embedded-text mode, then in JSON mode
pub fn extract(video: &Path, config: &ExtractorConfig) -> Result<Vec<GpsSample>> {
    let timeout = config.tool_timeout();

    let text_args = [
        OsStr::new("-ee"),
        OsStr::new("-api"),
        OsStr::new("LargeFileSupport=1"),
        video.as_os_str(),
    ];

    match tool::run(&config.exiftool, text_args, timeout) {
        Ok(out) => {
            let samples =
                parse_embedded_text(&String::from_utf8_lossy(&out), config.default_frame_interval_ms);
            if !samples.is_empty() {
                return Ok(samples);
            }
        }
        Err(err @ Error::ToolUnavailable(_)) => return Err(err),
        Err(err) => log::warn!("{} text dump failed: {}", config.exiftool, err),
    }

    let json_args = [
        OsStr::new("-j"),
        OsStr::new("-n"),
        OsStr::new("-ee"),
        OsStr::new("-G3"),
        OsStr::new("-api"),
        OsStr::new("LargeFileSupport=1"),
        video.as_os_str(),
    ];
    let out = tool::run(&config.exiftool, json_args, timeout)?;

    parse_json(&String::from_utf8_lossy(&out), config.default_sample_spacing_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const DJI_TEXT: &str = "\
Text : FrameCnt: 1, DiffTime: 33ms\n2023-05-01 12:00:00.100\n[iso: 100] [latitude: 22.543100] [longitude: 113.941200] [rel_alt: 1.200 abs_alt: 88.400] [gb_yaw: -10.5 gb_pitch: -90.0]\n\
Text : FrameCnt: 2, DiffTime: 34ms\n2023-05-01 12:00:00.134\n[iso: 100] [latitude: 22.543110] [longitude: 113.941210] [rel_alt: 1.300 abs_alt: 88.500] [gb_yaw: 12.0]\n\
Text : FrameCnt: 3, DiffTime: 33ms\n2023-05-01 12:00:00.167\n[iso: 100] [latitude: 0.000000] [longitude: 0.000000] [rel_alt: 1.300]\n";

    #[test]
    fn test_embedded_text_records() {
        let samples = parse_embedded_text(DJI_TEXT, 1000.0 / 30.0);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].frame, Some(1));
        assert_eq!(samples[0].timestamp_ms, 0.0);
        assert_eq!(samples[0].altitude, 88.4);
        assert_abs_diff_eq!(samples[0].heading.unwrap(), 349.5);
        assert_abs_diff_eq!(samples[1].timestamp_ms, 34.0, epsilon = 1e-6);
        assert_eq!(samples[1].latitude, 22.54311);
    }

    #[test]
    fn test_embedded_text_relative_altitude_and_diff_time() {
        let text = "FrameCnt: 1, DiffTime: 40ms [latitude : 1.5] [longtitude : 2.5] [rel_alt: 3.0]\n\
                    FrameCnt: 2, DiffTime: 40ms [latitude : 1.6] [longtitude : 2.6] [rel_alt: 3.1]\n";
        let samples = parse_embedded_text(text, 33.0);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].longitude, 2.5);
        assert_eq!(samples[0].altitude, 3.0);
        assert_eq!(samples[1].timestamp_ms, 40.0);
    }

    #[test]
    fn test_embedded_text_frame_fallback() {
        let text = "FrameCnt: 4 [lat: 1.0] [lon: 2.0]";
        let samples = parse_embedded_text(text, 50.0);

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].timestamp_ms, 150.0);
    }

    #[test]
    fn test_json_doc_groups_in_numeric_order() {
        let json = r#"[{
            "SourceFile": "a.mp4",
            "Doc1:GPSLatitude": 40.0, "Doc1:GPSLongitude": -73.0, "Doc1:GPSAltitude": 10.0,
            "Doc1:SampleTime": 0.0,
            "Doc2:GPSLatitude": 40.1, "Doc2:GPSLongitude": -73.1, "Doc2:SampleTime": "1.5 s",
            "Doc10:GPSLatitude": 41.0, "Doc10:GPSLongitude": -74.0, "Doc10:SampleTime": "0:00:09",
            "Doc2:GPSSpeed": 36.0,
            "GPSLatitude": 1.0, "GPSLongitude": 1.0
        }]"#;

        let samples = parse_json(json, 1000.0).unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].altitude, 10.0);
        assert_eq!(samples[1].timestamp_ms, 1500.0);
        assert_abs_diff_eq!(samples[1].speed.unwrap(), 10.0, epsilon = 1e-9);
        assert_eq!(samples[2].latitude, 41.0);
        assert_eq!(samples[2].timestamp_ms, 9000.0);
    }

    #[test]
    fn test_json_parallel_arrays_default_spacing() {
        let json = r#"{ "GPSLatitude": [10.0, 10.1, 10.2], "GPSLongitude": [20.0, 20.1, 20.2] }"#;
        let samples = parse_json(json, 1000.0).unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2].timestamp_ms, 2000.0);
        assert_eq!(samples[2].longitude, 20.2);
    }

    #[test]
    fn test_json_static_location() {
        let json = r#"[{ "GPSCoordinates": "40 deg 45' 28.80\" N, 73 deg 59' 7.80\" W, 15 m Above Sea Level" }]"#;
        let samples = parse_json(json, 1000.0).unwrap();

        assert_eq!(samples.len(), 1);
        assert_abs_diff_eq!(samples[0].latitude, 40.758, epsilon = 1e-9);
        assert_abs_diff_eq!(samples[0].longitude, -73.9855, epsilon = 1e-9);
        assert_eq!(samples[0].altitude, 15.0);
        assert_eq!(samples[0].timestamp_ms, 0.0);
    }

    #[test]
    fn test_static_location_forms() {
        let s = parse_static_location("40.758 -73.9855 15").unwrap();
        assert_eq!((s.latitude, s.longitude, s.altitude), (40.758, -73.9855, 15.0));

        let s = parse_static_location("+40.7580-073.9855+011.234/").unwrap();
        assert_abs_diff_eq!(s.altitude, 11.234, epsilon = 1e-9);

        assert!(parse_static_location("95.0 10.0").is_none());
    }

    #[test]
    fn test_json_malformed() {
        assert!(matches!(parse_json("42", 1000.0), Err(Error::Malformed(_))));
        assert!(matches!(parse_json("{", 1000.0), Err(Error::Json(_))));
    }
}
