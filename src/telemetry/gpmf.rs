//! Container-embedded GPS metadata stream (GoPro GPMF-style KLV records).
//!
//! Every record starts with an 8 byte header: a 4 byte tag, a type byte, a
//! per-sample size byte and a big-endian 16-bit sample count. The body is
//! `size * count` bytes padded to a 4 byte boundary. Type 0 marks a nested
//! container whose body is itself a record sequence.

use std::ffi::OsStr;
use std::path::Path;

use serde_derive::Deserialize;

use super::{tool, GpsSample};
use crate::config::ExtractorConfig;
use crate::error::{Error, Result};

const HEADER_LEN: usize = 8;
const NESTED: u8 = 0;

const LATLON_SCALE: f64 = 1e-7;
const ALT_SCALE: f64 = 1e-3;
const SPEED_SCALE: f64 = 1e-3;
const PRECISION_SCALE: f64 = 0.01;

// each GPS5 record covers one second of samples
const RECORD_SPAN_MS: f64 = 1000.0;

#[derive(Debug, Default)]
struct StreamState {
    records: usize,
    fix: Option<u32>,
    precision: Option<f64>,
}

/// Decodes one raw metadata stream into samples
pub fn parse_gpmf(data: &[u8]) -> Vec<GpsSample> {
    let mut state = StreamState::default();
    let mut samples = Vec::new();

    walk(data, &mut state, &mut samples);

    samples
}

fn walk(data: &[u8], state: &mut StreamState, out: &mut Vec<GpsSample>) {
    let mut offset = 0;

    while offset + HEADER_LEN <= data.len() {
        let header = &data[offset..offset + HEADER_LEN];
        let tag = &header[0..4];
        let kind = header[4];
        let size = header[5] as usize;
        let count = u16::from_be_bytes([header[6], header[7]]) as usize;

        let len = size * count;
        let body_start = offset + HEADER_LEN;
        let body_end = body_start + len;

        if body_end > data.len() {
            log::debug!(
                "truncated gpmf record {:?} at offset {}",
                String::from_utf8_lossy(tag),
                offset
            );
            break;
        }

        let body = &data[body_start..body_end];

        if kind == NESTED {
            walk(body, state, out);
        } else {
            match tag {
                b"GPSF" => state.fix = read_u32(body),
                b"GPSP" => {
                    state.precision = read_u16(body).map(|p| p as f64 * PRECISION_SCALE)
                }
                b"GPS5" => decode_gps5(body, size, count, state, out),
                _ => (),
            }
        }

        offset = body_start + ((len + 3) & !3);
    }
}

fn decode_gps5(
    body: &[u8],
    size: usize,
    count: usize,
    state: &mut StreamState,
    out: &mut Vec<GpsSample>,
) {
    let record = state.records;
    state.records += 1;

    if size < 16 || count == 0 {
        return;
    }

    if state.fix == Some(0) {
        log::debug!("gps5 record {} has no fix, skipped", record);
        return;
    }

    let step = RECORD_SPAN_MS / count as f64;

    for (i, chunk) in body.chunks_exact(size).enumerate() {
        let field = |n: usize| {
            let b = &chunk[n * 4..n * 4 + 4];
            i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64
        };

        let ts = record as f64 * RECORD_SPAN_MS + i as f64 * step;
        let mut sample = GpsSample::new(
            ts,
            field(0) * LATLON_SCALE,
            field(1) * LATLON_SCALE,
            field(2) * ALT_SCALE,
        );
        sample.speed = Some(field(3) * SPEED_SCALE);
        sample.accuracy = state.precision;

        if sample.has_valid_position() {
            out.push(sample);
        }
    }
}

#[inline]
fn read_u32(body: &[u8]) -> Option<u32> {
    let b = body.get(0..4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline]
fn read_u16(body: &[u8]) -> Option<u16> {
    let b = body.get(0..2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    #[serde(default)]
    codec_tag_string: Option<String>,
    #[serde(default)]
    tags: serde_json::Map<String, serde_json::Value>,
}

impl ProbeStream {
    fn is_telemetry(&self) -> bool {
        if self.codec_tag_string.as_deref() == Some("gpmd") {
            return true;
        }

        self.tags
            .get("handler_name")
            .and_then(|v| v.as_str())
            .map(|h| {
                let h = h.to_ascii_uppercase();
                h.contains("GPS") || h.contains("MET")
            })
            .unwrap_or(false)
    }
}

/// Indexes of metadata streams that look like they carry GPS
pub fn telemetry_streams(probe_json: &[u8]) -> Result<Vec<u32>> {
    let probe: ProbeOutput = serde_json::from_slice(probe_json)?;

    Ok(probe
        .streams
        .iter()
        .filter(|s| s.is_telemetry())
        .map(|s| s.index)
        .collect())
}

/// Probes the container for telemetry streams and decodes the first one that
/// yields samples
pub fn extract(video: &Path, config: &ExtractorConfig) -> Result<Vec<GpsSample>> {
    let timeout = config.tool_timeout();
    let probe_args = [
        OsStr::new("-v"),
        OsStr::new("quiet"),
        OsStr::new("-print_format"),
        OsStr::new("json"),
        OsStr::new("-show_streams"),
        video.as_os_str(),
    ];
    let probe = tool::run(&config.ffprobe, probe_args, timeout)?;

    let streams = telemetry_streams(&probe)?;
    if streams.is_empty() {
        return Ok(Vec::new());
    }

    let mut last_err = None;

    for index in streams {
        let map = format!("0:{}", index);
        let copy_args = [
            OsStr::new("-v"),
            OsStr::new("quiet"),
            OsStr::new("-y"),
            OsStr::new("-i"),
            video.as_os_str(),
            OsStr::new("-codec"),
            OsStr::new("copy"),
            OsStr::new("-map"),
            OsStr::new(&map),
            OsStr::new("-f"),
            OsStr::new("rawvideo"),
            OsStr::new("-"),
        ];
        let raw = tool::run(&config.ffmpeg, copy_args, timeout);

        match raw {
            Ok(bytes) => {
                let samples = parse_gpmf(&bytes);
                if !samples.is_empty() {
                    return Ok(samples);
                }
            }
            Err(err @ Error::ToolUnavailable(_)) => return Err(err),
            Err(err) => {
                log::warn!("metadata stream {} unreadable: {}", index, err);
                last_err = Some(err);
            }
        }
    }

    match last_err {
        Some(err) => Err(err),
        None => Ok(Vec::new()),
    }
}
