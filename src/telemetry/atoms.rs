//! Manual scan of the container box hierarchy for location atoms.
//!
//! Boxes are `u32` big-endian size + 4 byte type (size 1 means a 64-bit size
//! follows, size 0 means "to the end of the parent"). Known containers are
//! descended into up to a depth bound, everything else is skipped by size, so
//! large media payloads are never read.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use super::GpsSample;
use crate::error::Result;

const LOCATION: &[u8; 4] = b"\xA9xyz";
// same box as written by tools that substitute `@` for the copyright sign
const LOCATION_ASCII: &[u8; 4] = b"@xyz";
const CONTAINERS: [&[u8; 4]; 10] = [
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"udta", b"meta", b"ilst", b"edts", b"dinf",
];

// location payloads are a few dozen bytes
const MAX_PAYLOAD: u64 = 1024;

lazy_static! {
    static ref ISO6709: Regex =
        Regex::new(r"^([+-]\d+(?:\.\d+)?)([+-]\d+(?:\.\d+)?)([+-]\d+(?:\.\d+)?)?").unwrap();
}

pub fn scan_file<P: AsRef<Path>>(path: P, max_depth: usize) -> Result<Vec<GpsSample>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    scan(&mut reader, len, max_depth)
}

pub fn scan<R: Read + Seek>(reader: &mut R, len: u64, max_depth: usize) -> Result<Vec<GpsSample>> {
    let mut samples = Vec::new();

    scan_range(reader, 0, len, 0, max_depth, &mut samples)?;

    Ok(samples)
}

fn scan_range<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
    depth: usize,
    max_depth: usize,
    out: &mut Vec<GpsSample>,
) -> Result<()> {
    let mut offset = start;

    while offset + 8 <= end {
        reader.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        if reader.read_exact(&mut header).is_err() {
            break;
        }

        let kind = [header[4], header[5], header[6], header[7]];
        let declared = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let (size, header_len) = match declared {
            0 => (end - offset, 8),
            1 => {
                let mut large = [0u8; 8];
                if reader.read_exact(&mut large).is_err() {
                    break;
                }
                (u64::from_be_bytes(large), 16)
            }
            n => (n as u64, 8),
        };

        if size < header_len || offset.saturating_add(size) > end {
            log::debug!(
                "malformed box {:?} at offset {} (size {})",
                String::from_utf8_lossy(&kind),
                offset,
                size
            );
            break;
        }

        let body_start = offset + header_len;
        let body_end = offset + size;

        if &kind == LOCATION || &kind == LOCATION_ASCII {
            let mut payload = vec![0u8; (body_end - body_start).min(MAX_PAYLOAD) as usize];
            if reader.read_exact(&mut payload).is_err() {
                break;
            }

            match decode_location(&payload) {
                Some(sample) => out.push(sample),
                None => log::debug!("unreadable location box at offset {}", offset),
            }
        } else if CONTAINERS.contains(&&kind) && depth < max_depth {
            let mut child_start = body_start;

            // full-box `meta` carries 4 bytes of version/flags before its children
            if &kind == b"meta" {
                let mut flags = [0u8; 4];
                if reader.read_exact(&mut flags).is_ok() && flags == [0; 4] {
                    child_start += 4;
                }
            }

            scan_range(reader, child_start, body_end, depth + 1, max_depth, out)?;
        }

        offset = body_end;
    }

    Ok(())
}

/// Decodes a location payload: ISO-6709 text (optionally behind the
/// QuickTime length/language prefix) or three big-endian `f32`s
fn decode_location(payload: &[u8]) -> Option<GpsSample> {
    let text_start = (0..payload.len().min(8)).find(|&pos| {
        matches!(payload[pos], b'+' | b'-')
            && payload[pos..]
                .iter()
                .all(|b| b.is_ascii_graphic() || b.is_ascii_whitespace() || *b == 0)
    });

    if let Some(pos) = text_start {
        return parse_iso6709(&String::from_utf8_lossy(&payload[pos..]));
    }

    if payload.len() >= 12 {
        let f = |i: usize| {
            let b = &payload[i..i + 4];
            f32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64
        };

        let sample = GpsSample::new(0.0, f(0), f(4), f(8));
        if sample.has_valid_position() && sample.altitude.is_finite() {
            return Some(sample);
        }
    }

    None
}

/// Parses ISO-6709 signed coordinates: `+40.7580-073.9855+011.234/`.
///
/// Latitude/longitude may be degrees (`±DD.D`/`±DDD.D`), degrees and minutes
/// (`±DDMM.M`/`±DDDMM.M`) or degrees, minutes and seconds.
pub fn parse_iso6709(text: &str) -> Option<GpsSample> {
    let text = text.trim_start_matches(|c: char| c.is_whitespace() || c == '\0');
    let caps = ISO6709.captures(text)?;

    let lat = iso_component(caps.get(1)?.as_str(), 2)?;
    let lon = iso_component(caps.get(2)?.as_str(), 3)?;
    let alt = caps
        .get(3)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0);

    let sample = GpsSample::new(0.0, lat, lon, alt);
    if sample.has_valid_position() {
        Some(sample)
    } else {
        None
    }
}

fn iso_component(text: &str, deg_digits: usize) -> Option<f64> {
    let negative = text.starts_with('-');
    let body = &text[1..];
    let int_digits = body.find('.').unwrap_or(body.len());

    let value: f64 = body.parse().ok()?;
    let magnitude = if int_digits == deg_digits + 2 {
        let deg = (value / 100.0).trunc();
        deg + (value - deg * 100.0) / 60.0
    } else if int_digits == deg_digits + 4 {
        let deg = (value / 10_000.0).trunc();
        let min = ((value - deg * 10_000.0) / 100.0).trunc();
        deg + min / 60.0 + (value - deg * 10_000.0 - min * 100.0) / 3600.0
    } else {
        value
    };

    Some(if negative { -magnitude } else { magnitude })
}
