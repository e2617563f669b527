//! Coordinate text parsing shared by all telemetry formats.
//!
//! Accepts plain signed decimals (`-73.9855`), decimals with a hemisphere
//! letter (`73.9855 W`) and degrees/minutes/seconds text such as
//! `40 deg 45' 28.80" N` or `40°45'28.8"N`. S and W negate the result.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DMS: Regex = Regex::new(
        r#"^([+-]?\d+(?:\.\d+)?)\s*(?:°|º|deg|d)\s*(?:(\d+(?:\.\d+)?)\s*(?:'|′|m)\s*)?(?:(\d+(?:\.\d+)?)\s*(?:"|″|''|s)?\s*)?$"#
    )
    .unwrap();
    static ref NUMBER: Regex = Regex::new(r"[-+]?\d+(?:\.\d+)?").unwrap();
}

pub fn parse_coordinate(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let (body, negate) = split_hemisphere(text);
    let body = body.trim();

    let value = if let Ok(v) = body.parse::<f64>() {
        v
    } else {
        let caps = DMS.captures(body)?;
        let deg: f64 = caps.get(1)?.as_str().parse().ok()?;
        let min: f64 = caps.get(2).map_or(Ok(0.0), |m| m.as_str().parse()).ok()?;
        let sec: f64 = caps.get(3).map_or(Ok(0.0), |m| m.as_str().parse()).ok()?;

        let magnitude = deg.abs() + min / 60.0 + sec / 3600.0;
        if deg.is_sign_negative() {
            -magnitude
        } else {
            magnitude
        }
    };

    if !value.is_finite() {
        return None;
    }

    Some(if negate { -value.abs() } else { value })
}

/// Parses a number out of text that may carry a unit, e.g. `15m` or `12.5 m`
pub fn parse_number(text: &str) -> Option<f64> {
    NUMBER
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

#[inline]
pub fn is_valid_position(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

fn split_hemisphere(text: &str) -> (&str, bool) {
    let hemisphere = |c: char| matches!(c.to_ascii_uppercase(), 'N' | 'S' | 'E' | 'W');
    let negative = |c: char| matches!(c.to_ascii_uppercase(), 'S' | 'W');

    if let Some(last) = text.chars().last() {
        // lowercase `s` closing a full DMS value is the seconds marker
        let seconds_marker = last == 's' && DMS.is_match(text);

        if hemisphere(last) && !seconds_marker {
            return (&text[..text.len() - last.len_utf8()], negative(last));
        }
    }

    if let Some(first) = text.chars().next() {
        if hemisphere(first) {
            return (&text[first.len_utf8()..], negative(first));
        }
    }

    (text, false)
}
