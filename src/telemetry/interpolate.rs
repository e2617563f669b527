use super::GpsSample;
use crate::math::{lerp, lerp_heading};

/// Telemetry fix for a video frame, see [`interpolate_at`]
pub fn interpolate(samples: &[GpsSample], frame: u32, fps: f64) -> Option<GpsSample> {
    if fps <= 0.0 || !fps.is_finite() {
        return None;
    }

    interpolate_at(samples, frame as f64 / fps * 1000.0, Some(frame))
}

/// Telemetry fix at `target_ms`.
///
/// A single sample is broadcast to every query. Otherwise the closest samples
/// at or before and at or after the target are blended linearly (heading
/// along the shorter arc); past either end of the sequence the nearest
/// sample is held. Satellites and accuracy always come from the earlier
/// sample. The result is stamped with the query time and frame.
pub fn interpolate_at(samples: &[GpsSample], target_ms: f64, frame: Option<u32>) -> Option<GpsSample> {
    match samples {
        [] => return None,
        [only] => return Some(only.restamped(target_ms, frame)),
        _ => (),
    }

    let mut lower: Option<&GpsSample> = None;
    let mut upper: Option<&GpsSample> = None;

    for s in samples {
        if s.timestamp_ms <= target_ms && lower.map_or(true, |l| s.timestamp_ms > l.timestamp_ms) {
            lower = Some(s);
        }

        if s.timestamp_ms >= target_ms && upper.map_or(true, |u| s.timestamp_ms < u.timestamp_ms) {
            upper = Some(s);
        }
    }

    match (lower, upper) {
        (Some(lo), _) if lo.timestamp_ms == target_ms => Some(lo.restamped(target_ms, frame)),
        (Some(lo), Some(hi)) => {
            let span = hi.timestamp_ms - lo.timestamp_ms;
            let factor = if span > 0.0 {
                (target_ms - lo.timestamp_ms) / span
            } else {
                0.0
            };

            let speed = match (lo.speed, hi.speed) {
                (Some(a), Some(b)) => Some(lerp(a, b, factor)),
                (a, _) => a,
            };

            let heading = match (lo.heading, hi.heading) {
                (Some(a), Some(b)) => Some(lerp_heading(a, b, factor)),
                (a, _) => a,
            };

            Some(GpsSample {
                timestamp_ms: target_ms,
                latitude: lerp(lo.latitude, hi.latitude, factor),
                longitude: lerp(lo.longitude, hi.longitude, factor),
                altitude: lerp(lo.altitude, hi.altitude, factor),
                speed,
                heading,
                satellites: lo.satellites,
                accuracy: lo.accuracy,
                frame,
            })
        }
        (Some(edge), None) | (None, Some(edge)) => Some(edge.restamped(target_ms, frame)),
        // unreachable with finite timestamps
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample(ts: f64, lat: f64, lon: f64, alt: f64) -> GpsSample {
        GpsSample::new(ts, lat, lon, alt)
    }

    #[test]
    fn test_empty() {
        assert!(interpolate(&[], 10, 30.0).is_none());
    }

    #[test]
    fn test_single_sample_broadcast() {
        let mut only = sample(0.0, 40.758, -73.9855, 15.0);
        only.speed = Some(3.0);
        only.heading = Some(90.0);
        only.satellites = Some(12);

        let got = interpolate(&[only], 300, 30.0).unwrap();

        assert_eq!(got.latitude, only.latitude);
        assert_eq!(got.longitude, only.longitude);
        assert_eq!(got.altitude, only.altitude);
        assert_eq!(got.speed, Some(3.0));
        assert_eq!(got.heading, Some(90.0));
        assert_eq!(got.satellites, Some(12));
        assert_eq!(got.timestamp_ms, 10_000.0);
        assert_eq!(got.frame, Some(300));
    }

    #[test]
    fn test_linear_between_bounds() {
        let a = sample(0.0, 40.0, -74.0, 10.0);
        let b = sample(1000.0, 41.0, -73.0, 20.0);

        for frame in 1..30 {
            let got = interpolate(&[a, b], frame, 30.0).unwrap();

            assert!(got.latitude > a.latitude && got.latitude < b.latitude);
            assert!(got.longitude > a.longitude && got.longitude < b.longitude);
            assert!(got.altitude > a.altitude && got.altitude < b.altitude);
        }

        let mid = interpolate_at(&[a, b], 250.0, None).unwrap();
        assert_abs_diff_eq!(mid.latitude, 40.25, epsilon = 1e-12);
        assert_abs_diff_eq!(mid.altitude, 12.5, epsilon = 1e-12);
    }

    #[test]
    fn test_unordered_input() {
        let a = sample(0.0, 0.0, 0.0, 0.0);
        let b = sample(2000.0, 2.0, 2.0, 2.0);
        let c = sample(1000.0, 1.0, 1.0, 1.0);

        let got = interpolate_at(&[b, a, c], 1500.0, None).unwrap();
        assert_abs_diff_eq!(got.latitude, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_heading_shorter_arc() {
        let mut a = sample(0.0, 0.0, 0.0, 0.0);
        let mut b = sample(1000.0, 0.0, 0.0, 0.0);
        a.heading = Some(350.0);
        b.heading = Some(10.0);

        let h = interpolate_at(&[a, b], 500.0, None).unwrap().heading.unwrap();
        assert!(h < 1e-9 || 360.0 - h < 1e-9, "heading {}", h);
    }

    #[test]
    fn test_carried_fields_from_lower() {
        let mut a = sample(0.0, 0.0, 0.0, 0.0);
        let mut b = sample(1000.0, 1.0, 1.0, 1.0);
        a.satellites = Some(7);
        a.accuracy = Some(2.5);
        a.speed = Some(1.0);
        b.satellites = Some(11);
        b.accuracy = Some(0.5);
        b.speed = Some(3.0);

        let got = interpolate_at(&[a, b], 500.0, Some(15)).unwrap();

        assert_eq!(got.satellites, Some(7));
        assert_eq!(got.accuracy, Some(2.5));
        assert_abs_diff_eq!(got.speed.unwrap(), 2.0);
        assert_eq!(got.frame, Some(15));
    }

    #[test]
    fn test_exact_match_and_extrapolation() {
        let mut a = sample(1000.0, 1.0, 1.0, 1.0);
        a.heading = Some(45.0);
        let b = sample(2000.0, 2.0, 2.0, 2.0);

        let exact = interpolate_at(&[a, b], 1000.0, Some(30)).unwrap();
        assert_eq!(exact.latitude, 1.0);
        assert_eq!(exact.heading, Some(45.0));

        let before = interpolate_at(&[a, b], 0.0, Some(0)).unwrap();
        assert_eq!(before.latitude, 1.0);
        assert_eq!(before.timestamp_ms, 0.0);
        assert_eq!(before.frame, Some(0));

        let after = interpolate_at(&[a, b], 5000.0, Some(150)).unwrap();
        assert_eq!(after.latitude, 2.0);
        assert_eq!(after.timestamp_ms, 5000.0);
    }

    #[test]
    fn test_coinciding_bounds() {
        let a = sample(1000.0, 1.0, 1.0, 1.0);
        let b = sample(1000.0, 3.0, 3.0, 3.0);

        let got = interpolate_at(&[a, b], 1000.0, None).unwrap();
        assert_eq!(got.latitude, 1.0);
    }
}
