use nalgebra as na;
use num_traits::Float;

/// Median of the finite values of a set, averaging the two middle elements
/// for even counts. `None` when no value is finite.
pub fn median<T: Float>(values: &[T]) -> Option<T> {
    let mut sorted: Vec<T> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }

    // total over finite values
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        let two = T::one() + T::one();
        Some((sorted[mid - 1] + sorted[mid]) / two)
    } else {
        Some(sorted[mid])
    }
}

/// Element-wise median of a set of 2d vectors
pub fn median_vector(vectors: &[na::Vector2<f32>]) -> Option<na::Vector2<f32>> {
    let xs: Vec<f32> = vectors.iter().map(|v| v.x).collect();
    let ys: Vec<f32> = vectors.iter().map(|v| v.y).collect();

    Some(na::Vector2::new(median(&xs)?, median(&ys)?))
}

#[inline]
pub fn lerp<T: Float>(a: T, b: T, factor: T) -> T {
    a + (b - a) * factor
}

/// Wraps an angle in degrees into [0, 360)
#[inline]
pub fn normalize_heading<T: Float>(deg: T) -> T {
    let full = T::from(360.0).unwrap_or_else(T::zero);
    let wrapped = deg % full;

    let wrapped = if wrapped < T::zero() {
        wrapped + full
    } else {
        wrapped
    };

    // tiny negatives round up to `full`
    if wrapped >= full {
        T::zero()
    } else {
        wrapped
    }
}

/// Signed difference `to - from` along the shorter arc, in [-180, 180)
#[inline]
pub fn heading_delta<T: Float>(from: T, to: T) -> T {
    let half = T::from(180.0).unwrap_or_else(T::zero);

    normalize_heading(to - from + half) - half
}

/// Interpolates a heading along the shorter arc between `from` and `to`
#[inline]
pub fn lerp_heading<T: Float>(from: T, to: T, factor: T) -> T {
    normalize_heading(from + heading_delta(from, to) * factor)
}
