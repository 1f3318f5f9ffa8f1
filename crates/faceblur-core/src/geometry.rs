//! Conversions between absolute pixel boxes and normalized boxes.

use crate::types::{NormalizedBox, PixelBox, ResolvedRegion};

/// Decimal digits kept in normalized coordinates.
pub const NORMALIZED_PRECISION: i32 = 2;

/// Convert an absolute box into fractions of `width` × `height`.
///
/// Each coordinate is rounded to [`NORMALIZED_PRECISION`] digits, so a round
/// trip through [`resolve_region`] is only accurate to about one percent of
/// the image size. Both dimensions must be non-zero.
pub fn normalize(bbox: &PixelBox, width: u32, height: u32) -> NormalizedBox {
    let w = f64::from(width);
    let h = f64::from(height);
    NormalizedBox {
        xmin: round_to(f64::from(bbox.xmin) / w, NORMALIZED_PRECISION),
        ymin: round_to(f64::from(bbox.ymin) / h, NORMALIZED_PRECISION),
        xmax: round_to(f64::from(bbox.xmax) / w, NORMALIZED_PRECISION),
        ymax: round_to(f64::from(bbox.ymax) / h, NORMALIZED_PRECISION),
    }
}

/// Map a normalized box back onto a `width` × `height` image.
///
/// Coordinates are scaled, truncated toward zero, then clamped so the
/// minimums are non-negative and the maximums do not exceed the image. Input
/// outside [0, 1] is accepted. The result may be degenerate; check
/// [`ResolvedRegion::is_valid`] before touching pixels.
pub fn resolve_region(bbox: &NormalizedBox, width: u32, height: u32) -> ResolvedRegion {
    let w = f64::from(width);
    let h = f64::from(height);

    let region = ResolvedRegion {
        xmin: to_pixel(bbox.xmin * w).max(0),
        ymin: to_pixel(bbox.ymin * h).max(0),
        xmax: to_pixel(bbox.xmax * w).min(i64::from(width)),
        ymax: to_pixel(bbox.ymax * h).min(i64::from(height)),
    };

    tracing::debug!(
        ?bbox,
        width,
        height,
        ?region,
        valid = region.is_valid(),
        "resolved blur region"
    );

    region
}

/// Truncate toward zero. NaN maps to 0 and infinities saturate.
fn to_pixel(value: f64) -> i64 {
    value.trunc() as i64
}

/// Halves round to even, so 0.125 becomes 0.12 and 0.375 becomes 0.38.
fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round_ties_even() / factor
}
