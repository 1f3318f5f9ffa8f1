//! Gaussian blur of a rectangular region, composited back in place.

use crate::types::{Rect, ResolvedRegion};
use image::imageops;
use image::RgbaImage;

/// Gaussian sigma applied to blurred regions, in pixels.
pub const BLUR_SIGMA: f32 = 10.0;

/// What [`blur_region`] did to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurStep {
    Blurred(Rect),
    /// The region was degenerate; no pixel was touched.
    Skipped,
}

/// Blur `region` of `image` in place.
///
/// The blurred block overwrites the original pixels, alpha included, with a
/// hard edge at the rectangle boundary. Everything outside the rectangle is
/// left untouched. Degenerate regions are skipped without error.
pub fn blur_region(image: &mut RgbaImage, region: &ResolvedRegion, sigma: f32) -> BlurStep {
    let Some(rect) = region.rect() else {
        tracing::warn!(?region, "blur region is empty after clamping; image left unmodified");
        return BlurStep::Skipped;
    };

    let patch = imageops::crop_imm(&*image, rect.x, rect.y, rect.width, rect.height).to_image();
    let blurred = imageops::blur(&patch, sigma);
    imageops::replace(image, &blurred, i64::from(rect.x), i64::from(rect.y));

    tracing::debug!(?rect, sigma, "blurred region");
    BlurStep::Blurred(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Checkerboard with a translucent stripe, so blur visibly changes pixels.
    fn pattern(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = if (x / 2 + y / 2) % 2 == 0 { 255 } else { 0 };
            let a = if y % 7 == 0 { 128 } else { 255 };
            Rgba([v, 255 - v, (x * 3 % 256) as u8, a])
        })
    }

    #[test]
    fn test_blur_leaves_outside_pixels_untouched() {
        let original = pattern(200, 100);
        let mut image = original.clone();
        let region = ResolvedRegion { xmin: 20, ymin: 10, xmax: 60, ymax: 50 };

        let step = blur_region(&mut image, &region, BLUR_SIGMA);
        let rect = Rect { x: 20, y: 10, width: 40, height: 40 };
        assert_eq!(step, BlurStep::Blurred(rect));

        let mut changed_inside = false;
        for (x, y, pixel) in image.enumerate_pixels() {
            if rect.contains(x, y) {
                changed_inside |= pixel != original.get_pixel(x, y);
            } else {
                assert_eq!(pixel, original.get_pixel(x, y), "pixel ({x}, {y}) outside region changed");
            }
        }
        assert!(changed_inside, "blur should modify the region");
    }

    #[test]
    fn test_blur_smooths_region() {
        let original = pattern(64, 64);
        let mut image = original.clone();
        let region = ResolvedRegion { xmin: 0, ymin: 0, xmax: 64, ymax: 64 };
        blur_region(&mut image, &region, BLUR_SIGMA);

        // A heavy blur pulls the alternating channel toward the middle
        let center = image.get_pixel(32, 32);
        assert!(center[0] > 64 && center[0] < 192, "got {center:?}");
    }

    #[test]
    fn test_degenerate_region_is_noop() {
        let original = pattern(10, 10);
        let mut image = original.clone();
        let region = ResolvedRegion { xmin: 9, ymin: 9, xmax: 9, ymax: 9 };

        assert_eq!(blur_region(&mut image, &region, BLUR_SIGMA), BlurStep::Skipped);
        assert_eq!(image, original);
    }

    #[test]
    fn test_inverted_region_is_noop() {
        let original = pattern(30, 30);
        let mut image = original.clone();
        let region = ResolvedRegion { xmin: 20, ymin: 0, xmax: 10, ymax: 30 };

        assert_eq!(blur_region(&mut image, &region, BLUR_SIGMA), BlurStep::Skipped);
        assert_eq!(image, original);
    }

    #[test]
    fn test_single_pixel_region() {
        let original = pattern(16, 16);
        let mut image = original.clone();
        let region = ResolvedRegion { xmin: 3, ymin: 4, xmax: 4, ymax: 5 };

        let step = blur_region(&mut image, &region, BLUR_SIGMA);
        assert_eq!(step, BlurStep::Blurred(Rect { x: 3, y: 4, width: 1, height: 1 }));
        assert_eq!(image.dimensions(), (16, 16));
    }
}
