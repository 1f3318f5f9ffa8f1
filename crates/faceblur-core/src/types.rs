use serde::{Deserialize, Serialize};

/// Face bounding box in absolute pixel coordinates of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    /// Detector score for this face, 0.0 when the backend has none.
    pub confidence: f32,
}

impl PixelBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self { xmin, ymin, xmax, ymax, confidence: 0.0 }
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }
}

/// Bounding box expressed as fractions of the image width and height.
///
/// Only meaningful against the dimensions of the image it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl NormalizedBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }
}

/// Pixel rectangle resolved against a concrete image, clamped to its bounds.
///
/// Coordinates are signed: after clamping `xmax` can still sit left of
/// `xmin` (or at it), which marks the region degenerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRegion {
    pub xmin: i64,
    pub ymin: i64,
    pub xmax: i64,
    pub ymax: i64,
}

impl ResolvedRegion {
    /// True when the region has positive width and height.
    pub fn is_valid(&self) -> bool {
        self.xmax > self.xmin && self.ymax > self.ymin
    }

    /// Top-left corner and size, or `None` for a degenerate region.
    pub fn rect(&self) -> Option<Rect> {
        if !self.is_valid() {
            return None;
        }
        Some(Rect {
            x: self.xmin as u32,
            y: self.ymin as u32,
            width: (self.xmax - self.xmin) as u32,
            height: (self.ymax - self.ymin) as u32,
        })
    }
}

/// Non-empty pixel rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_box_dimensions() {
        let b = PixelBox::new(20.0, 10.0, 60.0, 50.0);
        assert_eq!(b.width(), 40.0);
        assert_eq!(b.height(), 40.0);
        assert_eq!(b.area(), 1600.0);
    }

    #[test]
    fn test_pixel_box_inverted_has_zero_area() {
        let b = PixelBox::new(60.0, 10.0, 20.0, 50.0);
        assert_eq!(b.area(), 0.0);
    }

    #[test]
    fn test_region_validity() {
        let valid = ResolvedRegion { xmin: 0, ymin: 0, xmax: 1, ymax: 1 };
        assert!(valid.is_valid());

        let zero_width = ResolvedRegion { xmin: 5, ymin: 0, xmax: 5, ymax: 10 };
        assert!(!zero_width.is_valid());
        assert!(zero_width.rect().is_none());

        let inverted = ResolvedRegion { xmin: 0, ymin: 8, xmax: 10, ymax: 2 };
        assert!(!inverted.is_valid());
    }

    #[test]
    fn test_region_rect() {
        let region = ResolvedRegion { xmin: 20, ymin: 10, xmax: 60, ymax: 50 };
        let rect = region.rect().unwrap();
        assert_eq!(rect, Rect { x: 20, y: 10, width: 40, height: 40 });
        assert!(rect.contains(20, 10));
        assert!(rect.contains(59, 49));
        assert!(!rect.contains(60, 49));
        assert!(!rect.contains(19, 10));
    }
}
