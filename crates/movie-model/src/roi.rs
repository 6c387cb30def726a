//! Region-of-interest types for frame requests.
//!
//! ROI corners are expressed in physical units (arcseconds from the solar
//! disk center); `image_scale` converts them to output pixels.

use serde::{Deserialize, Serialize};

/// A rectangular region within the source image requested for rendering.
///
/// Width and height are derived, not stored, and may legitimately be zero
/// or negative when no data intersects the requested view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    /// Top edge (physical units).
    pub top: f64,
    /// Left edge (physical units).
    pub left: f64,
    /// Bottom edge (physical units).
    pub bottom: f64,
    /// Right edge (physical units).
    pub right: f64,
    /// Physical units per pixel.
    pub image_scale: f64,
}

impl RegionOfInterest {
    pub fn new(top: f64, left: f64, bottom: f64, right: f64, image_scale: f64) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
            image_scale,
        }
    }

    /// Width in pixels: `(right - left) / image_scale`.
    ///
    /// A non-positive or non-finite scale yields `0.0`.
    pub fn width(&self) -> f64 {
        self.to_pixels(self.right - self.left)
    }

    /// Height in pixels: `(bottom - top) / image_scale`.
    pub fn height(&self) -> f64 {
        self.to_pixels(self.bottom - self.top)
    }

    /// Whether no data intersects this region.
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    fn to_pixels(&self, extent: f64) -> f64 {
        if !(self.image_scale.is_finite() && self.image_scale > 0.0) {
            return 0.0;
        }
        let pixels = extent / self.image_scale;
        if pixels.is_finite() {
            pixels
        } else {
            0.0
        }
    }
}

/// Displacement, in source pixels, of the solar disk center from the tile center.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelOffset {
    pub x: f64,
    pub y: f64,
}

impl PixelOffset {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
