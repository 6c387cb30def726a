//! Image variants: the ways a single movie frame can be produced.
//!
//! The set is closed. [`VariantKind::select`] walks a predicate table over
//! the ROI geometry; the first matching entry wins and the rendered
//! variant is the fallback.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::Serialize;

use heliomovie_common::error::{MovieError, MovieResult};
use heliomovie_movie_model::{FrameRequest, RegionOfInterest};

use crate::source::PixelSource;
use crate::watermark::Watermark;

/// In-memory frame before it is written to disk.
pub type FrameImage = RgbaImage;

/// Edge length of the transparent placeholder frame.
pub const PLACEHOLDER_SIZE: u32 = 512;

/// Anchor from which padding offsets are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gravity {
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
}

impl Gravity {
    pub fn as_str(self) -> &'static str {
        match self {
            Gravity::NorthWest => "northwest",
            Gravity::North => "north",
            Gravity::NorthEast => "northeast",
            Gravity::West => "west",
            Gravity::Center => "center",
            Gravity::East => "east",
            Gravity::SouthWest => "southwest",
            Gravity::South => "south",
            Gravity::SouthEast => "southeast",
        }
    }

    /// Top-left position of the anchor given the free space on each axis.
    fn anchor(self, free_w: i64, free_h: i64) -> (i64, i64) {
        let x = match self {
            Gravity::NorthWest | Gravity::West | Gravity::SouthWest => 0,
            Gravity::North | Gravity::Center | Gravity::South => free_w / 2,
            Gravity::NorthEast | Gravity::East | Gravity::SouthEast => free_w,
        };
        let y = match self {
            Gravity::NorthWest | Gravity::North | Gravity::NorthEast => 0,
            Gravity::West | Gravity::Center | Gravity::East => free_h / 2,
            Gravity::SouthWest | Gravity::South | Gravity::SouthEast => free_h,
        };
        (x, y)
    }
}

/// Where and how large frame content sits on the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Padding {
    pub gravity: Gravity,
    /// Content width in pixels. The placeholder reports the raw ROI width,
    /// which may be zero or negative.
    pub width: f64,
    /// Content height in pixels.
    pub height: f64,
    pub offset_x: i64,
    pub offset_y: i64,
}

impl Padding {
    /// Absolute top-left of the content on a `canvas_w` x `canvas_h` canvas.
    pub fn placement(&self, canvas_w: u32, canvas_h: u32) -> (i64, i64) {
        let free_w = canvas_w as i64 - self.width.round() as i64;
        let free_h = canvas_h as i64 - self.height.round() as i64;
        let (x, y) = self.gravity.anchor(free_w, free_h);
        (x + self.offset_x, y + self.offset_y)
    }
}

/// Capability shared by every image variant.
pub trait ImageVariant {
    /// Produce the frame image.
    fn build(&self) -> MovieResult<FrameImage>;

    /// Content placement for `roi` on the output canvas.
    fn compute_padding(&self, roi: &RegionOfInterest) -> MovieResult<Padding>;

    /// Text composited as the watermark label; empty for none.
    fn watermark_name(&self) -> String;
}

/// Which variant a frame request maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Placeholder,
    Rendered,
}

type RoiPredicate = fn(&RegionOfInterest) -> bool;

/// Ordered selection rules; unmatched requests are rendered.
const SELECTION_TABLE: &[(RoiPredicate, VariantKind)] = &[(
    RegionOfInterest::is_degenerate as RoiPredicate,
    VariantKind::Placeholder,
)];

impl VariantKind {
    pub fn select(roi: &RegionOfInterest) -> Self {
        SELECTION_TABLE
            .iter()
            .find(|(matches, _)| matches(roi))
            .map(|(_, kind)| *kind)
            .unwrap_or(VariantKind::Rendered)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariantKind::Placeholder => "placeholder",
            VariantKind::Rendered => "rendered",
        }
    }
}

/// Composites decoded source pixels onto the output canvas.
pub struct RenderedVariant<'a> {
    pub request: &'a FrameRequest,
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub source: &'a dyn PixelSource,
    pub watermark: Option<&'a Watermark>,
}

impl ImageVariant for RenderedVariant<'_> {
    fn build(&self) -> MovieResult<FrameImage> {
        let padding = self.compute_padding(&self.request.roi)?;

        let pixels = self
            .source
            .fetch(self.request)
            .map_err(|e| MovieError::frame_render(self.index, e.to_string()))?;
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(MovieError::frame_render(
                self.index,
                "source pixel data is empty",
            ));
        }

        let content_w = padding.width.round() as u32;
        let content_h = padding.height.round() as u32;
        let scaled = imageops::resize(
            &pixels.to_rgba8(),
            content_w,
            content_h,
            FilterType::Lanczos3,
        );

        let mut canvas = FrameImage::new(self.width, self.height);
        let (x, y) = padding.placement(self.width, self.height);
        imageops::replace(&mut canvas, &scaled, x, y);

        if let Some(watermark) = self.watermark {
            watermark.apply(&mut canvas, &self.watermark_name());
        }

        Ok(canvas)
    }

    /// Fit the ROI inside the output canvas, centered, then nudge it by the
    /// negated pixel-center offset without letting content leave the canvas.
    fn compute_padding(&self, roi: &RegionOfInterest) -> MovieResult<Padding> {
        if self.width == 0 || self.height == 0 {
            return Err(MovieError::padding(format!(
                "output geometry {}x{} must be positive",
                self.width, self.height
            )));
        }
        let (roi_w, roi_h) = (roi.width(), roi.height());
        if !(roi_w > 0.0 && roi_h > 0.0) {
            return Err(MovieError::padding(format!(
                "rendered frame needs a positive ROI, got {roi_w}x{roi_h}"
            )));
        }

        let canvas_w = self.width as f64;
        let canvas_h = self.height as f64;
        let factor = (canvas_w / roi_w).min(canvas_h / roi_h);

        let content_w = (roi_w * factor).round().clamp(1.0, canvas_w);
        let content_h = (roi_h * factor).round().clamp(1.0, canvas_h);
        let free_w = self.width as i64 - content_w as i64;
        let free_h = self.height as i64 - content_h as i64;

        let offset = self.request.pixel_center_offset;
        let nudge = |shift: f64, free: i64| -> i64 {
            let base = free / 2;
            let shift = if shift.is_finite() { shift } else { 0.0 };
            let shift = shift.clamp(-(free as f64), free as f64).round() as i64;
            (base + shift).clamp(0, free) - base
        };

        Ok(Padding {
            gravity: Gravity::Center,
            width: content_w,
            height: content_h,
            offset_x: nudge(-offset.x * factor, free_w),
            offset_y: nudge(-offset.y * factor, free_h),
        })
    }

    fn watermark_name(&self) -> String {
        self.request.display_label()
    }
}

/// Stand-in for frames whose ROI does not intersect any data.
pub struct PlaceholderVariant;

impl ImageVariant for PlaceholderVariant {
    fn build(&self) -> MovieResult<FrameImage> {
        Ok(FrameImage::new(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE))
    }

    fn compute_padding(&self, roi: &RegionOfInterest) -> MovieResult<Padding> {
        // Reported for compatibility; the canvas is always PLACEHOLDER_SIZE.
        Ok(Padding {
            gravity: Gravity::NorthWest,
            width: roi.width(),
            height: roi.height(),
            offset_x: 0,
            offset_y: 0,
        })
    }

    fn watermark_name(&self) -> String {
        String::new()
    }
}

/// The closed set of variants a frame can resolve to.
pub enum FrameVariant<'a> {
    Rendered(RenderedVariant<'a>),
    Placeholder(PlaceholderVariant),
}

impl FrameVariant<'_> {
    pub fn kind(&self) -> VariantKind {
        match self {
            FrameVariant::Rendered(_) => VariantKind::Rendered,
            FrameVariant::Placeholder(_) => VariantKind::Placeholder,
        }
    }

    fn inner(&self) -> &dyn ImageVariant {
        match self {
            FrameVariant::Rendered(variant) => variant,
            FrameVariant::Placeholder(variant) => variant,
        }
    }
}

impl ImageVariant for FrameVariant<'_> {
    fn build(&self) -> MovieResult<FrameImage> {
        self.inner().build()
    }

    fn compute_padding(&self, roi: &RegionOfInterest) -> MovieResult<Padding> {
        self.inner().compute_padding(roi)
    }

    fn watermark_name(&self) -> String {
        self.inner().watermark_name()
    }
}
