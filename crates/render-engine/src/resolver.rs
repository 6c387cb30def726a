//! Frame variant resolution: one request in, one frame file out.

use std::path::{Path, PathBuf};

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use heliomovie_common::error::{MovieError, MovieResult};
use heliomovie_movie_model::FrameRequest;

use crate::sequencer::FrameSlot;
use crate::source::PixelSource;
use crate::variant::{
    FrameImage, FrameVariant, ImageVariant, PlaceholderVariant, RenderedVariant, VariantKind,
};
use crate::watermark::Watermark;

/// Rendering options shared by every frame of a job.
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    pub width: u32,
    pub height: u32,
    pub source: &'a dyn PixelSource,
    pub watermark: Option<&'a Watermark>,
    pub jpeg_quality: u8,
}

/// Pick the variant for `request` by ROI geometry alone.
pub fn select_variant<'a>(
    request: &'a FrameRequest,
    index: usize,
    ctx: &FrameContext<'a>,
) -> FrameVariant<'a> {
    match VariantKind::select(&request.roi) {
        VariantKind::Placeholder => FrameVariant::Placeholder(PlaceholderVariant),
        VariantKind::Rendered => FrameVariant::Rendered(RenderedVariant {
            request,
            index,
            width: ctx.width,
            height: ctx.height,
            source: ctx.source,
            watermark: ctx.watermark,
        }),
    }
}

/// Materialize the frame for `request` at `slot`, returning its path.
pub fn resolve_frame(
    request: &FrameRequest,
    slot: &FrameSlot,
    ctx: &FrameContext<'_>,
) -> MovieResult<PathBuf> {
    let variant = select_variant(request, slot.index, ctx);
    tracing::trace!(
        index = slot.index,
        variant = variant.kind().as_str(),
        timestamp = request.timestamp.as_deref().unwrap_or(""),
        "Resolving frame"
    );

    let image = variant.build()?;
    write_frame(&image, &slot.path, ctx.jpeg_quality)?;
    Ok(slot.path.clone())
}

/// Encode `image` as JPEG at `path`; transparent areas flatten to black.
pub fn write_frame(image: &FrameImage, path: &Path, quality: u8) -> MovieResult<()> {
    let rgb: RgbImage = image.convert();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .map_err(|e| MovieError::frame_write(path, format!("JPEG encoding failed: {e}")))?;
    std::fs::write(path, bytes).map_err(|e| MovieError::frame_write(path, e.to_string()))
}
