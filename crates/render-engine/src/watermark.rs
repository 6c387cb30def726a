//! Watermark overlay: datasource label text plus an optional logo.

use std::fmt;

use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;

use heliomovie_common::config::WatermarkConfig;
use heliomovie_common::error::{MovieError, MovieResult};

const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const SHADOW_COLOR: Rgba<u8> = Rgba([0, 0, 0, 200]);
const MIN_TEXT_PX: f32 = 8.0;

/// Loaded watermark resources, shared read-only across frames.
pub struct Watermark {
    font: Option<FontVec>,
    logo: Option<RgbaImage>,
    text_scale: f32,
}

impl fmt::Debug for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watermark")
            .field("font", &self.font.is_some())
            .field("logo", &self.logo.as_ref().map(|l| l.dimensions()))
            .field("text_scale", &self.text_scale)
            .finish()
    }
}

impl Watermark {
    /// Load the configured resources. Returns `None` when watermarking is
    /// disabled or nothing is configured to draw.
    pub fn load(config: &WatermarkConfig) -> MovieResult<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let font = match &config.font_path {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    MovieError::config(format!("cannot read font {}: {e}", path.display()))
                })?;
                let font = FontVec::try_from_vec(bytes).map_err(|e| {
                    MovieError::config(format!("invalid font {}: {e}", path.display()))
                })?;
                Some(font)
            }
            None => None,
        };

        let logo = match &config.logo_path {
            Some(path) => Some(
                image::open(path)
                    .map_err(|e| {
                        MovieError::config(format!("cannot read logo {}: {e}", path.display()))
                    })?
                    .to_rgba8(),
            ),
            None => None,
        };

        if font.is_none() && logo.is_none() {
            tracing::warn!("Watermark enabled but neither font_path nor logo_path is set");
            return Ok(None);
        }

        Ok(Some(Self {
            font,
            logo,
            text_scale: config.text_scale,
        }))
    }

    /// Logo-only watermark.
    pub fn from_logo(logo: RgbaImage, text_scale: f32) -> Self {
        Self {
            font: None,
            logo: Some(logo),
            text_scale,
        }
    }

    /// Draw `label` in the bottom-left corner and the logo in the bottom-right.
    pub fn apply(&self, canvas: &mut RgbaImage, label: &str) {
        let (width, height) = canvas.dimensions();
        let text_px = (height as f32 * self.text_scale).max(MIN_TEXT_PX);
        let margin = (text_px * 0.5).round() as i64;

        if let (Some(font), false) = (&self.font, label.is_empty()) {
            let scale = PxScale::from(text_px);
            let x = margin as i32;
            let y = height as i32 - margin as i32 - text_px.ceil() as i32;
            draw_text_mut(canvas, SHADOW_COLOR, x + 1, y + 1, scale, font, label);
            draw_text_mut(canvas, TEXT_COLOR, x, y, scale, font, label);
        }

        if let Some(logo) = &self.logo {
            let logo = fit_logo(logo, (text_px * 2.0).round() as u32, width / 4);
            let x = width as i64 - logo.width() as i64 - margin;
            let y = height as i64 - logo.height() as i64 - margin;
            imageops::overlay(canvas, &logo, x, y);
        }
    }
}

/// Downscale the logo to at most `max_h` tall and `max_w` wide.
fn fit_logo(logo: &RgbaImage, max_h: u32, max_w: u32) -> RgbaImage {
    let (w, h) = logo.dimensions();
    let (max_w, max_h) = (max_w.max(1), max_h.max(1));
    if w <= max_w && h <= max_h {
        return logo.clone();
    }
    let factor = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let new_w = ((w as f64 * factor).round() as u32).max(1);
    let new_h = ((h as f64 * factor).round() as u32).max(1);
    imageops::resize(logo, new_w, new_h, FilterType::Triangle)
}
