//! Pixel sources: where decoded tile data for rendered frames comes from.

use std::path::{Path, PathBuf};

use image::DynamicImage;

use heliomovie_movie_model::FrameRequest;

/// Why a pixel source could not supply data.
#[derive(Debug, thiserror::Error)]
pub enum PixelSourceError {
    #[error("no source data available for this frame")]
    Unavailable,

    #[error("source data at {path} is unreadable: {message}")]
    Unreadable { path: PathBuf, message: String },
}

/// Supplies decoded, cropped pixel data for one frame request.
pub trait PixelSource: Send + Sync {
    fn fetch(&self, request: &FrameRequest) -> Result<DynamicImage, PixelSourceError>;
}

/// Reads the pre-decoded tile named by each request's `source` path.
///
/// Relative paths are resolved against `base_dir`.
#[derive(Debug, Clone)]
pub struct FilePixelSource {
    base_dir: PathBuf,
}

impl FilePixelSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl PixelSource for FilePixelSource {
    fn fetch(&self, request: &FrameRequest) -> Result<DynamicImage, PixelSourceError> {
        let path = request
            .source
            .as_deref()
            .map(|p| self.resolve(p))
            .ok_or(PixelSourceError::Unavailable)?;

        image::open(&path).map_err(|e| PixelSourceError::Unreadable {
            path,
            message: e.to_string(),
        })
    }
}
