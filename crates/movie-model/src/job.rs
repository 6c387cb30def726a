//! Movie job descriptors.
//!
//! A job is accepted from the external scheduler as JSON and describes
//! every frame of one movie plus the profiles to encode it with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::profile::ProfileKind;
use crate::roi::{PixelOffset, RegionOfInterest};

/// One requested timestamp of a movie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRequest {
    /// Region to render.
    pub roi: RegionOfInterest,

    /// Instrument/detector hierarchy, e.g. `["SDO", "AIA", "AIA", "171"]`.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Solar disk center offset within the source tile.
    #[serde(default)]
    pub pixel_center_offset: PixelOffset,

    /// Decoded tile supplied by the decode layer.
    #[serde(default)]
    pub source: Option<PathBuf>,

    /// Observation time (ISO 8601), informational only.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl FrameRequest {
    pub fn new(roi: RegionOfInterest) -> Self {
        Self {
            roi,
            labels: Vec::new(),
            pixel_center_offset: PixelOffset::default(),
            source: None,
            timestamp: None,
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_offset(mut self, offset: PixelOffset) -> Self {
        self.pixel_center_offset = offset;
        self
    }

    /// Datasource label as shown in watermarks (non-empty labels, space separated).
    pub fn display_label(&self) -> String {
        self.labels
            .iter()
            .map(|label| label.trim())
            .filter(|label| !label.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A single movie render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieJob {
    /// Job identifier; used in artifact names.
    pub id: String,

    /// Frames per second.
    pub frame_rate: u32,

    /// Output width in pixels.
    pub width: u32,

    /// Output height in pixels.
    pub height: u32,

    /// Ordered frames, one per timestamp.
    pub frames: Vec<FrameRequest>,

    /// Profiles to produce.
    #[serde(default = "default_profiles")]
    pub profiles: Vec<ProfileKind>,

    /// Per-invocation encoder timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Longest accepted job id. Ids appear in directory and file names, which
/// most filesystems cap at 255 bytes.
pub const MAX_JOB_ID_LEN: usize = 128;

fn default_profiles() -> Vec<ProfileKind> {
    ProfileKind::ALL.to_vec()
}

/// Errors that can occur when loading or validating a job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid job: {message}")]
    ValidationError { message: String },
}

impl MovieJob {
    /// Load a job descriptor from a JSON file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, JobError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| JobError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let job: MovieJob = serde_json::from_str(&json).map_err(|e| JobError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        job.validate()?;
        Ok(job)
    }

    /// Check the descriptor is renderable.
    pub fn validate(&self) -> Result<(), JobError> {
        let invalid = |message: String| Err(JobError::ValidationError { message });

        if self.id.is_empty()
            || !self
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return invalid(format!(
                "job id {:?} must be non-empty and contain only [A-Za-z0-9_-]",
                self.id
            ));
        }
        if self.id.len() > MAX_JOB_ID_LEN {
            return invalid(format!(
                "job id is {} characters long; the limit is {MAX_JOB_ID_LEN}",
                self.id.len()
            ));
        }
        if self.frame_rate == 0 {
            return invalid("frame rate must be non-zero".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return invalid("output width/height must be non-zero".to_string());
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return invalid(
                "output width/height must be even (required for yuv420p output)".to_string(),
            );
        }
        if self.frames.is_empty() {
            return invalid("job has no frames".to_string());
        }
        if self.profiles.is_empty() {
            return invalid("job requests no profiles".to_string());
        }
        if self.timeout_secs == Some(0) {
            return invalid("timeout must be non-zero".to_string());
        }
        Ok(())
    }

    /// Requested profiles, de-duplicated, in production order.
    pub fn requested_profiles(&self) -> Vec<ProfileKind> {
        let mut profiles = self.profiles.clone();
        profiles.sort();
        profiles.dedup();
        profiles
    }

    /// Encoder timeout for this job, falling back to `default`.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }
}
