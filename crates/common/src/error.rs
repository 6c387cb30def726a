//! Error types shared across Heliomovie crates.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for movie assembly.
#[derive(Debug, thiserror::Error)]
pub enum MovieError {
    /// Source pixel data for a frame is missing or corrupt.
    #[error("Frame render error (frame {index}): {message}")]
    FrameRender { index: usize, message: String },

    /// A frame file could not be written into the working directory.
    #[error("Frame write error at {path}: {message}")]
    FrameWrite { path: PathBuf, message: String },

    /// Invalid geometry reached the rendered path.
    #[error("Padding computation error: {message}")]
    PaddingComputation { message: String },

    /// The external encoder could not be started or exited nonzero.
    #[error("Encoder invocation error ({profile}, status {}): {message}", display_status(.status))]
    EncoderInvocation {
        profile: String,
        status: Option<i32>,
        message: String,
    },

    /// The external encoder exceeded its allotted time and was killed.
    #[error("Encoder timeout ({profile}) after {}s", .timeout.as_secs_f64())]
    EncoderTimeout { profile: String, timeout: Duration },

    /// The job working directory could not be removed.
    #[error("Resource cleanup error at {path}: {message}")]
    ResourceCleanup { path: PathBuf, message: String },

    /// The job descriptor failed validation.
    #[error("Invalid job: {message}")]
    InvalidJob { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The job was cancelled before it completed.
    #[error("Job cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using MovieError.
pub type MovieResult<T> = Result<T, MovieError>;

fn display_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

impl MovieError {
    pub fn frame_render(index: usize, msg: impl Into<String>) -> Self {
        Self::FrameRender {
            index,
            message: msg.into(),
        }
    }

    pub fn frame_write(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::FrameWrite {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn padding(msg: impl Into<String>) -> Self {
        Self::PaddingComputation {
            message: msg.into(),
        }
    }

    pub fn encoder(profile: impl Into<String>, status: Option<i32>, msg: impl Into<String>) -> Self {
        Self::EncoderInvocation {
            profile: profile.into(),
            status,
            message: msg.into(),
        }
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error aborts the whole job rather than a single profile.
    pub fn is_job_fatal(&self) -> bool {
        !matches!(
            self,
            Self::EncoderInvocation { .. } | Self::EncoderTimeout { .. }
        )
    }
}
