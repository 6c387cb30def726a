//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{MovieError, MovieResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where finished movies are published.
    pub movies_dir: PathBuf,

    /// Root under which job-scoped working directories are created.
    pub work_dir: PathBuf,

    /// External encoder settings.
    pub encoder: EncoderConfig,

    /// Frame materialization settings.
    pub frames: FrameConfig,

    /// Watermark overlay settings.
    pub watermark: WatermarkConfig,

    /// Worker pool settings.
    pub workers: WorkerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// External encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Encoder executable (looked up on PATH when not absolute).
    pub ffmpeg_path: PathBuf,

    /// Per-invocation timeout used when a job does not supply one.
    pub default_timeout_secs: u64,
}

/// Frame materialization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// JPEG quality for frame files (1-100).
    pub jpeg_quality: u8,
}

/// Watermark overlay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Whether rendered frames carry a watermark.
    pub enabled: bool,

    /// TrueType/OpenType font used for the datasource label.
    pub font_path: Option<PathBuf>,

    /// Optional logo image composited in the bottom-right corner.
    pub logo_path: Option<PathBuf>,

    /// Label height as a fraction of the frame height.
    pub text_scale: f32,
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum number of movie jobs built at the same time.
    pub max_concurrent_jobs: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "heliomovie=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            movies_dir: dirs_default_movies(),
            work_dir: std::env::temp_dir().join("heliomovie"),
            encoder: EncoderConfig::default(),
            frames: FrameConfig::default(),
            watermark: WatermarkConfig::default(),
            workers: WorkerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            default_timeout_secs: 600,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { jpeg_quality: 90 }
    }
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            font_path: None,
            logo_path: None,
            text_scale: 0.035,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &std::path::Path) -> MovieResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> MovieResult<()> {
        if self.frames.jpeg_quality == 0 || self.frames.jpeg_quality > 100 {
            return Err(MovieError::config("frames.jpeg_quality must be in 1..=100"));
        }
        if self.encoder.default_timeout_secs == 0 {
            return Err(MovieError::config(
                "encoder.default_timeout_secs must be non-zero",
            ));
        }
        if self.workers.max_concurrent_jobs == 0 {
            return Err(MovieError::config(
                "workers.max_concurrent_jobs must be non-zero",
            ));
        }
        if !(self.watermark.text_scale > 0.0 && self.watermark.text_scale < 1.0) {
            return Err(MovieError::config(
                "watermark.text_scale must be between 0 and 1",
            ));
        }
        Ok(())
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("heliomovie").join("config.json")
}

/// Default movies directory.
fn dirs_default_movies() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("heliomovie").join("movies")
}
