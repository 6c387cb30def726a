//! Encoder profiles: fixed parameter bundles for each distribution target.
//!
//! Profiles are process-wide constants. A new target is added by defining
//! another bundle and mapping a [`ProfileKind`] variant to it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable named parameter bundle describing one output target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncoderProfile {
    /// Profile name reported in build results.
    pub name: &'static str,

    /// Parameter set revision, bumped whenever `params` change.
    pub version: u32,

    /// Artifact filename prefix; must differ between profiles.
    pub file_prefix: &'static str,

    /// Container format (also the artifact extension).
    pub container: &'static str,

    /// Video codec passed to the encoder.
    pub codec: &'static str,

    /// Output pixel format.
    pub pixel_format: &'static str,

    /// Bitrate/quantizer ladder and codec tuning, in argument order.
    pub params: &'static [&'static str],

    /// Largest frame geometry the target can play back.
    pub max_geometry: Option<(u32, u32)>,
}

/// General, web-compatible H.264 output.
pub const WEB_PROFILE: EncoderProfile = EncoderProfile {
    name: "web",
    version: 1,
    file_prefix: "",
    container: "mp4",
    codec: "libx264",
    pixel_format: "yuv420p",
    params: &[
        "-preset",
        "medium",
        "-profile:v",
        "high",
        "-crf",
        "20",
        "-maxrate",
        "8000k",
        "-bufsize",
        "16000k",
        "-g",
        "300",
        "-movflags",
        "+faststart",
    ],
    max_geometry: None,
};

/// Constrained playback devices: baseline H.264, 1200k ceiling, strict GOP.
pub const DEVICE_PROFILE: EncoderProfile = EncoderProfile {
    name: "device",
    version: 1,
    file_prefix: "ipod-",
    container: "mp4",
    codec: "libx264",
    pixel_format: "yuv420p",
    params: &[
        "-profile:v",
        "baseline",
        "-level",
        "3.0",
        "-b:v",
        "1200k",
        "-maxrate",
        "1200k",
        "-bufsize",
        "1200k",
        "-g",
        "300",
        "-keyint_min",
        "25",
        "-sc_threshold",
        "40",
        "-refs",
        "1",
        "-qmin",
        "10",
        "-qmax",
        "51",
        "-qdiff",
        "4",
        "-i_qfactor",
        "0.71",
        "-qcomp",
        "0.6",
        "-movflags",
        "+faststart",
    ],
    max_geometry: Some((640, 480)),
};

/// Selector for a known encoder profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    Web,
    Device,
}

impl ProfileKind {
    /// Every known profile, in production order.
    pub const ALL: [ProfileKind; 2] = [ProfileKind::Web, ProfileKind::Device];

    /// The parameter bundle for this profile.
    pub fn profile(self) -> &'static EncoderProfile {
        match self {
            ProfileKind::Web => &WEB_PROFILE,
            ProfileKind::Device => &DEVICE_PROFILE,
        }
    }

    pub fn name(self) -> &'static str {
        self.profile().name
    }

    /// Parse a profile by name (as used on the command line).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl EncoderProfile {
    /// Artifact filename for a job, e.g. `ipod-<job>.mp4`.
    pub fn artifact_name(&self, job_id: &str) -> String {
        format!("{}{}.{}", self.file_prefix, job_id, self.container)
    }

    /// Frame geometry actually encoded for a requested output size.
    ///
    /// Sizes above `max_geometry` are scaled down preserving aspect ratio,
    /// rounded down to even dimensions (minimum 2).
    pub fn output_geometry(&self, width: u32, height: u32) -> (u32, u32) {
        let Some((max_w, max_h)) = self.max_geometry else {
            return (width, height);
        };
        if width <= max_w && height <= max_h {
            return (width, height);
        }

        let factor = (max_w as f64 / width as f64).min(max_h as f64 / height as f64);
        let fit = |v: u32| -> u32 {
            let scaled = (v as f64 * factor + 1e-9).floor() as u32;
            (scaled - scaled % 2).max(2)
        };
        (fit(width), fit(height))
    }
}
