//! Heliomovie Render Engine
//!
//! Turns an ordered list of frame requests into encoded movies, one per
//! requested distribution profile.
//!
//! # Pipeline Architecture
//!
//! ```text
//! MovieJob ──┐
//!            ├── Variant selection (ROI geometry)
//!            │         │
//!            │         ├── Placeholder (512×512, transparent)
//! tiles ─────┴─────────┼── Rendered (fit, center, watermark)
//!                      ▼
//!            <workdir>/frame%0Nd.jpg
//!                      │
//!                      ├── Encode (web)    ──► <job>.mp4
//!                      └── Encode (device)  ──► ipod-<job>.mp4
//!                                │
//!                                ▼
//!                         movies directory
//! ```

pub mod builder;
pub mod encoder;
pub mod pool;
pub mod resolver;
pub mod sequencer;
pub mod source;
pub mod variant;
pub mod watermark;

pub use builder::{
    build_movie, BuildContext, BuildReport, EventCallback, JobEvent, JobStatus, ProfileOutcome,
    CANCELLED_REASON,
};
pub use encoder::{EncodeRequest, EncodeResult, EncoderCommand, EncoderInvoker};
pub use pool::{JobHandle, MoviePool};
pub use source::{FilePixelSource, PixelSource, PixelSourceError};
pub use watermark::Watermark;
