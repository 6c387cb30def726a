//! Heliomovie Movie Model
//!
//! Defines the data contracts of the movie assembly pipeline:
//! - **ROI:** Requested region in physical units plus image scale
//! - **Job:** Ordered frame requests, output geometry, and requested profiles
//! - **Profile:** Fixed encoder parameter bundles per distribution target

pub mod job;
pub mod profile;
pub mod roi;

pub use job::*;
pub use profile::*;
pub use roi::*;
