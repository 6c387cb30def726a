//! Validate a movie job descriptor.

use std::path::PathBuf;

use heliomovie_movie_model::MovieJob;
use heliomovie_render_engine::variant::VariantKind;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating job at: {}", path.display());

    let job = MovieJob::load(&path).map_err(|e| anyhow::anyhow!("Failed to load job: {e}"))?;

    let placeholders = job
        .frames
        .iter()
        .filter(|f| VariantKind::select(&f.roi) == VariantKind::Placeholder)
        .count();
    let missing_sources = job.frames.iter().filter(|f| f.source.is_none()).count();

    println!("  Id: {}", job.id);
    println!("  Frames: {} ({placeholders} placeholder)", job.frames.len());
    println!("  Geometry: {}x{} @ {} fps", job.width, job.height, job.frame_rate);
    for kind in job.requested_profiles() {
        let profile = kind.profile();
        let (w, h) = profile.output_geometry(job.width, job.height);
        println!(
            "  Profile {kind}: {} at {w}x{h}",
            profile.artifact_name(&job.id)
        );
    }

    let renderable = job.frames.len() - placeholders;
    if missing_sources > 0 && renderable > 0 {
        println!("\n{missing_sources} frame(s) have no source tile; rendered frames without one will fail.");
    }

    println!("\nJob is valid.");
    Ok(())
}
