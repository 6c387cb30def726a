//! Build a movie from a job descriptor.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use heliomovie_common::config::AppConfig;
use heliomovie_movie_model::MovieJob;
use heliomovie_render_engine::{
    BuildContext, EventCallback, FilePixelSource, JobEvent, JobStatus, MoviePool, ProfileOutcome,
};

pub async fn run(
    job_path: PathBuf,
    config: AppConfig,
    timeout_secs: Option<u64>,
    report_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Building movie from: {}", job_path.display());

    let mut job =
        MovieJob::load(&job_path).map_err(|e| anyhow::anyhow!("Failed to load job: {e}"))?;
    if let Some(secs) = timeout_secs {
        job.timeout_secs = Some(secs);
    }

    println!("  Job: {}", job.id);
    println!("  Frames: {}", job.frames.len());
    println!("  Geometry: {}x{} @ {} fps", job.width, job.height, job.frame_rate);
    println!("  Movies dir: {}", config.movies_dir.display());

    // Tile paths in the job are relative to the job file.
    let base_dir = job_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let source = Arc::new(FilePixelSource::new(base_dir));

    let ctx = BuildContext::from_config(config, source)
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;
    if !ctx.invoker.is_available() {
        tracing::warn!(
            program = %ctx.invoker.program().display(),
            "Encoder does not respond to -version; encoding will likely fail"
        );
    }

    let events: EventCallback = Arc::new(|event| match event {
        JobEvent::FrameMaterialized { index, total, .. } => {
            print!("\r  Rendering frames: {}/{}", index + 1, total);
            let _ = std::io::stdout().flush();
            if index + 1 == total {
                println!();
            }
        }
        JobEvent::ProfileCompleted {
            profile, success, ..
        } => {
            let mark = if success { "OK" } else { "FAILED" };
            println!("  Encoded {profile}: {mark}");
        }
        _ => {}
    });

    let pool = MoviePool::new(Arc::new(ctx));
    let handle = pool.submit(job, Some(events));

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            cancel.cancel();
        }
    });

    let report = handle
        .wait()
        .await
        .map_err(|e| anyhow::anyhow!("Build failed: {e}"))?;

    println!();
    for (profile, outcome) in &report.profiles {
        match outcome {
            ProfileOutcome::Produced {
                path, elapsed_secs, ..
            } => println!("  {profile}: {} ({elapsed_secs:.1}s)", path.display()),
            ProfileOutcome::Failed { reason } => println!("  {profile}: failed: {reason}"),
        }
    }
    if let Some(err) = &report.cleanup_error {
        println!("  Warning: working directory not removed: {err}");
    }

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)?;
        println!("  Report: {}", path.display());
    }

    match report.status {
        JobStatus::FullSuccess => {
            println!("\nAll profiles built.");
            Ok(())
        }
        JobStatus::PartialSuccess => {
            println!("\nSome profiles failed. See above.");
            Ok(())
        }
        JobStatus::Failed => Err(anyhow::anyhow!("No profile could be built")),
    }
}
