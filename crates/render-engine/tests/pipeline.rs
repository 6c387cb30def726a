//! End-to-end builds against a stand-in encoder script.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use heliomovie_common::config::AppConfig;
use heliomovie_common::error::MovieError;
use heliomovie_movie_model::{FrameRequest, MovieJob, ProfileKind, RegionOfInterest};
use heliomovie_render_engine::{
    build_movie, BuildContext, EventCallback, FilePixelSource, JobEvent, JobStatus, MoviePool,
    ProfileOutcome, CANCELLED_REASON,
};

/// Writes a small artifact at the output path and logs `<output> <frame count>`.
const WRITE_ARTIFACT: &str = r#"for last; do :; done
n=$(ls "$(dirname "$last")" | grep -c '^frame')
echo "$last $n" >> "$LOG"
printf 'movie' > "$last"
"#;

/// Like WRITE_ARTIFACT, but the device profile exits with status 3.
const FAIL_DEVICE: &str = r#"for last; do :; done
case "$last" in
  */ipod-*) echo "device encoder exploded" >&2; exit 3 ;;
esac
printf 'movie' > "$last"
"#;

const HANG: &str = "exec sleep 5\n";

/// Web finishes at once; device announces itself through `$MARK`, then hangs.
const HANG_DEVICE: &str = r#"for last; do :; done
case "$last" in
  */ipod-*) : > "$MARK"; exec sleep 5 ;;
esac
printf 'movie' > "$last"
"#;

struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("tiles")).unwrap();
        RgbaImage::from_pixel(40, 30, Rgba([200, 120, 40, 255]))
            .save(root.path().join("tiles/tile.png"))
            .unwrap();
        Self { root }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    fn encoder(&self, body: &str) -> PathBuf {
        let bin = self.path("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let script = bin.join("fake-ffmpeg");
        let log = self.path("encoder.log");
        let mark = self.path("device.started");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nLOG='{}'\nMARK='{}'\n{body}",
                log.display(),
                mark.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn context(&self, encoder: PathBuf) -> Arc<BuildContext> {
        let mut config = AppConfig {
            work_dir: self.path("work"),
            movies_dir: self.path("movies"),
            ..AppConfig::default()
        };
        config.encoder.ffmpeg_path = encoder;
        Arc::new(BuildContext::new(
            config,
            Arc::new(FilePixelSource::new(self.path("tiles"))),
        ))
    }

    fn log_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.path("encoder.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn work_entries(&self) -> usize {
        std::fs::read_dir(self.path("work")).unwrap().count()
    }
}

fn job(id: &str) -> MovieJob {
    let tile = |top: f64| {
        FrameRequest::new(RegionOfInterest::new(top, 0.0, top + 30.0, 40.0, 1.0))
            .with_source("tile.png")
            .with_labels(["SDO", "AIA 171"])
    };
    MovieJob {
        id: id.to_string(),
        frame_rate: 12,
        width: 64,
        height: 48,
        frames: vec![
            tile(0.0),
            tile(1.0),
            // Degenerate ROI: rendered as a placeholder without pixel data.
            FrameRequest::new(RegionOfInterest::new(5.0, 5.0, 5.0, 40.0, 1.0)),
            tile(2.0),
        ],
        profiles: ProfileKind::ALL.to_vec(),
        timeout_secs: Some(20),
    }
}

fn recorder() -> (EventCallback, Arc<Mutex<Vec<JobEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let callback: EventCallback = {
        let seen = Arc::clone(&seen);
        Arc::new(move |event| seen.lock().unwrap().push(event))
    };
    (callback, seen)
}

#[tokio::test]
async fn test_both_profiles_succeed() {
    let fx = Fixture::new();
    let ctx = fx.context(fx.encoder(WRITE_ARTIFACT));
    let (events, seen) = recorder();

    let report = build_movie(job("ar-171"), ctx, CancellationToken::new(), Some(events))
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::FullSuccess);
    assert_eq!(report.frames, 4);
    assert!(report.cleanup_error.is_none());
    assert_eq!(
        report.artifact(ProfileKind::Web),
        Some(fx.path("movies/ar-171.mp4").as_path())
    );
    assert_eq!(
        report.artifact(ProfileKind::Device),
        Some(fx.path("movies/ipod-ar-171.mp4").as_path())
    );
    assert_eq!(std::fs::read(fx.path("movies/ipod-ar-171.mp4")).unwrap(), b"movie");

    // Both encodes ran in the same working directory, with every frame present.
    let lines = fx.log_lines();
    assert_eq!(lines.len(), 2);
    let outputs: Vec<(&Path, &str)> = lines
        .iter()
        .map(|l| {
            let (path, count) = l.rsplit_once(' ').unwrap();
            (Path::new(path), count)
        })
        .collect();
    assert_eq!(outputs[0].0.parent(), outputs[1].0.parent());
    assert!(outputs[0].0.ends_with("ar-171.mp4"));
    assert!(outputs[1].0.ends_with("ipod-ar-171.mp4"));
    assert!(outputs.iter().all(|(_, count)| *count == "4"));

    assert_eq!(fx.work_entries(), 0);

    let seen = seen.lock().unwrap();
    let frames: Vec<usize> = seen
        .iter()
        .filter_map(|e| match e {
            JobEvent::FrameMaterialized { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(frames, vec![0, 1, 2, 3]);
    assert!(matches!(seen.first(), Some(JobEvent::Started { .. })));
    assert!(matches!(
        seen.last(),
        Some(JobEvent::Finished {
            status: JobStatus::FullSuccess,
            ..
        })
    ));
}

#[tokio::test]
async fn test_failed_profile_does_not_sink_the_other() {
    let fx = Fixture::new();
    let ctx = fx.context(fx.encoder(FAIL_DEVICE));

    let report = build_movie(job("flare"), ctx, CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::PartialSuccess);
    assert!(report.profiles[&ProfileKind::Web].is_produced());
    match &report.profiles[&ProfileKind::Device] {
        ProfileOutcome::Failed { reason } => {
            assert!(reason.contains("device encoder exploded"), "{reason}");
        }
        other => panic!("expected device failure, got {other:?}"),
    }
    assert!(fx.path("movies/flare.mp4").exists());
    assert!(!fx.path("movies/ipod-flare.mp4").exists());
    assert_eq!(fx.work_entries(), 0);
}

#[tokio::test]
async fn test_hung_encoder_times_out() {
    let fx = Fixture::new();
    let ctx = fx.context(fx.encoder(HANG));
    let mut job = job("slow");
    job.timeout_secs = Some(1);

    let started = Instant::now();
    let report = build_movie(job, ctx, CancellationToken::new(), None)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(8));
    assert_eq!(report.status, JobStatus::Failed);
    for outcome in report.profiles.values() {
        match outcome {
            ProfileOutcome::Failed { reason } => assert!(reason.contains("timeout"), "{reason}"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
    assert_eq!(fx.work_entries(), 0);
}

#[tokio::test]
async fn test_cancel_kills_encoder_and_removes_workdir() {
    let fx = Fixture::new();
    let ctx = fx.context(fx.encoder(HANG));
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let task = tokio::spawn(build_movie(job("halt"), ctx, cancel.clone(), None));
    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(MovieError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(fx.work_entries(), 0);
    assert!(!fx.path("movies/halt.mp4").exists());
}

#[tokio::test]
async fn test_cancel_keeps_profiles_that_already_finished() {
    let fx = Fixture::new();
    let ctx = fx.context(fx.encoder(HANG_DEVICE));
    let cancel = CancellationToken::new();
    let (events, seen) = recorder();

    let task = tokio::spawn(build_movie(job("eclipse"), ctx, cancel.clone(), Some(events)));
    let mark = fx.path("device.started");
    for _ in 0..500 {
        if mark.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(mark.exists(), "device encode never started");
    cancel.cancel();

    let report = task.await.unwrap().unwrap();
    assert_eq!(report.status, JobStatus::PartialSuccess);
    assert_eq!(
        report.artifact(ProfileKind::Web),
        Some(fx.path("movies/eclipse.mp4").as_path())
    );
    assert_eq!(std::fs::read(fx.path("movies/eclipse.mp4")).unwrap(), b"movie");
    match &report.profiles[&ProfileKind::Device] {
        ProfileOutcome::Failed { reason } => assert_eq!(reason, CANCELLED_REASON),
        other => panic!("expected cancelled device profile, got {other:?}"),
    }
    assert!(!fx.path("movies/ipod-eclipse.mp4").exists());
    assert_eq!(fx.work_entries(), 0);

    let seen = seen.lock().unwrap();
    let completed: Vec<(ProfileKind, bool)> = seen
        .iter()
        .filter_map(|e| match e {
            JobEvent::ProfileCompleted {
                profile, success, ..
            } => Some((*profile, *success)),
            _ => None,
        })
        .collect();
    assert_eq!(
        completed,
        vec![(ProfileKind::Web, true), (ProfileKind::Device, false)]
    );
    assert!(matches!(
        seen.last(),
        Some(JobEvent::Finished {
            status: JobStatus::PartialSuccess,
            ..
        })
    ));
}

#[tokio::test]
async fn test_publish_failure_is_reported_per_profile() {
    let fx = Fixture::new();
    let ctx = {
        let mut config = AppConfig {
            work_dir: fx.path("work"),
            // A regular file where the movies directory should be.
            movies_dir: fx.path("movies"),
            ..AppConfig::default()
        };
        std::fs::write(&config.movies_dir, b"not a directory").unwrap();
        config.encoder.ffmpeg_path = fx.encoder(WRITE_ARTIFACT);
        Arc::new(BuildContext::new(
            config,
            Arc::new(FilePixelSource::new(fx.path("tiles"))),
        ))
    };
    let (events, seen) = recorder();

    let report = build_movie(job("corona"), ctx, CancellationToken::new(), Some(events))
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.profiles.values().all(|o| !o.is_produced()));
    assert_eq!(fx.work_entries(), 0);

    let seen = seen.lock().unwrap();
    let successes: Vec<bool> = seen
        .iter()
        .filter_map(|e| match e {
            JobEvent::ProfileCompleted { success, .. } => Some(*success),
            _ => None,
        })
        .collect();
    assert_eq!(successes, vec![false, false]);
}

#[tokio::test]
async fn test_existing_movie_is_not_overwritten() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.path("movies")).unwrap();
    std::fs::write(fx.path("movies/twin.mp4"), b"earlier run").unwrap();
    let ctx = fx.context(fx.encoder(WRITE_ARTIFACT));

    let report = build_movie(job("twin"), ctx, CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::PartialSuccess);
    match &report.profiles[&ProfileKind::Web] {
        ProfileOutcome::Failed { reason } => {
            assert!(reason.contains("refusing to overwrite"), "{reason}")
        }
        other => panic!("expected web publish failure, got {other:?}"),
    }
    assert_eq!(
        std::fs::read(fx.path("movies/twin.mp4")).unwrap(),
        b"earlier run"
    );
    assert!(report.profiles[&ProfileKind::Device].is_produced());
}

#[tokio::test]
async fn test_pool_runs_jobs_concurrently() {
    let fx = Fixture::new();
    let pool = MoviePool::new(fx.context(fx.encoder(WRITE_ARTIFACT)));

    let handles: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|id| pool.submit(job(id), None))
        .collect();
    for handle in handles {
        let report = handle.wait().await.unwrap();
        assert_eq!(report.status, JobStatus::FullSuccess);
    }

    assert_eq!(fx.log_lines().len(), 6);
    assert_eq!(fx.work_entries(), 0);
    assert_eq!(pool.in_flight(), 0);
}
