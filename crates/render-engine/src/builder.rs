//! Movie builder: one job from frame requests to published artifacts.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use heliomovie_common::config::AppConfig;
use heliomovie_common::error::{MovieError, MovieResult};
use heliomovie_movie_model::{JobError, MovieJob, ProfileKind};

use crate::encoder::{EncodeRequest, EncodeResult, EncoderInvoker};
use crate::resolver::{resolve_frame, FrameContext};
use crate::sequencer::{FrameSequencer, WorkingDirectory};
use crate::source::PixelSource;
use crate::watermark::Watermark;

/// Shared, read-only resources for building movies.
pub struct BuildContext {
    pub config: AppConfig,
    pub source: Arc<dyn PixelSource>,
    pub watermark: Option<Arc<Watermark>>,
    pub invoker: EncoderInvoker,
}

impl BuildContext {
    /// Context without a watermark.
    pub fn new(config: AppConfig, source: Arc<dyn PixelSource>) -> Self {
        let invoker = EncoderInvoker::from_config(&config.encoder);
        Self {
            config,
            source,
            watermark: None,
            invoker,
        }
    }

    /// Validate `config` and load the watermark resources it names.
    pub fn from_config(config: AppConfig, source: Arc<dyn PixelSource>) -> MovieResult<Self> {
        config.validate()?;
        let watermark = Watermark::load(&config.watermark)?.map(Arc::new);
        Ok(Self {
            watermark,
            ..Self::new(config, source)
        })
    }

    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = Some(Arc::new(watermark));
        self
    }
}

/// Progress and failure notifications for one job.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        job_id: String,
        frames: usize,
    },
    FrameMaterialized {
        job_id: String,
        index: usize,
        total: usize,
    },
    ProfileCompleted {
        job_id: String,
        profile: ProfileKind,
        success: bool,
    },
    Aborted {
        job_id: String,
        reason: String,
    },
    Finished {
        job_id: String,
        status: JobStatus,
    },
}

/// Receives [`JobEvent`]s; may be called from a blocking thread.
pub type EventCallback = Arc<dyn Fn(JobEvent) + Send + Sync>;

/// Failure reason recorded for profiles stopped by cancellation.
pub const CANCELLED_REASON: &str = "cancelled";

/// Result of one requested profile.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProfileOutcome {
    Produced {
        path: PathBuf,
        elapsed_secs: f64,
        diagnostics: String,
    },
    Failed {
        reason: String,
    },
}

impl ProfileOutcome {
    /// Outcome of a profile cut short, or never started, by cancellation.
    pub fn cancelled() -> Self {
        Self::Failed {
            reason: CANCELLED_REASON.to_string(),
        }
    }

    pub fn is_produced(&self) -> bool {
        matches!(self, Self::Produced { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    FullSuccess,
    PartialSuccess,
    Failed,
}

impl JobStatus {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a ProfileOutcome>) -> Self {
        let (mut produced, mut failed) = (0usize, 0usize);
        for outcome in outcomes {
            if outcome.is_produced() {
                produced += 1;
            } else {
                failed += 1;
            }
        }
        match (produced, failed) {
            (0, _) => Self::Failed,
            (_, 0) => Self::FullSuccess,
            _ => Self::PartialSuccess,
        }
    }
}

/// Summary of a completed job.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub job_id: String,
    pub frames: usize,
    pub status: JobStatus,
    pub profiles: BTreeMap<ProfileKind, ProfileOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when the working directory could not be removed.
    pub cleanup_error: Option<String>,
}

impl BuildReport {
    /// Published artifact for `profile`, if it was produced.
    pub fn artifact(&self, profile: ProfileKind) -> Option<&Path> {
        match self.profiles.get(&profile)? {
            ProfileOutcome::Produced { path, .. } => Some(path),
            ProfileOutcome::Failed { .. } => None,
        }
    }
}

fn emit(events: &Option<EventCallback>, event: JobEvent) {
    if let Some(callback) = events {
        callback(event);
    }
}

/// Build every requested profile of `job`.
///
/// Frame-level failures abort the job with `Err`. Encoder and publish
/// failures are recorded per profile in the report. Cancellation keeps the
/// artifacts of profiles that had already finished and marks the rest
/// [`CANCELLED_REASON`]; if none had finished the job returns
/// [`MovieError::Cancelled`]. The job's working directory is removed on
/// every path.
pub async fn build_movie(
    job: MovieJob,
    ctx: Arc<BuildContext>,
    cancel: CancellationToken,
    events: Option<EventCallback>,
) -> MovieResult<BuildReport> {
    job.validate().map_err(|e| match e {
        JobError::ValidationError { message } => MovieError::invalid_job(message),
        other => MovieError::invalid_job(other.to_string()),
    })?;

    let started_at = Utc::now();
    let job = Arc::new(job);
    let workdir = WorkingDirectory::create(&ctx.config.work_dir, &job.id)?;

    tracing::info!(
        job_id = %job.id,
        frames = job.frames.len(),
        profiles = ?job.requested_profiles(),
        workdir = %workdir.path().display(),
        "Building movie"
    );
    emit(
        &events,
        JobEvent::Started {
            job_id: job.id.clone(),
            frames: job.frames.len(),
        },
    );

    let result = run_pipeline(&job, &ctx, workdir.path(), &cancel, &events).await;

    let workdir_path = workdir.path().to_path_buf();
    let cleanup_error = match workdir.close() {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(
                job_id = %job.id,
                path = %workdir_path.display(),
                error = %e,
                "Failed to remove working directory"
            );
            Some(e.to_string())
        }
    };

    let profiles = match result {
        Ok(profiles) => profiles,
        Err(e) => {
            tracing::error!(job_id = %job.id, error = %e, "Movie build aborted");
            emit(
                &events,
                JobEvent::Aborted {
                    job_id: job.id.clone(),
                    reason: e.to_string(),
                },
            );
            return Err(e);
        }
    };

    let status = JobStatus::from_outcomes(profiles.values());
    tracing::info!(job_id = %job.id, status = ?status, "Movie build finished");
    emit(
        &events,
        JobEvent::Finished {
            job_id: job.id.clone(),
            status,
        },
    );

    Ok(BuildReport {
        job_id: job.id.clone(),
        frames: job.frames.len(),
        status,
        profiles,
        started_at,
        finished_at: Utc::now(),
        cleanup_error,
    })
}

async fn run_pipeline(
    job: &Arc<MovieJob>,
    ctx: &Arc<BuildContext>,
    workdir: &Path,
    cancel: &CancellationToken,
    events: &Option<EventCallback>,
) -> MovieResult<BTreeMap<ProfileKind, ProfileOutcome>> {
    let sequencer = FrameSequencer::new(workdir, job.frames.len());

    let render = {
        let job = Arc::clone(job);
        let ctx = Arc::clone(ctx);
        let sequencer = sequencer.clone();
        let cancel = cancel.clone();
        let events = events.clone();
        tokio::task::spawn_blocking(move || {
            materialize_frames(&job, &ctx, &sequencer, &cancel, &events)
        })
    };
    render
        .await
        .map_err(|e| MovieError::Other(anyhow::anyhow!("frame rendering task failed: {e}")))??;

    sequencer.verify()?;
    tracing::debug!(job_id = %job.id, frames = sequencer.len(), "Frames materialized");

    let timeout = job.timeout(Duration::from_secs(ctx.config.encoder.default_timeout_secs));
    let pattern = sequencer.pattern();
    let mut outcomes = BTreeMap::new();
    let mut cancelled = false;

    for profile in job.requested_profiles() {
        cancelled |= cancel.is_cancelled();
        let outcome = if cancelled {
            ProfileOutcome::cancelled()
        } else {
            let request = EncodeRequest {
                job_id: &job.id,
                working_dir: workdir,
                frame_pattern: &pattern,
                frame_rate: job.frame_rate,
                width: job.width,
                height: job.height,
                profile,
                timeout,
            };
            match ctx.invoker.invoke(&request, cancel).await {
                Ok(result) => publish(job, &result, &ctx.config.movies_dir),
                Err(MovieError::Cancelled) => {
                    cancelled = true;
                    ProfileOutcome::cancelled()
                }
                Err(e) if e.is_job_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(job_id = %job.id, profile = %profile, error = %e, "Profile failed");
                    ProfileOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        };

        emit(
            events,
            JobEvent::ProfileCompleted {
                job_id: job.id.clone(),
                profile,
                success: outcome.is_produced(),
            },
        );
        outcomes.insert(profile, outcome);
    }

    // Artifacts finished before cancellation stay published; with none, the
    // job as a whole was cancelled.
    if cancelled && !outcomes.values().any(ProfileOutcome::is_produced) {
        return Err(MovieError::Cancelled);
    }

    Ok(outcomes)
}

fn publish(job: &MovieJob, result: &EncodeResult, movies_dir: &Path) -> ProfileOutcome {
    match publish_artifact(&result.path, movies_dir) {
        Ok(path) => ProfileOutcome::Produced {
            path,
            elapsed_secs: result.elapsed.as_secs_f64(),
            diagnostics: result.diagnostics.clone(),
        },
        Err(e) => {
            tracing::warn!(job_id = %job.id, profile = %result.profile, error = %e, "Failed to publish artifact");
            ProfileOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

fn materialize_frames(
    job: &MovieJob,
    ctx: &BuildContext,
    sequencer: &FrameSequencer,
    cancel: &CancellationToken,
    events: &Option<EventCallback>,
) -> MovieResult<()> {
    let frame_ctx = FrameContext {
        width: job.width,
        height: job.height,
        source: ctx.source.as_ref(),
        watermark: ctx.watermark.as_deref(),
        jpeg_quality: ctx.config.frames.jpeg_quality,
    };

    for (request, slot) in job.frames.iter().zip(sequencer.slots()) {
        if cancel.is_cancelled() {
            return Err(MovieError::Cancelled);
        }
        resolve_frame(request, &slot, &frame_ctx)?;
        emit(
            events,
            JobEvent::FrameMaterialized {
                job_id: job.id.clone(),
                index: slot.index,
                total: sequencer.len(),
            },
        );
    }
    Ok(())
}

/// Place an artifact in `movies_dir`, never replacing an existing movie.
///
/// The artifact is hard-linked when possible and copied otherwise; the
/// original is left for working-directory cleanup.
fn publish_artifact(artifact: &Path, movies_dir: &Path) -> MovieResult<PathBuf> {
    std::fs::create_dir_all(movies_dir)?;
    let name = artifact.file_name().ok_or_else(|| {
        MovieError::Other(anyhow::anyhow!(
            "artifact has no file name: {}",
            artifact.display()
        ))
    })?;
    let dest = movies_dir.join(name);
    let exists = || {
        MovieError::Other(anyhow::anyhow!(
            "refusing to overwrite existing movie {}",
            dest.display()
        ))
    };

    match std::fs::hard_link(artifact, &dest) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(exists()),
        Err(_) => {
            let mut out = match OpenOptions::new().write(true).create_new(true).open(&dest) {
                Ok(out) => out,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(exists()),
                Err(e) => return Err(e.into()),
            };
            let copied = File::open(artifact).and_then(|mut src| std::io::copy(&mut src, &mut out));
            if let Err(e) = copied {
                drop(out);
                let _ = std::fs::remove_file(&dest);
                return Err(e.into());
            }
        }
    }
    tracing::debug!(path = %dest.display(), "Published artifact");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PixelSourceError;
    use heliomovie_movie_model::{FrameRequest, RegionOfInterest};
    use image::DynamicImage;
    use std::sync::Mutex;

    struct NoPixels;

    impl PixelSource for NoPixels {
        fn fetch(&self, _request: &FrameRequest) -> Result<DynamicImage, PixelSourceError> {
            Err(PixelSourceError::Unavailable)
        }
    }

    fn context(root: &Path) -> Arc<BuildContext> {
        let config = AppConfig {
            work_dir: root.join("work"),
            movies_dir: root.join("movies"),
            ..AppConfig::default()
        };
        Arc::new(BuildContext::new(config, Arc::new(NoPixels)))
    }

    fn job(frames: Vec<FrameRequest>) -> MovieJob {
        MovieJob {
            id: "job-1".to_string(),
            frame_rate: 10,
            width: 32,
            height: 32,
            frames,
            profiles: ProfileKind::ALL.to_vec(),
            timeout_secs: None,
        }
    }

    fn produced() -> ProfileOutcome {
        ProfileOutcome::Produced {
            path: PathBuf::from("/m/a.mp4"),
            elapsed_secs: 1.0,
            diagnostics: String::new(),
        }
    }

    fn failed() -> ProfileOutcome {
        ProfileOutcome::Failed {
            reason: "x".to_string(),
        }
    }

    #[test]
    fn test_status_from_outcomes() {
        assert_eq!(
            JobStatus::from_outcomes(&[produced(), produced()]),
            JobStatus::FullSuccess
        );
        assert_eq!(
            JobStatus::from_outcomes(&[produced(), failed()]),
            JobStatus::PartialSuccess
        );
        assert_eq!(
            JobStatus::from_outcomes(&[failed(), failed()]),
            JobStatus::Failed
        );
        assert_eq!(JobStatus::from_outcomes(&[]), JobStatus::Failed);
    }

    #[test]
    fn test_report_serializes_profiles_by_name() {
        let report = BuildReport {
            job_id: "j".to_string(),
            frames: 2,
            status: JobStatus::PartialSuccess,
            profiles: BTreeMap::from([
                (ProfileKind::Web, produced()),
                (ProfileKind::Device, failed()),
            ]),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            cleanup_error: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "partial_success");
        assert_eq!(json["profiles"]["web"]["outcome"], "produced");
        assert_eq!(json["profiles"]["device"]["reason"], "x");
        assert_eq!(report.artifact(ProfileKind::Web), Some(Path::new("/m/a.mp4")));
        assert_eq!(report.artifact(ProfileKind::Device), None);
    }

    #[tokio::test]
    async fn test_invalid_job_is_rejected_before_work() {
        let root = tempfile::tempdir().unwrap();
        let err = build_movie(job(vec![]), context(root.path()), CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MovieError::InvalidJob { .. }));
        assert!(!root.path().join("work").exists());
    }

    #[tokio::test]
    async fn test_frame_failure_aborts_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let events: EventCallback = {
            let seen = Arc::clone(&seen);
            Arc::new(move |event| seen.lock().unwrap().push(event))
        };

        let frames = vec![
            FrameRequest::new(RegionOfInterest::new(0.0, 0.0, 0.0, 0.0, 1.0)),
            FrameRequest::new(RegionOfInterest::new(0.0, 0.0, 10.0, 10.0, 1.0)),
        ];
        let err = build_movie(
            job(frames),
            context(root.path()),
            CancellationToken::new(),
            Some(events),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MovieError::FrameRender { index: 1, .. }));
        let work = std::fs::read_dir(root.path().join("work")).unwrap();
        assert_eq!(work.count(), 0);

        let seen = seen.lock().unwrap();
        assert!(matches!(seen.first(), Some(JobEvent::Started { frames: 2, .. })));
        assert!(matches!(
            seen.get(1),
            Some(JobEvent::FrameMaterialized { index: 0, .. })
        ));
        assert!(matches!(seen.last(), Some(JobEvent::Aborted { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_frames_is_cancelled() {
        let root = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let frames = vec![FrameRequest::new(RegionOfInterest::new(0.0, 0.0, 0.0, 0.0, 1.0))];
        let err = build_movie(job(frames), context(root.path()), cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MovieError::Cancelled));
        assert_eq!(std::fs::read_dir(root.path().join("work")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_overlong_job_id_is_invalid() {
        let root = tempfile::tempdir().unwrap();
        let mut job = job(vec![FrameRequest::new(RegionOfInterest::new(
            0.0, 0.0, 0.0, 0.0, 1.0,
        ))]);
        job.id = "x".repeat(heliomovie_movie_model::MAX_JOB_ID_LEN + 1);

        let err = build_movie(job, context(root.path()), CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MovieError::InvalidJob { .. }));
    }

    #[test]
    fn test_publish_places_artifact() {
        let root = tempfile::tempdir().unwrap();
        let artifact = root.path().join("ipod-j.mp4");
        std::fs::write(&artifact, b"movie").unwrap();

        let dest = publish_artifact(&artifact, &root.path().join("movies")).unwrap();
        assert_eq!(dest, root.path().join("movies/ipod-j.mp4"));
        assert_eq!(std::fs::read(dest).unwrap(), b"movie");
    }

    #[test]
    fn test_publish_never_replaces_existing_movie() {
        let root = tempfile::tempdir().unwrap();
        let movies = root.path().join("movies");
        std::fs::create_dir_all(&movies).unwrap();
        std::fs::write(movies.join("j.mp4"), b"first").unwrap();

        let artifact = root.path().join("j.mp4");
        std::fs::write(&artifact, b"second").unwrap();

        let err = publish_artifact(&artifact, &movies).unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"), "{err}");
        assert_eq!(std::fs::read(movies.join("j.mp4")).unwrap(), b"first");
    }

    #[test]
    fn test_publish_fails_when_movies_dir_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        let movies = root.path().join("movies");
        std::fs::write(&movies, b"not a directory").unwrap();
        let artifact = root.path().join("j.mp4");
        std::fs::write(&artifact, b"movie").unwrap();

        assert!(publish_artifact(&artifact, &movies).is_err());
    }
}
