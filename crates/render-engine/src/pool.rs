//! Bounded worker pool for concurrent movie jobs.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use heliomovie_common::error::{MovieError, MovieResult};
use heliomovie_movie_model::MovieJob;

use crate::builder::{build_movie, BuildContext, BuildReport, EventCallback};

/// Runs jobs on the tokio runtime, at most `max_concurrent` at a time.
pub struct MoviePool {
    ctx: Arc<BuildContext>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl MoviePool {
    pub fn new(ctx: Arc<BuildContext>) -> Self {
        let max_concurrent = ctx.config.workers.max_concurrent_jobs.max(1);
        Self {
            ctx,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Queue `job`. Must be called from within a tokio runtime.
    pub fn submit(&self, job: MovieJob, events: Option<EventCallback>) -> JobHandle {
        let job_id = job.id.clone();
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let ctx = Arc::clone(&self.ctx);
            let permits = Arc::clone(&self.permits);
            let cancel = cancel.clone();
            async move {
                let _permit = tokio::select! {
                    permit = permits.acquire_owned() => permit.map_err(|_| {
                        MovieError::Other(anyhow::anyhow!("worker pool is closed"))
                    })?,
                    _ = cancel.cancelled() => {
                        tracing::debug!(job_id = %job.id, "Job cancelled while queued");
                        return Err(MovieError::Cancelled);
                    }
                };
                build_movie(job, ctx, cancel, events).await
            }
        });

        JobHandle {
            job_id,
            cancel,
            task,
        }
    }

    /// Number of jobs currently building.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// A submitted job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: String,
    cancel: CancellationToken,
    task: JoinHandle<MovieResult<BuildReport>>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Request cancellation; the job resolves to [`MovieError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this job, for use after the handle is consumed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> MovieResult<BuildReport> {
        self.task
            .await
            .map_err(|e| MovieError::Other(anyhow::anyhow!("job {} task failed: {e}", self.job_id)))?
    }
}
