//! The single download worker.
//!
//! Drains [`JobQueue`] strictly in FIFO order, one job at a time. A failed job
//! is logged, reported to the listener and dropped; it is never re-queued.
//! The in-flight mark is always cleared before the next job is taken.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::task::JoinHandle,
    tracing::{error, info, warn},
};

use crate::{
    error::{Error, Result},
    fetcher::Fetcher,
    queue::{Job, JobQueue},
    storage::{Artifact, ArtifactStorage},
};

/// Observer for finished jobs (e.g. to notify the requester).
#[async_trait]
pub trait JobListener: Send + Sync {
    async fn job_completed(&self, job: &Job, artifacts: &[Artifact]);
    async fn job_failed(&self, job: &Job, error: &Error);
}

/// Clears the in-flight mark when dropped, whatever happened to the job.
struct InFlight<'a> {
    queue: &'a JobQueue,
    album_id: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.queue.finish(self.album_id);
    }
}

pub struct DownloadWorker {
    queue: Arc<JobQueue>,
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn ArtifactStorage>,
    listener: Option<Arc<dyn JobListener>>,
    poll_interval: Duration,
}

impl DownloadWorker {
    pub fn new(
        queue: Arc<JobQueue>,
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn ArtifactStorage>,
    ) -> Self {
        Self {
            queue,
            fetcher,
            storage,
            listener: None,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Spawn the worker loop. It runs until [`JobQueue::stop`] is called.
    pub fn spawn(self) -> WorkerHandle {
        let queue = Arc::clone(&self.queue);
        let join = tokio::spawn(self.run());
        WorkerHandle { queue, join }
    }

    async fn run(self) {
        info!("download worker started");
        while let Some(job) = self.queue.next_job(self.poll_interval).await {
            self.process(&job).await;
        }
        info!("download worker stopped");
    }

    async fn process(&self, job: &Job) {
        let _in_flight = InFlight {
            queue: &self.queue,
            album_id: &job.album_id,
        };
        info!(album_id = %job.album_id, user_id = %job.requester.user_id, "download started");

        match self.fetch(&job.album_id).await {
            Ok(artifacts) => {
                info!(
                    album_id = %job.album_id,
                    artifacts = artifacts.len(),
                    "download finished"
                );
                if let Some(listener) = &self.listener {
                    listener.job_completed(job, &artifacts).await;
                }
            },
            Err(e) => {
                error!(album_id = %job.album_id, error = %e, "download failed, dropping job");
                if let Some(listener) = &self.listener {
                    listener.job_failed(job, &e).await;
                }
            },
        }
    }

    /// Run the fetcher on its own task so a panic only fails this job, then
    /// check that an artifact actually appeared.
    ///
    /// An album that is already stored is not fetched again; a request that
    /// raced with the previous download of the same id lands here.
    async fn fetch(&self, album_id: &str) -> Result<Vec<Artifact>> {
        let existing = self.find_artifacts(album_id).await?;
        if !existing.is_empty() {
            info!(album_id, artifacts = existing.len(), "already stored, skipping fetch");
            return Ok(existing);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let id = album_id.to_string();
        match tokio::spawn(async move { fetcher.fetch(&id).await }).await {
            Ok(result) => result?,
            Err(e) => {
                warn!(album_id, error = %e, "fetch task aborted");
                return Err(Error::Panicked {
                    album_id: album_id.to_string(),
                });
            },
        }

        let artifacts = self.find_artifacts(album_id).await?;
        if artifacts.is_empty() {
            return Err(Error::NoArtifact {
                album_id: album_id.to_string(),
            });
        }
        Ok(artifacts)
    }

    async fn find_artifacts(&self, album_id: &str) -> Result<Vec<Artifact>> {
        let storage = Arc::clone(&self.storage);
        let id = album_id.to_string();
        match tokio::task::spawn_blocking(move || storage.find_artifacts(&id)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(album_id, error = %e, "storage lookup aborted");
                Err(Error::Panicked {
                    album_id: album_id.to_string(),
                })
            },
        }
    }
}

/// Handle to a running worker.
pub struct WorkerHandle {
    queue: Arc<JobQueue>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop taking new jobs; the current one runs to completion.
    pub fn stop(&self) {
        self.queue.stop();
    }

    /// Wait for the worker loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            error!(error = %e, "download worker task failed");
        }
    }
}
