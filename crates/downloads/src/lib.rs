//! Download scheduling and the artifact store.
//!
//! [`JobQueue`] is filled by the chat router and drained by a single
//! [`DownloadWorker`], which runs a [`Fetcher`] per job and checks the
//! [`ArtifactStorage`] for the result.

pub mod error;
pub mod fetcher;
pub mod queue;
pub mod storage;
pub mod worker;

pub use {
    error::{Error, Result},
    fetcher::{CommandFetcher, Fetcher},
    queue::{EnqueueOutcome, Job, JobQueue, QueueSnapshot},
    storage::{Artifact, ArtifactStorage, DirectoryStore, matches_album},
    worker::{DownloadWorker, JobListener, WorkerHandle},
};
