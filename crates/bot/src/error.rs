use thiserror::Error;

/// Failures inside a command handler. The router turns these into a reply.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Channel(#[from] mangabot_channels::Error),

    #[error(transparent)]
    Downloads(#[from] mangabot_downloads::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A storage lookup running on the blocking pool panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
