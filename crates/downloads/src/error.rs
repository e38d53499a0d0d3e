use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("download directory does not exist: {}", path.display())]
    StorageUnavailable { path: PathBuf },

    #[error("no fetcher configured")]
    FetcherNotConfigured,

    #[error("fetch failed for {album_id}: {message}")]
    Fetch { album_id: String, message: String },

    #[error("fetch for {album_id} finished without producing an artifact")]
    NoArtifact { album_id: String },

    #[error("fetch task for {album_id} panicked")]
    Panicked { album_id: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn fetch(album_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            album_id: album_id.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
