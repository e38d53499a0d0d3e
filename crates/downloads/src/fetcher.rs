//! The external fetch-and-convert step.

use std::{path::PathBuf, process::Stdio};

use {
    async_trait::async_trait,
    tokio::process::Command,
    tracing::{debug, info},
};

use crate::error::{Error, Result};

/// Downloads an album and materializes it as an artifact in the download
/// directory. Called only from the download worker, one job at a time.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, album_id: &str) -> Result<()>;
}

/// Runs an external program per job.
///
/// `{id}` and `{dir}` in the argument list are replaced with the album id and
/// the download directory. A non-zero exit status is a failure; the tail of
/// stderr becomes the error message.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    program: String,
    args: Vec<String>,
    download_dir: PathBuf,
}

/// Characters of stderr kept in error messages.
const STDERR_TAIL: usize = 400;

impl CommandFetcher {
    pub fn new(program: impl Into<String>, args: Vec<String>, download_dir: PathBuf) -> Self {
        Self {
            program: program.into(),
            args,
            download_dir,
        }
    }

    fn render_args(&self, album_id: &str) -> Vec<String> {
        let dir = self.download_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{id}", album_id).replace("{dir}", &dir))
            .collect()
    }
}

#[async_trait]
impl Fetcher for CommandFetcher {
    async fn fetch(&self, album_id: &str) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(Error::FetcherNotConfigured);
        }

        let args = self.render_args(album_id);
        info!(album_id, program = %self.program, "starting fetcher");
        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.download_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::external(format!("failed to spawn {}", self.program), e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!(album_id, "fetcher: {line}");
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let tail = match stderr.char_indices().rev().nth(STDERR_TAIL) {
            Some((idx, _)) => &stderr[idx..],
            None => stderr,
        };
        Err(Error::fetch(
            album_id,
            format!("{} exited with {}: {tail}", self.program, output.status),
        ))
    }
}
