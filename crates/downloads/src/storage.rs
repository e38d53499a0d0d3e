//! Finished artifacts on disk.
//!
//! The download directory is flat: each finished album is a single
//! `<album_id>.pdf` or `<album_id>-<title>.pdf` file. Only the worker writes
//! to it; every query path only reads.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const ARTIFACT_EXTENSION: &str = "pdf";
const TEMP_EXTENSIONS: &[&str] = &["tmp", "temp"];

/// A finished artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name without extension, e.g. `350234-Some Title`.
    pub name: String,
    pub path: PathBuf,
}

impl Artifact {
    pub fn size_bytes(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }
}

/// Read access to finished artifacts.
pub trait ArtifactStorage: Send + Sync {
    /// Directory artifacts live in (shown to users in version info).
    fn root(&self) -> &Path;

    /// Names of every finished artifact, sorted lexicographically.
    ///
    /// Fails with [`Error::StorageUnavailable`] when the directory is missing.
    fn list_artifacts(&self) -> Result<Vec<String>>;

    /// Artifacts belonging to `album_id`, sorted by name. Empty when none
    /// match or the directory is missing.
    fn find_artifacts(&self, album_id: &str) -> Result<Vec<Artifact>>;

    /// The artifact to deliver for `album_id`.
    fn resolve_artifact(&self, album_id: &str) -> Result<Option<Artifact>> {
        Ok(self.find_artifacts(album_id)?.into_iter().next())
    }
}

/// Does an artifact name belong to `album_id`?
pub fn matches_album(name: &str, album_id: &str) -> bool {
    name == album_id
        || name
            .strip_prefix(album_id)
            .is_some_and(|rest| rest.starts_with('-'))
}

/// [`ArtifactStorage`] over a flat directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the download directory if needed.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Remove leftovers of interrupted or failed downloads:
    /// digit-prefixed directories without a matching `<dir>.pdf`, temp files,
    /// and digit-prefixed files that are not PDFs.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_failed(&self) -> Result<usize> {
        if !self.root.exists() {
            info!(path = %self.root.display(), "download directory missing, skipping cleanup");
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type()?;

            let outcome = if file_type.is_dir() {
                if starts_with_digit(&name)
                    && !self.root.join(format!("{name}.{ARTIFACT_EXTENSION}")).exists()
                {
                    info!(name, "removing unfinished download directory");
                    fs::remove_dir_all(&path)
                } else {
                    continue;
                }
            } else if file_type.is_file() {
                let ext = extension(&path);
                if ext.as_deref().is_some_and(|e| TEMP_EXTENSIONS.contains(&e)) {
                    info!(name, "removing temporary file");
                    fs::remove_file(&path)
                } else if starts_with_digit(&name) && ext.as_deref() != Some(ARTIFACT_EXTENSION) {
                    info!(name, "removing failed download file");
                    fs::remove_file(&path)
                } else {
                    continue;
                }
            } else {
                continue;
            };

            match outcome {
                Ok(()) => removed += 1,
                Err(e) => warn!(name, error = %e, "cleanup failed for entry"),
            }
        }

        info!(removed, "download directory cleanup finished");
        Ok(removed)
    }

    fn artifacts(&self) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || extension(&path).as_deref() != Some(ARTIFACT_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            artifacts.push(Artifact { name, path });
        }
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(artifacts)
    }
}

impl ArtifactStorage for DirectoryStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list_artifacts(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(Error::StorageUnavailable {
                path: self.root.clone(),
            });
        }
        Ok(self.artifacts()?.into_iter().map(|a| a.name).collect())
    }

    fn find_artifacts(&self, album_id: &str) -> Result<Vec<Artifact>> {
        if !self.root.is_dir() {
            debug!(path = %self.root.display(), "download directory missing");
            return Ok(Vec::new());
        }
        Ok(self
            .artifacts()?
            .into_iter()
            .filter(|a| matches_album(&a.name, album_id))
            .collect())
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn starts_with_digit(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_digit())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn store_with(files: &[&str]) -> (tempfile::TempDir, DirectoryStore) {
        let dir = tempfile::tempdir().unwrap();
        for name in files {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let store = DirectoryStore::new(dir.path());
        (dir, store)
    }

    #[rstest]
    #[case("350234", "350234", true)]
    #[case("350234-Title", "350234", true)]
    #[case("3502340-Other", "350234", false)]
    #[case("1350234", "350234", false)]
    #[case("350234_Title", "350234", false)]
    fn album_matching(#[case] name: &str, #[case] id: &str, #[case] expected: bool) {
        assert_eq!(matches_album(name, id), expected);
    }

    #[test]
    fn list_is_sorted_and_pdf_only() {
        let (_dir, store) = store_with(&["2-b.pdf", "10-a.pdf", "1.PDF", "notes.txt", "3.zip"]);
        assert_eq!(store.list_artifacts().unwrap(), vec!["1", "10-a", "2-b"]);
    }

    #[test]
    fn list_missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("missing"));
        assert!(matches!(
            store.list_artifacts(),
            Err(Error::StorageUnavailable { .. })
        ));
        assert!(store.find_artifacts("1").unwrap().is_empty());
    }

    #[test]
    fn find_and_resolve() {
        let (dir, store) = store_with(&["77-second.pdf", "77-first.pdf", "770.pdf"]);
        let found = store.find_artifacts("77").unwrap();
        let names: Vec<_> = found.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["77-first", "77-second"]);

        let resolved = store.resolve_artifact("77").unwrap().unwrap();
        assert_eq!(resolved.path, dir.path().join("77-first.pdf"));
        assert_eq!(resolved.size_bytes(), Some(1));
        assert!(store.resolve_artifact("78").unwrap().is_none());
    }

    #[test]
    fn cleanup_removes_only_failed_leftovers() {
        let (dir, store) = store_with(&[
            "100-done.pdf",
            "200-partial.jpg",
            "download.tmp",
            "cache.temp",
            "readme.md",
        ]);
        let root = dir.path();
        fs::create_dir(root.join("100-done")).unwrap();
        fs::create_dir(root.join("300-unfinished")).unwrap();
        fs::create_dir(root.join("misc")).unwrap();

        assert_eq!(store.cleanup_failed().unwrap(), 4);

        assert!(root.join("100-done.pdf").exists());
        assert!(root.join("100-done").exists());
        assert!(root.join("misc").exists());
        assert!(root.join("readme.md").exists());
        assert!(!root.join("300-unfinished").exists());
        assert!(!root.join("200-partial.jpg").exists());
        assert!(!root.join("download.tmp").exists());
        assert!(!root.join("cache.temp").exists());
    }

    #[test]
    fn cleanup_missing_directory_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("nope"));
        assert_eq!(store.cleanup_failed().unwrap(), 0);
        store.ensure_dir().unwrap();
        assert!(dir.path().join("nope").is_dir());
    }
}
