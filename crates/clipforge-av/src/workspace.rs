//! Temporary artifact management for request handling.
//!
//! [`Staging`] hands out unique paths inside the upload and output
//! directories. An [`ArtifactSet`] owns every path belonging to one request
//! and deletes them when released or dropped, so no exit path
//! leaves files behind.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// What an allocated path will hold. Decides the directory it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A file received from the client.
    Upload,
    /// A file produced by one engine stage and consumed by the next.
    Intermediate,
    /// The final file returned to the client.
    Output,
}

/// Delete `path`, treating "not found" as success.
///
/// Returns `true` if a file was removed. Failures other than "not found" are
/// logged and swallowed so cleanup never masks the error that triggered it.
pub fn release(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::trace!("Released artifact {:?}", path);
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!("Failed to release artifact {:?}: {}", path, e);
            false
        }
    }
}

/// Staging directories for uploads, intermediates and outputs.
#[derive(Debug, Clone)]
pub struct Staging {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl Staging {
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn dir_for(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Upload | ArtifactKind::Intermediate => &self.upload_dir,
            ArtifactKind::Output => &self.output_dir,
        }
    }

    /// Reserve a unique path `<prefix>_<uuid>.<ext>` for `kind`.
    ///
    /// Creates the target directory if needed; the file itself is not created.
    pub async fn allocate(&self, kind: ArtifactKind, prefix: &str, ext: &str) -> Result<PathBuf> {
        let dir = self.dir_for(kind);
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            Error::Workspace(format!("failed to create {}: {e}", dir.display()))
        })?;

        let name = unique_name(prefix, ext);
        Ok(dir.join(name))
    }

    /// Start a new, empty artifact set backed by these directories.
    pub fn artifact_set(&self) -> ArtifactSet {
        ArtifactSet {
            staging: self.clone(),
            paths: Vec::new(),
        }
    }

    /// Remove every regular file in both staging directories.
    ///
    /// Intended for startup, to clear artifacts stranded by a crash.
    pub fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        let mut dirs = vec![&self.upload_dir];
        if self.output_dir != self.upload_dir {
            dirs.push(&self.output_dir);
        }

        for dir in dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::Io(e)),
            };
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_file() && release(&entry.path()) {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

fn unique_name(prefix: &str, ext: &str) -> String {
    let id = uuid::Uuid::new_v4().simple();
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() {
        format!("{prefix}_{id}")
    } else {
        format!("{prefix}_{id}.{ext}")
    }
}

/// A single artifact that is released when dropped.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        release(&self.path);
    }
}

/// Every artifact owned by one request.
///
/// Paths are released in insertion order by [`ArtifactSet::release_all`] or,
/// failing that, when the set is dropped.
#[derive(Debug)]
pub struct ArtifactSet {
    staging: Staging,
    paths: Vec<PathBuf>,
}

impl ArtifactSet {
    /// Allocate a path through [`Staging::allocate`] and take ownership of it.
    pub async fn allocate(&mut self, kind: ArtifactKind, prefix: &str, ext: &str) -> Result<PathBuf> {
        let path = self.staging.allocate(kind, prefix, ext).await?;
        self.paths.push(path.clone());
        Ok(path)
    }

    /// Take ownership of a path created elsewhere.
    pub fn adopt(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Move `path` out of the set into its own guard.
    ///
    /// Returns `None` if the set does not own `path`.
    pub fn detach(&mut self, path: &Path) -> Option<Artifact> {
        let idx = self.paths.iter().position(|p| p == path)?;
        Some(Artifact::new(self.paths.remove(idx)))
    }

    /// Release every owned path. Returns how many files were actually removed.
    pub fn release_all(&mut self) -> usize {
        let removed = self.paths.drain(..).filter(|p| release(p)).count();
        if removed > 0 {
            tracing::debug!("Released {} artifacts", removed);
        }
        removed
    }
}

impl Drop for ArtifactSet {
    fn drop(&mut self) {
        self.release_all();
    }
}
