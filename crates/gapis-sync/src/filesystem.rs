//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: Uses write-to-temp + rename to avoid partial writes
//!   on crash or power loss.
//! - **MD5 hashing**: Files are streamed through an MD5 digest in fixed-size
//!   blocks, matching the `md5Checksum` the remote store reports.
//! - **UTF-8 names only**: entries whose names cannot be represented as
//!   UTF-8 are left out of listings; they could never match a remote name.

use std::io::ErrorKind;
use std::path::PathBuf;

use gapis_core::{
    domain::newtypes::{FileHash, SyncPath},
    ports::local_filesystem::{ILocalFileSystem, LocalEntry},
};
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};

/// Read block size used while hashing.
const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct because all operations derive their context
/// from the [`SyncPath`] arguments.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Sibling path used while a write is in flight.
fn temp_path_for(target: &std::path::Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.partial"))
}

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(path = %path))]
    async fn list_dir(&self, path: &SyncPath) -> anyhow::Result<Vec<LocalEntry>> {
        let mut reader = tokio::fs::read_dir(path.as_path()).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(name = ?raw, "skipping entry with non UTF-8 name");
                    continue;
                }
            };
            // Follows symlinks so a link to a directory is listed as one.
            let is_dir = match tokio::fs::metadata(entry.path()).await {
                Ok(meta) => meta.is_dir(),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(%name, "skipping dangling entry");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            entries.push(LocalEntry { name, is_dir });
        }

        entries.sort();
        debug!(count = entries.len(), "directory listed");
        Ok(entries)
    }

    async fn exists(&self, path: &SyncPath) -> anyhow::Result<bool> {
        Ok(tokio::fs::try_exists(path.as_path()).await?)
    }

    async fn is_dir(&self, path: &SyncPath) -> anyhow::Result<bool> {
        match tokio::fs::metadata(path.as_path()).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn compute_hash(&self, path: &SyncPath) -> anyhow::Result<FileHash> {
        let mut file = tokio::fs::File::open(path.as_path()).await?;
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; HASH_BLOCK_SIZE];
        let mut total = 0u64;

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }

        let hash = FileHash::from_digest(&hasher.finalize())?;
        debug!(bytes = total, %hash, "hash computed");
        Ok(hash)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn read_file(&self, path: &SyncPath) -> anyhow::Result<Vec<u8>> {
        let data = tokio::fs::read(path.as_path()).await?;
        debug!(bytes = data.len(), "file read complete");
        Ok(data)
    }

    #[instrument(skip(self, data), fields(path = %path, bytes = data.len()))]
    async fn write_file(&self, path: &SyncPath, data: &[u8]) -> anyhow::Result<()> {
        let target = path.as_path();

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Same directory, so the rename stays on one filesystem.
        let tmp_path = temp_path_for(target);
        debug!(?tmp_path, "writing to temporary file");
        tokio::fs::write(&tmp_path, data).await?;
        tokio::fs::rename(&tmp_path, target).await?;

        debug!("write complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn create_directory(&self, path: &SyncPath) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path.as_path()).await?;
        debug!("directory created");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn remove_file(&self, path: &SyncPath) -> anyhow::Result<()> {
        tokio::fs::remove_file(path.as_path()).await?;
        debug!("file removed");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn remove_tree(&self, path: &SyncPath) -> anyhow::Result<()> {
        tokio::fs::remove_dir_all(path.as_path()).await?;
        debug!("directory tree removed");
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================
