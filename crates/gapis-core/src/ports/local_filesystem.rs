//! Local filesystem port (driven/secondary port)
//!
//! This module defines the interface for interacting with the local
//! filesystem: directory listings, whole-file hashing, file I/O and
//! directory tree management.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific.
//! - All paths are `SyncPath` instances, which are guaranteed to be absolute.
//! - `compute_hash` must use the same digest as the remote store reports
//!   (MD5, lowercase hex) so the two can be compared directly.

use crate::domain::newtypes::{FileHash, SyncPath};

/// One entry of a local directory listing
///
/// Content hashes are not part of the listing; callers hash on demand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalEntry {
    pub name: String,
    pub is_dir: bool,
}

impl LocalEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }

    /// Names starting with `.`
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

/// Port trait for local filesystem operations
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Lists the entries of a directory
    ///
    /// Entries whose names are not valid UTF-8 are skipped.
    ///
    /// # Errors
    /// Returns an error if the path is not a readable directory
    async fn list_dir(&self, path: &SyncPath) -> anyhow::Result<Vec<LocalEntry>>;

    /// Returns true if anything exists at the path
    async fn exists(&self, path: &SyncPath) -> anyhow::Result<bool>;

    /// Returns true if the path exists and is a directory
    async fn is_dir(&self, path: &SyncPath) -> anyhow::Result<bool>;

    /// Computes the whole-file content digest
    async fn compute_hash(&self, path: &SyncPath) -> anyhow::Result<FileHash>;

    /// Reads the entire contents of a file
    async fn read_file(&self, path: &SyncPath) -> anyhow::Result<Vec<u8>>;

    /// Writes data to a file, replacing it atomically
    ///
    /// Parent directories are created as needed.
    async fn write_file(&self, path: &SyncPath, data: &[u8]) -> anyhow::Result<()>;

    /// Creates a directory and any missing parents
    async fn create_directory(&self, path: &SyncPath) -> anyhow::Result<()>;

    /// Deletes a single file
    async fn remove_file(&self, path: &SyncPath) -> anyhow::Result<()>;

    /// Deletes a directory and everything below it
    async fn remove_tree(&self, path: &SyncPath) -> anyhow::Result<()>;
}
