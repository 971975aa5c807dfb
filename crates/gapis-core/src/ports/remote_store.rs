//! Remote store port (driven/secondary port)
//!
//! This module defines the interface to the hierarchical remote file store.
//! The shipped adapter talks to Google Drive v3, but nothing here depends on
//! it: the sync engine and its tests only see [`IRemoteStore`].
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because transport errors are adapter-specific.
//! - Listings are complete: pagination happens inside the adapter.
//! - Every mutating call returns a fresh [`Node`] snapshot.
//! - Retry and rate limiting are the adapter's concern; callers see either
//!   success or a final error.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::newtypes::RemoteId;
use crate::domain::node::Node;

// ============================================================================
// Tokens
// ============================================================================

/// OAuth tokens issued for the remote store
///
/// Acquiring and refreshing them happens outside this program; adapters
/// only consume `access_token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Kept so the file round-trips; not used here
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Returns true if the access token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: chrono::Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

// ============================================================================
// IRemoteStore trait
// ============================================================================

/// Port trait for the remote hierarchical store
///
/// Names are not unique among siblings and an entry may have several
/// parents; callers must not assume otherwise.
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Lists every non-trashed child of `parent`
    ///
    /// # Arguments
    /// * `parent` - Folder to list
    /// * `include_folders` - When false, sub-folders are left out
    async fn list_children(
        &self,
        parent: &RemoteId,
        include_folders: bool,
    ) -> anyhow::Result<Vec<Node>>;

    /// Fetches a single entry
    async fn get(&self, id: &RemoteId) -> anyhow::Result<Node>;

    /// Finds non-trashed entries whose name contains `name_contains`,
    /// optionally restricted to the children of `parent`
    async fn search(
        &self,
        parent: Option<&RemoteId>,
        name_contains: &str,
    ) -> anyhow::Result<Vec<Node>>;

    /// Creates a file under `parent`
    ///
    /// With `content` of `None` (or an empty slice) no payload is
    /// transferred and the entry is created from metadata alone.
    /// `mime_type` of `None` lets the store infer one.
    async fn create_file(
        &self,
        parent: &RemoteId,
        name: &str,
        mime_type: Option<&str>,
        content: Option<&[u8]>,
    ) -> anyhow::Result<Node>;

    /// Creates a folder under `parent`
    async fn create_folder(&self, parent: &RemoteId, name: &str) -> anyhow::Result<Node>;

    /// Replaces the content of an existing file
    async fn update_content(&self, id: &RemoteId, content: &[u8]) -> anyhow::Result<Node>;

    /// Renames an entry in place
    async fn rename(&self, id: &RemoteId, new_name: &str) -> anyhow::Result<Node>;

    /// Moves an entry from `old_parent` to `new_parent`
    async fn move_to(
        &self,
        id: &RemoteId,
        new_parent: &RemoteId,
        old_parent: &RemoteId,
    ) -> anyhow::Result<Node>;

    /// Deletes an entry (folders recursively)
    async fn delete(&self, id: &RemoteId) -> anyhow::Result<()>;

    /// Downloads a regular file into `dest`, replacing it
    ///
    /// # Returns
    /// Number of bytes written
    async fn download(&self, id: &RemoteId, dest: &Path) -> anyhow::Result<u64>;

    /// Exports an opaque document as `mime_type` into `dest`, replacing it
    ///
    /// # Returns
    /// Number of bytes written
    async fn export(&self, id: &RemoteId, mime_type: &str, dest: &Path) -> anyhow::Result<u64>;

    /// Reads the full content of a regular file into memory
    async fn read_content(&self, id: &RemoteId) -> anyhow::Result<Vec<u8>>;

    /// Grants (or revokes) read access to anyone with the link
    async fn set_sharing(&self, id: &RemoteId, public: bool) -> anyhow::Result<()>;
}
