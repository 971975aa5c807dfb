//! gapis Sync - Directory synchronization against a remote store
//!
//! Provides:
//! - One-way recursive mirroring of a local tree onto a remote folder (push)
//! - The reverse direction, remote folder onto a local tree (pull)
//! - Whole-file MD5 change detection on both sides
//!
//! ## Modules
//!
//! - [`engine`] - `SyncEngine` with push / pull / upload
//! - [`filesystem`] - Local filesystem adapter (atomic writes, MD5 hashing)
//! - [`ops`] - Small folder helpers built on the remote store port

pub mod engine;
pub mod filesystem;
pub mod ops;

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the sync engine before or during a traversal
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote node or local path that must be a directory is not one
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// The local side of a push or upload does not exist
    #[error("Local path not found: {0}")]
    LocalPathMissing(PathBuf),

    /// A domain-level error propagated from gapis-core
    #[error("Domain error: {0}")]
    DomainError(#[from] gapis_core::domain::errors::DomainError),
}
