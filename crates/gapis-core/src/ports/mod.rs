//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync engine
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - Hierarchical remote file store (Google Drive)
//! - [`ILocalFileSystem`] - Local directory listings, hashing and file I/O

pub mod local_filesystem;
pub mod remote_store;

pub use local_filesystem::{ILocalFileSystem, LocalEntry};
pub use remote_store::{IRemoteStore, Tokens};
