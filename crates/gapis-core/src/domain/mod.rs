//! Domain entities
//!
//! This module contains the core domain types for gapis:
//! - Newtypes for validated identifiers, paths and content digests
//! - The remote [`Node`] snapshot and its raw wire metadata
//! - Domain-specific error types

pub mod errors;
pub mod newtypes;
pub mod node;

// Re-export commonly used types
pub use errors::DomainError;
pub use newtypes::*;
pub use node::{Node, NodeKind, RemoteMetadata, FOLDER_MIME_TYPE, NATIVE_MIME_PREFIX};
