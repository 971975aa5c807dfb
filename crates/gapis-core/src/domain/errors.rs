//! Domain error types
//!
//! Validation failures raised while constructing domain values from
//! user input or remote metadata.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid hash format (expected lowercase hex MD5)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid entry name (empty or containing a path separator)
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Remote metadata lacks a required field
    #[error("Missing required field '{field}' in remote metadata")]
    MissingField {
        /// Wire name of the absent field
        field: &'static str,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
