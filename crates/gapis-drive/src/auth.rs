//! Access token lookup for the Drive API
//!
//! Tokens are obtained outside this tool (any OAuth client for the Drive
//! scope will do) and handed over either through the `GAPIS_ACCESS_TOKEN`
//! environment variable or a JSON token file written by `gapis auth login`.
//! Refreshing expired tokens is not done here.
//!
//! ## Components
//!
//! - [`FileTokenStorage`] - JSON token file with owner-only permissions
//! - [`resolve_access_token`] - Environment first, then the token file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gapis_core::ports::remote_store::Tokens;
use tracing::{debug, info};

use crate::DriveError;

/// Environment variable holding a bearer token; wins over the token file
pub const ACCESS_TOKEN_ENV: &str = "GAPIS_ACCESS_TOKEN";

// ============================================================================
// FileTokenStorage
// ============================================================================

/// Stores and retrieves tokens from a JSON file
///
/// The file is written atomically (temporary sibling, then rename) and,
/// on Unix, readable by its owner only.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `tokens`, creating parent directories as needed
    pub fn store(&self, tokens: &Tokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(tokens).context("Failed to serialize tokens")?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Stored tokens");
        Ok(())
    }

    /// Reads the stored tokens
    ///
    /// # Returns
    /// `Some(Tokens)` if the file exists, `None` if it does not
    pub fn load(&self) -> Result<Option<Tokens>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        let tokens = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed token file {}", self.path.display()))?;
        Ok(Some(tokens))
    }

    /// Deletes the token file; succeeds if it is already gone
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed stored tokens");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions of {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

// ============================================================================
// Lookup
// ============================================================================

/// Picks a usable access token
///
/// `env_token` (the value of [`ACCESS_TOKEN_ENV`], if set and non-empty)
/// takes precedence; otherwise the stored tokens are used.
///
/// # Errors
/// - [`DriveError::MissingToken`] when neither source has one
/// - [`DriveError::TokenExpired`] when the stored token has expired
pub fn resolve_access_token(
    env_token: Option<String>,
    storage: &FileTokenStorage,
) -> Result<String> {
    if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
        debug!("Using access token from {}", ACCESS_TOKEN_ENV);
        return Ok(token.trim().to_string());
    }

    let tokens = storage.load()?.ok_or(DriveError::MissingToken)?;
    if tokens.is_expired() {
        return Err(DriveError::TokenExpired.into());
    }
    Ok(tokens.access_token)
}

/// [`resolve_access_token`] with the process environment
pub fn access_token_from_env(storage: &FileTokenStorage) -> Result<String> {
    resolve_access_token(std::env::var(ACCESS_TOKEN_ENV).ok(), storage)
}
