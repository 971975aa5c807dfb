//! Configuration module for gapis.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Upload chunks must be a multiple of this size (256 KiB).
pub const UPLOAD_CHUNK_GRANULARITY_KB: u64 = 256;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for gapis.
///
/// Every section may be omitted from the file; missing sections and fields
/// fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub drive: DriveConfig,
    pub sync: SyncConfig,
    pub rate_limiting: RateLimitingConfig,
    pub large_files: LargeFilesConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
}

/// Remote store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Folder used by `drive upload` when `--folder-id` is not given.
    pub upload_folder_id: Option<String>,
    /// Folder `drive share` uploads into.
    pub share_folder_id: Option<String>,
    /// Format remote-native documents are exported to on pull.
    pub export_mime_type: String,
    /// Open the link of uploaded entries in a browser.
    pub open_browser: bool,
}

/// Default flags for push / pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delete entries on the destination side that the source lacks.
    pub remove_nonexisting: bool,
    /// Include names starting with `.`.
    pub hidden: bool,
}

/// Client-side request budgets, per request category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub list_requests_per_minute: u32,
    pub metadata_requests_per_minute: u32,
    pub upload_requests_per_minute: u32,
    pub download_requests_per_minute: u32,
    /// Retries after a throttle or server error before giving up.
    pub max_retries: u32,
}

/// Large file upload / chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LargeFilesConfig {
    /// Files above this size (in MiB) go through a resumable session.
    pub threshold_mb: u64,
    /// Size of each resumable upload chunk (in KiB).
    pub chunk_size_kb: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

/// Access token location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JSON file holding `access_token` and `expires_at`.
    pub token_file: PathBuf,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/gapis/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        config_dir().join("config.yaml")
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("gapis")
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            upload_folder_id: None,
            share_folder_id: None,
            export_mime_type: "application/pdf".to_string(),
            open_browser: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remove_nonexisting: true,
            hidden: true,
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            list_requests_per_minute: 300,
            metadata_requests_per_minute: 600,
            upload_requests_per_minute: 120,
            download_requests_per_minute: 240,
            max_retries: 5,
        }
    }
}

impl Default for LargeFilesConfig {
    fn default() -> Self {
        Self {
            threshold_mb: 5,
            chunk_size_kb: 10 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_file: config_dir().join("token.json"),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"large_files.chunk_size_kb"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn is_valid_folder_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- drive ---
        for (field, value) in [
            ("drive.upload_folder_id", &self.drive.upload_folder_id),
            ("drive.share_folder_id", &self.drive.share_folder_id),
        ] {
            if let Some(id) = value {
                if !is_valid_folder_id(id) {
                    errors.push(ValidationError {
                        field: field.into(),
                        message: format!("not a valid remote id: '{id}'"),
                    });
                }
            }
        }
        if !self.drive.export_mime_type.contains('/') {
            errors.push(ValidationError {
                field: "drive.export_mime_type".into(),
                message: format!(
                    "not a MIME type: '{}'",
                    self.drive.export_mime_type
                ),
            });
        }

        // --- rate_limiting ---
        for (field, value) in [
            (
                "rate_limiting.list_requests_per_minute",
                self.rate_limiting.list_requests_per_minute,
            ),
            (
                "rate_limiting.metadata_requests_per_minute",
                self.rate_limiting.metadata_requests_per_minute,
            ),
            (
                "rate_limiting.upload_requests_per_minute",
                self.rate_limiting.upload_requests_per_minute,
            ),
            (
                "rate_limiting.download_requests_per_minute",
                self.rate_limiting.download_requests_per_minute,
            ),
        ] {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        }

        // --- large_files ---
        if self.large_files.threshold_mb == 0 {
            errors.push(ValidationError {
                field: "large_files.threshold_mb".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.large_files.chunk_size_kb == 0
            || self.large_files.chunk_size_kb % UPLOAD_CHUNK_GRANULARITY_KB != 0
        {
            errors.push(ValidationError {
                field: "large_files.chunk_size_kb".into(),
                message: format!(
                    "must be a positive multiple of {UPLOAD_CHUNK_GRANULARITY_KB} (got {})",
                    self.large_files.chunk_size_kb
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}
