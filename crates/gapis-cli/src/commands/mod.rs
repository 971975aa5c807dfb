//! CLI subcommands
//!
//! Each command receives the shared [`AppContext`] built in `main`.

pub mod auth;
pub mod completions;
pub mod config;
pub mod drive;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use gapis_core::config::Config;
use gapis_drive::auth::{access_token_from_env, FileTokenStorage};
use gapis_drive::provider::DriveRemoteStore;
use tracing::debug;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Settings every command runs with
#[derive(Debug)]
pub struct AppContext {
    pub format: OutputFormat,
    pub quiet: bool,
    pub config_path: PathBuf,
    pub config: Config,
}

impl AppContext {
    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn token_storage(&self) -> FileTokenStorage {
        FileTokenStorage::new(&self.config.auth.token_file)
    }

    /// Drive store authenticated with the environment or stored token
    pub fn remote_store(&self) -> Result<Arc<DriveRemoteStore>> {
        let token = access_token_from_env(&self.token_storage())?;
        Ok(Arc::new(DriveRemoteStore::from_config(token, &self.config)))
    }
}

/// Opens `url` in the default browser unless disabled; failures are logged
pub fn open_link(config: &Config, no_browser: bool, url: &str) {
    if !config.drive.open_browser || no_browser {
        return;
    }
    if let Err(e) = webbrowser::open(url) {
        debug!(error = %e, url, "Could not open browser");
    }
}
