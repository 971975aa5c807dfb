//! Auth commands - store, inspect and remove the Drive access token
//!
//! gapis does not run an OAuth flow itself. `login` stores a token obtained
//! elsewhere in the token file; `GAPIS_ACCESS_TOKEN` overrides the file.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Subcommand;
use gapis_core::ports::remote_store::Tokens;
use gapis_drive::auth::ACCESS_TOKEN_ENV;
use tracing::info;

use super::AppContext;

/// Lifetime assumed for a token when `--expires-in` is not given
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Store an access token
    Login {
        /// Bearer token for the Drive scope
        #[arg(long)]
        token: String,
        /// Seconds until the token expires
        #[arg(long, default_value_t = DEFAULT_TOKEN_LIFETIME_SECS)]
        expires_in: i64,
    },
    /// Show where the token comes from and whether it is still valid
    Status,
    /// Remove the stored token
    Logout,
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        match self {
            AuthCommand::Login { token, expires_in } => execute_login(ctx, token, *expires_in),
            AuthCommand::Status => execute_status(ctx),
            AuthCommand::Logout => execute_logout(ctx),
        }
    }
}

fn execute_login(ctx: &AppContext, token: &str, expires_in: i64) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("The token is empty");
    }
    if expires_in <= 0 {
        anyhow::bail!("--expires-in must be positive");
    }

    let expires_at = Duration::try_seconds(expires_in)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .context("--expires-in is out of range")?;

    let storage = ctx.token_storage();
    let tokens = Tokens {
        access_token: token.to_string(),
        refresh_token: None,
        expires_at,
    };
    storage.store(&tokens).context("Failed to store token")?;
    info!(path = %storage.path().display(), "Token stored");

    let fmt = ctx.formatter();
    if ctx.is_json() {
        fmt.print_json(&serde_json::json!({
            "success": true,
            "token_file": storage.path().display().to_string(),
            "expires_at": tokens.expires_at.to_rfc3339(),
        }));
    } else {
        fmt.success(&format!("Token stored in {}", storage.path().display()));
        fmt.info(&format!("Expires at {}", tokens.expires_at.to_rfc3339()));
    }
    Ok(())
}

fn execute_status(ctx: &AppContext) -> Result<()> {
    let fmt = ctx.formatter();
    let storage = ctx.token_storage();
    let from_env = std::env::var(ACCESS_TOKEN_ENV)
        .map(|t| !t.trim().is_empty())
        .unwrap_or(false);
    let stored = storage.load()?;

    if ctx.is_json() {
        fmt.print_json(&serde_json::json!({
            "env_token": from_env,
            "token_file": storage.path().display().to_string(),
            "stored": stored.is_some(),
            "expires_at": stored.as_ref().map(|t| t.expires_at.to_rfc3339()),
            "expired": stored.as_ref().map(Tokens::is_expired),
        }));
        return Ok(());
    }

    if from_env {
        fmt.success(&format!("Using the token from {ACCESS_TOKEN_ENV}"));
    }
    match stored {
        Some(tokens) if tokens.is_expired() => fmt.warn(&format!(
            "Stored token expired at {}",
            tokens.expires_at.to_rfc3339()
        )),
        Some(tokens) => {
            let remaining = tokens.expires_at - Utc::now();
            fmt.success(&format!(
                "Stored token valid for {} more minutes",
                remaining.num_minutes()
            ));
        }
        None if from_env => {}
        None => fmt.warn("Not logged in. Run 'gapis auth login --token <TOKEN>'."),
    }
    fmt.info(&format!("Token file: {}", storage.path().display()));
    Ok(())
}

fn execute_logout(ctx: &AppContext) -> Result<()> {
    let storage = ctx.token_storage();
    storage.clear()?;
    ctx.formatter().success("Stored token removed");
    Ok(())
}
