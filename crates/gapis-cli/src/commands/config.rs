//! Config command - View and check the gapis configuration
//!
//! Provides the `gapis config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors
//! 3. Prints the configuration file location

use anyhow::{Context, Result};
use clap::Subcommand;
use gapis_core::config::Config;
use tracing::info;

use super::AppContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(ctx),
            ConfigCommand::Validate => execute_validate(ctx),
            ConfigCommand::Path => execute_path(ctx),
        }
    }
}

fn execute_show(ctx: &AppContext) -> Result<()> {
    let formatter = ctx.formatter();
    info!(config_path = %ctx.config_path.display(), "Showing configuration");

    if ctx.is_json() {
        let json = serde_json::to_value(&ctx.config)
            .context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
        formatter.info("");
        for line in ctx.config.to_yaml()?.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

/// Problems with the file at `path`: a parse failure or validation errors
///
/// `None` means the file does not exist.
fn validation_errors(path: &std::path::Path) -> Option<Vec<String>> {
    if !path.exists() {
        return None;
    }
    Some(match Config::load(path) {
        Ok(config) => config.validate().iter().map(ToString::to_string).collect(),
        Err(e) => vec![format!("{e:#}")],
    })
}

fn execute_validate(ctx: &AppContext) -> Result<()> {
    let formatter = ctx.formatter();
    let path = ctx.config_path.display().to_string();

    let Some(errors) = validation_errors(&ctx.config_path) else {
        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "valid": true,
                "config_path": path,
                "exists": false,
            }));
        } else {
            formatter.info(&format!("Configuration file not found at {path}"));
            formatter.info("Defaults are in effect.");
        }
        return Ok(());
    };

    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": path,
            "exists": true,
            "errors": errors,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {path}"));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            crate::output::plural(errors.len() as u64)
        ));
        formatter.info(&format!("File: {path}"));
        for error in &errors {
            formatter.info(&format!("  {error}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("invalid configuration")
    }
}

fn execute_path(ctx: &AppContext) -> Result<()> {
    if ctx.is_json() {
        ctx.formatter().print_json(&serde_json::json!({
            "config_path": ctx.config_path.display().to_string(),
            "exists": ctx.config_path.exists(),
        }));
    } else {
        println!("{}", ctx.config_path.display());
    }
    Ok(())
}
