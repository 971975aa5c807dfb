//! Drive commands - upload, share, push, pull and folder operations
//!
//! Provides the `gapis drive` CLI subcommands. Each one:
//! 1. Resolves the access token and builds a [`DriveRemoteStore`]
//! 2. Resolves the remote ids and local paths it was given
//! 3. Runs the [`SyncEngine`] or a folder helper and prints the result

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use gapis_core::domain::newtypes::{RemoteId, SyncPath};
use gapis_core::domain::node::Node;
use gapis_core::ports::remote_store::IRemoteStore;
use gapis_drive::provider::DriveRemoteStore;
use gapis_sync::engine::{SyncEngine, SyncOptions, SyncReport};
use gapis_sync::filesystem::LocalFileSystemAdapter;
use gapis_sync::ops;
use tracing::info;

use super::{open_link, AppContext};
use crate::output::{plural, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum DriveCommand {
    /// Upload a file, or a directory as a new folder, and print its link
    Upload(UploadArgs),
    /// Upload into the share folder and make the result public
    Share(ShareArgs),
    /// Make a remote folder mirror a local directory
    Push(MirrorArgs),
    /// Make a local directory mirror a remote folder
    Pull(MirrorArgs),
    /// List the children of a folder
    Ls {
        /// Folder id ("root" for My Drive)
        folder_id: String,
        /// Leave folders out
        #[arg(long)]
        files_only: bool,
    },
    /// Show one entry
    Info {
        /// Entry id
        id: String,
    },
    /// Find or create an entry by name
    Mkdir {
        /// Name to look up or create
        name: String,
        /// Parent folder id
        #[arg(long, default_value = "root")]
        parent: String,
        /// Create an empty file instead of a folder
        #[arg(long)]
        file: bool,
    },
    /// Delete every child of a folder
    Clear {
        /// Folder id
        folder_id: String,
    },
    /// Search entries whose name contains a text
    Search {
        /// Text to look for
        text: String,
        /// Limit the search to children of this folder
        #[arg(long)]
        parent: Option<String>,
    },
    /// Delete an entry
    Rm {
        /// Entry id
        id: String,
    },
    /// Rename an entry
    Rename {
        /// Entry id
        id: String,
        /// New name
        name: String,
    },
    /// Move every child of one folder into another
    MoveContents {
        /// Source folder id
        from: String,
        /// Destination folder id
        to: String,
        /// Leave folders where they are
        #[arg(long)]
        files_only: bool,
    },
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// File or directory to upload
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
    /// Destination folder; defaults to `drive.upload_folder_id`, then "root"
    #[arg(long)]
    pub folder_id: Option<String>,
    /// Print the link without opening it
    #[arg(long)]
    pub no_browser: bool,
}

#[derive(Debug, Args)]
pub struct ShareArgs {
    /// File or directory to share
    pub path: PathBuf,
    /// Print the link without opening it
    #[arg(long)]
    pub no_browser: bool,
}

#[derive(Debug, Args)]
pub struct MirrorArgs {
    /// Local directory
    pub path: PathBuf,
    /// Remote folder id
    #[arg(long)]
    pub folder_id: String,
    /// Keep destination entries that have no source counterpart
    #[arg(long)]
    pub keep_extra: bool,
    /// Only sync these top-level names (repeatable)
    #[arg(long = "only", value_name = "NAME")]
    pub only: Vec<String>,
    /// Leave names starting with '.' out
    #[arg(long)]
    pub skip_hidden: bool,
}

impl MirrorArgs {
    /// Options from the `sync` config section with the flags applied
    fn options(&self, ctx: &AppContext) -> SyncOptions {
        let defaults = SyncOptions::from_config(&ctx.config);
        SyncOptions {
            remove_nonexisting: defaults.remove_nonexisting && !self.keep_extra,
            subfolders: (!self.only.is_empty()).then(|| self.only.clone()),
            hidden: defaults.hidden && !self.skip_hidden,
        }
    }
}

fn remote_id(raw: &str) -> Result<RemoteId> {
    RemoteId::new(raw.to_string()).with_context(|| format!("Invalid id '{raw}'"))
}

fn local_path(path: &std::path::Path) -> Result<SyncPath> {
    SyncPath::resolve(path).with_context(|| format!("Invalid path '{}'", path.display()))
}

fn engine(ctx: &AppContext, store: &Arc<DriveRemoteStore>) -> SyncEngine {
    SyncEngine::new(
        store.clone(),
        Arc::new(LocalFileSystemAdapter::new()),
        &ctx.config,
    )
}

fn kind_label(node: &Node) -> &'static str {
    if node.is_directory() {
        "folder"
    } else if node.is_opaque_document() {
        "doc"
    } else {
        "file"
    }
}

fn node_json(node: &Node) -> serde_json::Value {
    let mut value = serde_json::to_value(node).unwrap_or_default();
    value["link"] = serde_json::json!(node.web_link());
    value
}

fn print_report(fmt: &dyn OutputFormatter, json: bool, report: &SyncReport) {
    if json {
        fmt.print_json(&serde_json::to_value(report).unwrap_or_default());
        return;
    }

    if report.remote_mutations() + report.local_mutations() == 0 && report.conflicts.is_empty() {
        fmt.success("Already up to date");
    } else {
        fmt.success(&format!("Done in {}ms", report.duration_ms));
    }

    for (label, n) in [
        ("Uploaded:", report.files_uploaded),
        ("Updated:", report.files_updated),
        ("Downloaded:", report.files_downloaded),
        ("Exported:", report.documents_exported),
        ("Remote folders created:", report.remote_folders_created),
        ("Local folders created:", report.local_folders_created),
        ("Remote deleted:", report.remote_deleted),
        ("Local deleted:", report.local_deleted),
    ] {
        if n > 0 {
            fmt.info(&format!("{label:<24} {n} entr{}", if n == 1 { "y" } else { "ies" }));
        }
    }
    if report.skipped_ambiguous > 0 {
        fmt.warn(&format!(
            "{} entr{} skipped: several remote entries share the name",
            report.skipped_ambiguous,
            if report.skipped_ambiguous == 1 { "y" } else { "ies" }
        ));
    }
    for conflict in &report.conflicts {
        fmt.warn(&format!("Skipped {conflict}"));
    }
}

fn print_nodes(fmt: &dyn OutputFormatter, json: bool, nodes: &[Node]) {
    if json {
        fmt.print_json(&serde_json::Value::Array(nodes.iter().map(node_json).collect()));
        return;
    }
    for node in nodes {
        println!(
            "{:<6} {:<44} {:>12}  {}",
            kind_label(node),
            node.id(),
            node.size(),
            node.name()
        );
    }
}

impl DriveCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let store = ctx.remote_store()?;
        let fmt = ctx.formatter();
        let fmt = &*fmt;

        match self {
            DriveCommand::Upload(args) => execute_upload(ctx, &store, fmt, args).await,
            DriveCommand::Share(args) => execute_share(ctx, &store, fmt, args).await,
            DriveCommand::Push(args) => {
                let node = store.get(&remote_id(&args.folder_id)?).await?;
                let local = local_path(&args.path)?;
                info!(folder = %node.id(), local = %local, "Pushing");
                let report = engine(ctx, &store)
                    .push(&node, &local, &args.options(ctx))
                    .await?;
                print_report(fmt, ctx.is_json(), &report);
                Ok(())
            }
            DriveCommand::Pull(args) => {
                let node = store.get(&remote_id(&args.folder_id)?).await?;
                let local = local_path(&args.path)?;
                info!(folder = %node.id(), local = %local, "Pulling");
                let report = engine(ctx, &store)
                    .pull(&node, &local, &args.options(ctx))
                    .await?;
                print_report(fmt, ctx.is_json(), &report);
                Ok(())
            }
            DriveCommand::Ls {
                folder_id,
                files_only,
            } => {
                let children = store
                    .list_children(&remote_id(folder_id)?, !files_only)
                    .await?;
                print_nodes(fmt, ctx.is_json(), &children);
                Ok(())
            }
            DriveCommand::Info { id } => {
                let node = store.get(&remote_id(id)?).await?;
                if ctx.is_json() {
                    fmt.print_json(&node_json(&node));
                } else {
                    fmt.field("Name", &node.name());
                    fmt.field("Id", node.id());
                    fmt.field(
                        "Type",
                        &format!("{} ({})", kind_label(&node), node.mime_type()),
                    );
                    if !node.is_directory() && !node.is_opaque_document() {
                        fmt.field("Size", &node.size());
                        if let Some(md5) = node.content_fingerprint() {
                            fmt.field("MD5", md5);
                        }
                    }
                    for parent in node.parent_ids() {
                        fmt.field("Parent", parent);
                    }
                    fmt.field("Link", &node.web_link());
                }
                Ok(())
            }
            DriveCommand::Mkdir { name, parent, file } => {
                let (node, created) =
                    ops::get_or_create(&*store, &remote_id(parent)?, name, !file).await?;
                if ctx.is_json() {
                    let mut value = node_json(&node);
                    value["created"] = serde_json::json!(created);
                    fmt.print_json(&value);
                } else if created {
                    fmt.success(&format!("Created '{}' ({})", node.name(), node.id()));
                } else {
                    fmt.success(&format!("'{}' already exists ({})", node.name(), node.id()));
                }
                Ok(())
            }
            DriveCommand::Clear { folder_id } => {
                let removed = ops::clear_folder(&*store, &remote_id(folder_id)?).await?;
                if ctx.is_json() {
                    fmt.print_json(&serde_json::json!({ "removed": removed }));
                } else {
                    fmt.success(&format!(
                        "Removed {removed} entr{}",
                        if removed == 1 { "y" } else { "ies" }
                    ));
                }
                Ok(())
            }
            DriveCommand::Search { text, parent } => {
                let parent = parent.as_deref().map(remote_id).transpose()?;
                let found = store.search(parent.as_ref(), text).await?;
                print_nodes(fmt, ctx.is_json(), &found);
                Ok(())
            }
            DriveCommand::Rm { id } => {
                store.delete(&remote_id(id)?).await?;
                fmt.success(&format!("Deleted {id}"));
                Ok(())
            }
            DriveCommand::Rename { id, name } => {
                let node = store.rename(&remote_id(id)?, name).await?;
                if ctx.is_json() {
                    fmt.print_json(&node_json(&node));
                } else {
                    fmt.success(&format!("Renamed {} to '{}'", node.id(), node.name()));
                }
                Ok(())
            }
            DriveCommand::MoveContents {
                from,
                to,
                files_only,
            } => {
                let moved =
                    ops::move_contents(&*store, &remote_id(from)?, &remote_id(to)?, !files_only)
                        .await?;
                if ctx.is_json() {
                    fmt.print_json(&serde_json::json!({ "moved": moved }));
                } else {
                    fmt.success(&format!("Moved {moved} entr{}", if moved == 1 { "y" } else { "ies" }));
                }
                Ok(())
            }
        }
    }
}

/// Uploads `path` under `parent`, prints the resulting link and returns the node
async fn upload_to(
    ctx: &AppContext,
    store: &Arc<DriveRemoteStore>,
    fmt: &dyn OutputFormatter,
    parent: &RemoteId,
    path: &std::path::Path,
) -> Result<Node> {
    let parent = store
        .get(parent)
        .await
        .with_context(|| format!("Failed to look up destination folder {parent}"))?;
    let local = local_path(path)?;
    let (node, report) = engine(ctx, store)
        .upload(&parent, &local, &SyncOptions::from_config(&ctx.config))
        .await?;

    if !ctx.is_json() {
        let files = report.files_uploaded;
        fmt.success(&format!(
            "Uploaded '{}' ({files} file{})",
            node.name(),
            plural(files)
        ));
    }
    Ok(node)
}

async fn execute_upload(
    ctx: &AppContext,
    store: &Arc<DriveRemoteStore>,
    fmt: &dyn OutputFormatter,
    args: &UploadArgs,
) -> Result<()> {
    let folder = args
        .folder_id
        .as_deref()
        .or(ctx.config.drive.upload_folder_id.as_deref())
        .map(remote_id)
        .transpose()?
        .unwrap_or_else(RemoteId::root);

    let node = upload_to(ctx, store, fmt, &folder, &args.path).await?;
    let link = node.web_link();
    if ctx.is_json() {
        fmt.print_json(&node_json(&node));
    } else {
        println!("{link}");
    }
    open_link(&ctx.config, args.no_browser, &link);
    Ok(())
}

async fn execute_share(
    ctx: &AppContext,
    store: &Arc<DriveRemoteStore>,
    fmt: &dyn OutputFormatter,
    args: &ShareArgs,
) -> Result<()> {
    let folder = ctx
        .config
        .drive
        .share_folder_id
        .as_deref()
        .context("drive.share_folder_id is not set in the configuration")?;
    let folder = remote_id(folder)?;

    let node = upload_to(ctx, store, fmt, &folder, &args.path).await?;
    store
        .set_sharing(node.id(), true)
        .await
        .with_context(|| format!("Uploaded {} but could not share it", node.id()))?;

    let link = node.web_link();
    if ctx.is_json() {
        let mut value = node_json(&node);
        value["shared"] = serde_json::json!(true);
        fmt.print_json(&value);
    } else {
        fmt.success("Anyone with the link can view it");
        println!("{link}");
    }
    open_link(&ctx.config, args.no_browser, &link);
    Ok(())
}
