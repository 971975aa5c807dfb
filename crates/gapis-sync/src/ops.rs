//! Folder helpers built on [`IRemoteStore`]
//!
//! Small compositions of port calls used by the CLI. None of them retry or
//! hold state.

use anyhow::{Context, Result};
use tracing::{debug, info};

use gapis_core::domain::newtypes::RemoteId;
use gapis_core::domain::node::Node;
use gapis_core::ports::remote_store::IRemoteStore;

/// Return the first child of `parent` named `name` of the requested type,
/// creating one if there is none
///
/// Files are created empty. Returns the node and whether it was created.
pub async fn get_or_create(
    store: &dyn IRemoteStore,
    parent: &RemoteId,
    name: &str,
    folder: bool,
) -> Result<(Node, bool)> {
    let children = store
        .list_children(parent, folder)
        .await
        .with_context(|| format!("Failed to list {parent}"))?;

    if let Some(existing) = children
        .into_iter()
        .find(|c| c.name() == name && c.is_directory() == folder)
    {
        debug!(id = %existing.id(), name, "Found existing entry");
        return Ok((existing, false));
    }

    let created = if folder {
        store.create_folder(parent, name).await
    } else {
        store.create_file(parent, name, None, None).await
    };
    let created = created.with_context(|| format!("Failed to create '{name}' in {parent}"))?;
    info!(id = %created.id(), name, folder, "Created entry");
    Ok((created, true))
}

/// Delete every child of `folder`, returning how many were removed
pub async fn clear_folder(store: &dyn IRemoteStore, folder: &RemoteId) -> Result<usize> {
    let children = store
        .list_children(folder, true)
        .await
        .with_context(|| format!("Failed to list {folder}"))?;

    for child in &children {
        store
            .delete(child.id())
            .await
            .with_context(|| format!("Failed to delete {}", child.id()))?;
    }
    info!(folder = %folder, removed = children.len(), "Folder cleared");
    Ok(children.len())
}

/// Move every child of `from` into `to`, returning how many were moved
pub async fn move_contents(
    store: &dyn IRemoteStore,
    from: &RemoteId,
    to: &RemoteId,
    include_folders: bool,
) -> Result<usize> {
    let children = store
        .list_children(from, include_folders)
        .await
        .with_context(|| format!("Failed to list {from}"))?;

    for child in &children {
        store
            .move_to(child.id(), to, from)
            .await
            .with_context(|| format!("Failed to move {}", child.id()))?;
    }
    info!(from = %from, to = %to, moved = children.len(), "Contents moved");
    Ok(children.len())
}
