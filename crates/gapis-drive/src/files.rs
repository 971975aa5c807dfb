//! Drive `files` and `permissions` resource calls
//!
//! Thin functions over [`DriveClient`] returning raw [`RemoteMetadata`];
//! validation into domain nodes happens in the provider.
//!
//! ## Drive API References
//!
//! - [files.list](https://developers.google.com/drive/api/reference/rest/v3/files/list)
//! - [Search query terms](https://developers.google.com/drive/api/guides/ref-search-terms)
//! - [files.export](https://developers.google.com/drive/api/reference/rest/v3/files/export)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use gapis_core::domain::newtypes::RemoteId;
use gapis_core::domain::node::{RemoteMetadata, FOLDER_MIME_TYPE};
use reqwest::{Method, Response};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::client::DriveClient;
use crate::rate_limit::Category;

/// Fields requested for every file resource
pub const FILE_FIELDS: &str = "id,name,mimeType,md5Checksum,parents,size";

/// Largest page the service hands out
const PAGE_SIZE: &str = "1000";

/// `/drive/v3/files`
pub(crate) const FILES_PATH: &str = "/drive/v3/files";

// ============================================================================
// Query construction
// ============================================================================

/// One page of `files.list`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<RemoteMetadata>,
}

/// Escapes a value for use inside a single-quoted query string
pub fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Query for the non-trashed children of `parent`
pub fn children_query(parent: &RemoteId, include_folders: bool) -> String {
    let mut q = format!(
        "'{}' in parents and trashed = false",
        escape_query(parent.as_str())
    );
    if !include_folders {
        q.push_str(&format!(" and mimeType != '{FOLDER_MIME_TYPE}'"));
    }
    q
}

/// Query for non-trashed entries whose name contains `text`
pub fn search_query(parent: Option<&RemoteId>, text: &str) -> String {
    let mut q = format!("name contains '{}' and trashed = false", escape_query(text));
    if let Some(parent) = parent {
        q.push_str(&format!(" and '{}' in parents", escape_query(parent.as_str())));
    }
    q
}

fn file_path(id: &RemoteId) -> String {
    format!("{FILES_PATH}/{}", id.as_str())
}

/// Parses a file resource from a response body
pub(crate) async fn parse_file(response: Response, what: &str) -> Result<RemoteMetadata> {
    response
        .json::<RemoteMetadata>()
        .await
        .with_context(|| format!("Failed to parse {what} response"))
}

// ============================================================================
// Listing
// ============================================================================

/// Runs a `files.list` query and collects every page
#[tracing::instrument(skip(client))]
pub async fn list(client: &DriveClient, query: &str) -> Result<Vec<RemoteMetadata>> {
    let fields = format!("nextPageToken,files({FILE_FIELDS})");
    let mut files = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0u32;

    loop {
        let response = client
            .send(Category::List, || {
                let mut params = vec![
                    ("q", query),
                    ("spaces", "drive"),
                    ("pageSize", PAGE_SIZE),
                    ("fields", fields.as_str()),
                ];
                if let Some(token) = page_token.as_deref() {
                    params.push(("pageToken", token));
                }
                client.request(Method::GET, FILES_PATH).query(&params)
            })
            .await
            .context("Failed to list files")?;

        let page: FileList = response
            .json()
            .await
            .context("Failed to parse file list response")?;
        pages += 1;
        files.extend(page.files);

        match page.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    debug!(pages, count = files.len(), "Listing complete");
    Ok(files)
}

/// Children of `parent`, optionally without folders
pub async fn list_children(
    client: &DriveClient,
    parent: &RemoteId,
    include_folders: bool,
) -> Result<Vec<RemoteMetadata>> {
    list(client, &children_query(parent, include_folders)).await
}

/// Entries whose name contains `text`, optionally below `parent` only
pub async fn search(
    client: &DriveClient,
    parent: Option<&RemoteId>,
    text: &str,
) -> Result<Vec<RemoteMetadata>> {
    list(client, &search_query(parent, text)).await
}

// ============================================================================
// Metadata
// ============================================================================

/// `files.get` for one entry
#[tracing::instrument(skip(client), fields(id = %id))]
pub async fn get(client: &DriveClient, id: &RemoteId) -> Result<RemoteMetadata> {
    let path = file_path(id);
    let response = client
        .send(Category::Metadata, || {
            client
                .request(Method::GET, &path)
                .query(&[("fields", FILE_FIELDS)])
        })
        .await
        .with_context(|| format!("Failed to get metadata of {id}"))?;
    parse_file(response, "get").await
}

/// Body of metadata-only creates and updates
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileMetadata<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<&'a str>,
}

/// Creates an entry without content (folder or empty file)
#[tracing::instrument(skip(client), fields(parent = %parent))]
pub async fn create_metadata(
    client: &DriveClient,
    parent: &RemoteId,
    name: &str,
    mime_type: &str,
) -> Result<RemoteMetadata> {
    let body = FileMetadata {
        name: Some(name),
        mime_type: Some(mime_type),
        parents: vec![parent.as_str()],
    };
    let response = client
        .send(Category::Metadata, || {
            client
                .request(Method::POST, FILES_PATH)
                .query(&[("fields", FILE_FIELDS)])
                .json(&body)
        })
        .await
        .with_context(|| format!("Failed to create '{name}' in {parent}"))?;
    let created = parse_file(response, "create").await?;
    debug!(id = ?created.id, name, mime_type, "Created entry");
    Ok(created)
}

/// Creates a folder
pub async fn create_folder(
    client: &DriveClient,
    parent: &RemoteId,
    name: &str,
) -> Result<RemoteMetadata> {
    create_metadata(client, parent, name, FOLDER_MIME_TYPE).await
}

/// Renames an entry
#[tracing::instrument(skip(client), fields(id = %id))]
pub async fn rename(client: &DriveClient, id: &RemoteId, new_name: &str) -> Result<RemoteMetadata> {
    let path = file_path(id);
    let body = FileMetadata {
        name: Some(new_name),
        ..FileMetadata::default()
    };
    let response = client
        .send(Category::Metadata, || {
            client
                .request(Method::PATCH, &path)
                .query(&[("fields", FILE_FIELDS)])
                .json(&body)
        })
        .await
        .with_context(|| format!("Failed to rename {id}"))?;
    parse_file(response, "rename").await
}

/// Moves an entry from `old_parent` to `new_parent`
#[tracing::instrument(skip(client), fields(id = %id))]
pub async fn move_to(
    client: &DriveClient,
    id: &RemoteId,
    new_parent: &RemoteId,
    old_parent: &RemoteId,
) -> Result<RemoteMetadata> {
    let path = file_path(id);
    let response = client
        .send(Category::Metadata, || {
            client.request(Method::PATCH, &path).query(&[
                ("addParents", new_parent.as_str()),
                ("removeParents", old_parent.as_str()),
                ("fields", FILE_FIELDS),
            ])
        })
        .await
        .with_context(|| format!("Failed to move {id} to {new_parent}"))?;
    parse_file(response, "move").await
}

/// Permanently deletes an entry (and, for folders, everything below it)
#[tracing::instrument(skip(client), fields(id = %id))]
pub async fn delete(client: &DriveClient, id: &RemoteId) -> Result<()> {
    let path = file_path(id);
    client
        .send(Category::Metadata, || client.request(Method::DELETE, &path))
        .await
        .with_context(|| format!("Failed to delete {id}"))?;
    debug!(id = %id, "Deleted");
    Ok(())
}

// ============================================================================
// Content
// ============================================================================

/// Sibling of `dest` that a download is streamed into before the rename
fn partial_path(dest: &Path) -> Result<PathBuf> {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid download target {}", dest.display()))?;
    Ok(dest.with_file_name(format!(".{name}.partial")))
}

/// Streams a response body into `dest` through a temporary sibling file
async fn stream_to_file(response: Response, dest: &Path) -> Result<u64> {
    let partial = partial_path(dest)?;
    let mut file = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    let result: Result<()> = async {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Download interrupted")?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    if let Err(err) = result {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err);
    }
    drop(file);

    tokio::fs::rename(&partial, dest)
        .await
        .with_context(|| format!("Failed to move download into {}", dest.display()))?;
    Ok(written)
}

/// Downloads the binary content of a file into `dest`
#[tracing::instrument(skip(client, dest), fields(id = %id, dest = %dest.display()))]
pub async fn download(client: &DriveClient, id: &RemoteId, dest: &Path) -> Result<u64> {
    let path = file_path(id);
    let response = client
        .send(Category::Download, || {
            client.request(Method::GET, &path).query(&[("alt", "media")])
        })
        .await
        .with_context(|| format!("Failed to download {id}"))?;
    let bytes = stream_to_file(response, dest).await?;
    info!(id = %id, bytes, "Downloaded");
    Ok(bytes)
}

/// Exports a native document in `mime_type` into `dest`
#[tracing::instrument(skip(client, dest), fields(id = %id, dest = %dest.display()))]
pub async fn export(
    client: &DriveClient,
    id: &RemoteId,
    mime_type: &str,
    dest: &Path,
) -> Result<u64> {
    let path = format!("{}/export", file_path(id));
    let response = client
        .send(Category::Download, || {
            client
                .request(Method::GET, &path)
                .query(&[("mimeType", mime_type)])
        })
        .await
        .with_context(|| format!("Failed to export {id} as {mime_type}"))?;
    let bytes = stream_to_file(response, dest).await?;
    info!(id = %id, mime_type, bytes, "Exported");
    Ok(bytes)
}

/// Reads the binary content of a file into memory
pub async fn read_content(client: &DriveClient, id: &RemoteId) -> Result<Vec<u8>> {
    let path = file_path(id);
    let response = client
        .send(Category::Download, || {
            client.request(Method::GET, &path).query(&[("alt", "media")])
        })
        .await
        .with_context(|| format!("Failed to read {id}"))?;
    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read body of {id}"))?;
    Ok(bytes.to_vec())
}

// ============================================================================
// Permissions
// ============================================================================

/// Permission id the service uses for "anyone with the link"
const ANYONE_WITH_LINK: &str = "anyoneWithLink";

#[derive(Debug, Serialize)]
struct Permission<'a> {
    role: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

/// Grants read access to anyone with the link
#[tracing::instrument(skip(client), fields(id = %id))]
pub async fn share_publicly(client: &DriveClient, id: &RemoteId) -> Result<()> {
    let path = format!("{}/permissions", file_path(id));
    let body = Permission {
        role: "reader",
        kind: "anyone",
    };
    client
        .send(Category::Metadata, || {
            client.request(Method::POST, &path).json(&body)
        })
        .await
        .with_context(|| format!("Failed to share {id}"))?;
    info!(id = %id, "Shared with anyone holding the link");
    Ok(())
}

/// Removes link sharing
#[tracing::instrument(skip(client), fields(id = %id))]
pub async fn unshare(client: &DriveClient, id: &RemoteId) -> Result<()> {
    let path = format!("{}/permissions/{ANYONE_WITH_LINK}", file_path(id));
    client
        .send(Category::Metadata, || client.request(Method::DELETE, &path))
        .await
        .with_context(|| format!("Failed to unshare {id}"))?;
    info!(id = %id, "Link sharing removed");
    Ok(())
}
