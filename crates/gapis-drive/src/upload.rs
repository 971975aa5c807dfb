//! Upload operations for the Drive API
//!
//! Provides functions for sending file content:
//! - [`upload_multipart`] - Metadata and content in one `multipart/related` request
//! - [`update_media`] - Replace the content of an existing file in one request
//! - [`start_session`] / [`upload_chunk`] - Resumable upload sessions
//! - [`create_file`] / [`update_content`] - Pick one of the above by size
//!
//! ## Drive API References
//!
//! - [Upload file data](https://developers.google.com/drive/api/guides/manage-uploads)

use anyhow::{bail, Context, Result};
use gapis_core::config::LargeFilesConfig;
use gapis_core::domain::newtypes::RemoteId;
use gapis_core::domain::node::RemoteMetadata;
use reqwest::{header, Method, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::client::DriveClient;
use crate::files::{parse_file, FileMetadata, FILE_FIELDS};
use crate::rate_limit::Category;

/// `/upload/drive/v3/files`
const UPLOAD_PATH: &str = "/upload/drive/v3/files";

/// Resumable chunks must be a multiple of this many bytes
pub const CHUNK_GRANULARITY: usize = 256 * 1024;

/// Boundary of multipart bodies; checked against the payload before use
const BOUNDARY: &str = "gapis_multipart_boundary_7f3c9a";

/// Fallback content type
const OCTET_STREAM: &str = "application/octet-stream";

// ============================================================================
// Settings
// ============================================================================

/// When to switch to resumable uploads and how big each chunk is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSettings {
    /// Payloads larger than this use a resumable session
    pub resumable_threshold: usize,
    /// Bytes per session chunk, a multiple of [`CHUNK_GRANULARITY`]
    pub chunk_size: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self::from(&LargeFilesConfig::default())
    }
}

impl From<&LargeFilesConfig> for UploadSettings {
    fn from(config: &LargeFilesConfig) -> Self {
        let chunk = (config.chunk_size_kb as usize).saturating_mul(1024);
        // Round down to the granularity, never below one unit.
        let chunk_size = (chunk / CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY;
        Self {
            resumable_threshold: (config.threshold_mb as usize).saturating_mul(1024 * 1024),
            chunk_size,
        }
    }
}

// ============================================================================
// Content type
// ============================================================================

/// Content type for a file name, by extension
pub fn guess_mime_type(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return OCTET_STREAM,
    };
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => OCTET_STREAM,
    }
}

// ============================================================================
// Single-request uploads
// ============================================================================

/// Builds a `multipart/related` body: JSON metadata part, then the content
pub fn multipart_body(metadata: &serde_json::Value, mime_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
             --{BOUNDARY}\r\nContent-Type: {mime_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn boundary_collides(data: &[u8]) -> bool {
    data.windows(BOUNDARY.len())
        .any(|w| w == BOUNDARY.as_bytes())
}

/// Creates a file with content in one `multipart/related` request
#[tracing::instrument(skip(client, data), fields(parent = %parent, bytes = data.len()))]
pub async fn upload_multipart(
    client: &DriveClient,
    parent: &RemoteId,
    name: &str,
    mime_type: &str,
    data: &[u8],
) -> Result<RemoteMetadata> {
    if boundary_collides(data) {
        return upload_resumable(client, None, Some(parent), name, mime_type, data, data.len().max(1))
            .await;
    }
    let metadata = serde_json::to_value(FileMetadata {
        name: Some(name),
        mime_type: None,
        parents: vec![parent.as_str()],
    })?;
    let body = multipart_body(&metadata, mime_type, data);

    let response = client
        .send(Category::Upload, || {
            client
                .request(Method::POST, UPLOAD_PATH)
                .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/related; boundary={BOUNDARY}"),
                )
                .body(body.clone())
        })
        .await
        .with_context(|| format!("Failed to upload '{name}'"))?;
    let created = parse_file(response, "upload").await?;
    debug!(id = ?created.id, name, "Multipart upload complete");
    Ok(created)
}

/// Replaces the content of `id` in one `uploadType=media` request
///
/// An empty `data` truncates the file.
#[tracing::instrument(skip(client, data), fields(id = %id, bytes = data.len()))]
pub async fn update_media(client: &DriveClient, id: &RemoteId, data: &[u8]) -> Result<RemoteMetadata> {
    let path = format!("{UPLOAD_PATH}/{}", id.as_str());
    let response = client
        .send(Category::Upload, || {
            client
                .request(Method::PATCH, &path)
                .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
                .header(header::CONTENT_TYPE, OCTET_STREAM)
                .body(data.to_vec())
        })
        .await
        .with_context(|| format!("Failed to update content of {id}"))?;
    parse_file(response, "update").await
}

// ============================================================================
// Resumable sessions
// ============================================================================

/// Opens a resumable session and returns its absolute URL
///
/// With `id` the session replaces that file's content; otherwise it
/// creates `name` under `parent`.
pub async fn start_session(
    client: &DriveClient,
    id: Option<&RemoteId>,
    parent: Option<&RemoteId>,
    name: &str,
    mime_type: &str,
    total: usize,
) -> Result<Url> {
    let (method, path, metadata) = match id {
        Some(id) => (
            Method::PATCH,
            format!("{UPLOAD_PATH}/{}", id.as_str()),
            FileMetadata::default(),
        ),
        None => (
            Method::POST,
            UPLOAD_PATH.to_string(),
            FileMetadata {
                name: Some(name),
                mime_type: None,
                parents: parent.map(|p| vec![p.as_str()]).unwrap_or_default(),
            },
        ),
    };

    let response = client
        .send(Category::Upload, || {
            client
                .request(method.clone(), &path)
                .query(&[("uploadType", "resumable")])
                .header("X-Upload-Content-Type", mime_type)
                .header("X-Upload-Content-Length", total.to_string())
                .json(&metadata)
        })
        .await
        .with_context(|| format!("Failed to open upload session for '{name}'"))?;

    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .context("Upload session response has no Location header")?;
    // Relative locations are resolved against the API base.
    let base = Url::parse(client.base_url()).context("Invalid base URL")?;
    let url = base
        .join(location)
        .with_context(|| format!("Invalid upload session URL: {location}"))?;
    debug!(%url, "Upload session opened");
    Ok(url)
}

/// Sends one chunk of a session
///
/// # Returns
/// - `Some(metadata)` once the final chunk is accepted (200/201)
/// - `None` for intermediate chunks (308 Resume Incomplete)
pub async fn upload_chunk(
    client: &DriveClient,
    session: &Url,
    data: &[u8],
    offset: usize,
    total: usize,
) -> Result<Option<RemoteMetadata>> {
    let content_range = if total == 0 {
        "bytes */0".to_string()
    } else {
        format!("bytes {}-{}/{}", offset, offset + data.len() - 1, total)
    };
    debug!(range = %content_range, "Uploading chunk");

    let response = client
        .send(Category::Upload, || {
            client
                .request_url(Method::PUT, session.as_str())
                .header(header::CONTENT_RANGE, &content_range)
                .body(data.to_vec())
        })
        .await
        .with_context(|| format!("Failed to upload chunk {content_range}"))?;

    match response.status() {
        StatusCode::PERMANENT_REDIRECT => Ok(None),
        StatusCode::OK | StatusCode::CREATED => Ok(Some(parse_file(response, "upload").await?)),
        other => bail!("Unexpected status {other} for chunk {content_range}"),
    }
}

/// Uploads `data` through a resumable session in `chunk_size` pieces
pub async fn upload_resumable(
    client: &DriveClient,
    id: Option<&RemoteId>,
    parent: Option<&RemoteId>,
    name: &str,
    mime_type: &str,
    data: &[u8],
    chunk_size: usize,
) -> Result<RemoteMetadata> {
    let total = data.len();
    let chunk_size = chunk_size.max(1);
    info!(
        name,
        bytes = total,
        chunks = total.div_ceil(chunk_size),
        "Starting resumable upload"
    );

    let session = start_session(client, id, parent, name, mime_type, total).await?;

    let mut offset = 0;
    loop {
        let end = (offset + chunk_size).min(total);
        let finished = upload_chunk(client, &session, &data[offset..end], offset, total)
            .await
            .with_context(|| format!("Failed at offset {offset}/{total} of '{name}'"))?;
        offset = end;

        match finished {
            Some(metadata) => {
                info!(id = ?metadata.id, name, bytes = total, "Resumable upload complete");
                return Ok(metadata);
            }
            None if offset >= total => {
                bail!("Upload session for '{name}' ended without a file resource")
            }
            None => {}
        }
    }
}

// ============================================================================
// Size-based dispatch
// ============================================================================

/// Creates `name` under `parent` with `data`, using a session above the
/// resumable threshold
pub async fn create_file(
    client: &DriveClient,
    settings: &UploadSettings,
    parent: &RemoteId,
    name: &str,
    mime_type: &str,
    data: &[u8],
) -> Result<RemoteMetadata> {
    if data.len() > settings.resumable_threshold {
        upload_resumable(
            client,
            None,
            Some(parent),
            name,
            mime_type,
            data,
            settings.chunk_size,
        )
        .await
    } else {
        upload_multipart(client, parent, name, mime_type, data).await
    }
}

/// Replaces the content of `id`, using a session above the threshold
pub async fn update_content(
    client: &DriveClient,
    settings: &UploadSettings,
    id: &RemoteId,
    data: &[u8],
) -> Result<RemoteMetadata> {
    if data.len() > settings.resumable_threshold {
        upload_resumable(
            client,
            Some(id),
            None,
            id.as_str(),
            OCTET_STREAM,
            data,
            settings.chunk_size,
        )
        .await
    } else {
        update_media(client, id, data).await
    }
}
