//! DriveRemoteStore - IRemoteStore implementation for the Drive API
//!
//! Delegates to the [`files`] and [`upload`] modules and validates every
//! returned resource into a [`Node`]. Throttling and retries live in the
//! [`DriveClient`]; nothing here retries.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use gapis_core::config::Config;
use gapis_core::domain::newtypes::RemoteId;
use gapis_core::domain::node::{Node, RemoteMetadata};
use gapis_core::ports::remote_store::IRemoteStore;
use tracing::debug;

use crate::client::DriveClient;
use crate::files;
use crate::rate_limit::{AdaptiveRateLimiter, RateLimitConfig};
use crate::upload::{self, UploadSettings};

fn to_node(meta: RemoteMetadata) -> Result<Node> {
    let id = meta.id.clone().unwrap_or_default();
    Node::from_remote(meta).with_context(|| format!("Invalid file resource '{id}'"))
}

fn to_nodes(metas: Vec<RemoteMetadata>) -> Result<Vec<Node>> {
    metas.into_iter().map(to_node).collect()
}

/// Remote store backed by a Drive account
pub struct DriveRemoteStore {
    client: DriveClient,
    uploads: UploadSettings,
}

impl DriveRemoteStore {
    pub fn new(client: DriveClient, uploads: UploadSettings) -> Self {
        Self { client, uploads }
    }

    /// Store for `access_token` with throttling and upload sizes taken
    /// from `config`
    pub fn from_config(access_token: impl Into<String>, config: &Config) -> Self {
        let limiter = AdaptiveRateLimiter::new(RateLimitConfig::from(&config.rate_limiting));
        let client = DriveClient::new(access_token).with_rate_limiter(Arc::new(limiter));
        Self::new(client, UploadSettings::from(&config.large_files))
    }

    pub fn client(&self) -> &DriveClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl IRemoteStore for DriveRemoteStore {
    async fn list_children(&self, parent: &RemoteId, include_folders: bool) -> Result<Vec<Node>> {
        let children = files::list_children(&self.client, parent, include_folders).await?;
        debug!(parent = %parent, count = children.len(), "Listed children");
        to_nodes(children)
    }

    async fn get(&self, id: &RemoteId) -> Result<Node> {
        to_node(files::get(&self.client, id).await?)
    }

    async fn search(&self, parent: Option<&RemoteId>, name_contains: &str) -> Result<Vec<Node>> {
        to_nodes(files::search(&self.client, parent, name_contains).await?)
    }

    async fn create_file(
        &self,
        parent: &RemoteId,
        name: &str,
        mime_type: Option<&str>,
        content: Option<&[u8]>,
    ) -> Result<Node> {
        let mime_type = mime_type.unwrap_or_else(|| upload::guess_mime_type(name));
        let created = match content {
            Some(data) if !data.is_empty() => {
                upload::create_file(&self.client, &self.uploads, parent, name, mime_type, data)
                    .await?
            }
            // Zero-byte content cannot go through an upload; create from metadata.
            _ => files::create_metadata(&self.client, parent, name, mime_type).await?,
        };
        to_node(created)
    }

    async fn create_folder(&self, parent: &RemoteId, name: &str) -> Result<Node> {
        to_node(files::create_folder(&self.client, parent, name).await?)
    }

    async fn update_content(&self, id: &RemoteId, content: &[u8]) -> Result<Node> {
        to_node(upload::update_content(&self.client, &self.uploads, id, content).await?)
    }

    async fn rename(&self, id: &RemoteId, new_name: &str) -> Result<Node> {
        to_node(files::rename(&self.client, id, new_name).await?)
    }

    async fn move_to(
        &self,
        id: &RemoteId,
        new_parent: &RemoteId,
        old_parent: &RemoteId,
    ) -> Result<Node> {
        to_node(files::move_to(&self.client, id, new_parent, old_parent).await?)
    }

    async fn delete(&self, id: &RemoteId) -> Result<()> {
        files::delete(&self.client, id).await
    }

    async fn download(&self, id: &RemoteId, dest: &Path) -> Result<u64> {
        files::download(&self.client, id, dest).await
    }

    async fn export(&self, id: &RemoteId, mime_type: &str, dest: &Path) -> Result<u64> {
        files::export(&self.client, id, mime_type, dest).await
    }

    async fn read_content(&self, id: &RemoteId) -> Result<Vec<u8>> {
        files::read_content(&self.client, id).await
    }

    async fn set_sharing(&self, id: &RemoteId, public: bool) -> Result<()> {
        if public {
            files::share_publicly(&self.client, id).await
        } else {
            files::unshare(&self.client, id).await
        }
    }
}
