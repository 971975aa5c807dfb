//! Remote store entries
//!
//! A [`Node`] is an immutable snapshot of one remote entry (folder, regular
//! file or remote-native document). Nodes are built from raw
//! [`RemoteMetadata`] and validated at construction; operations that
//! mutate remote state hand back a fresh snapshot instead of patching an
//! existing one. A node never owns or caches its children.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::DomainError;
use super::newtypes::{FileHash, RemoteId};

/// MIME type of a remote folder
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Prefix shared by every remote-native type (folders included)
pub const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// Native types that have no export representation
const NON_EXPORTABLE_MIME_TYPES: &[&str] = &[
    "application/vnd.google-apps.script",
    "application/vnd.google-apps.shortcut",
    "application/vnd.google-apps.form",
    "application/vnd.google-apps.site",
    "application/vnd.google-apps.fusiontable",
];

const OPEN_LINK_BASE: &str = "https://drive.google.com/open?id=";

/// Raw metadata of a remote entry, as returned by the store
///
/// Field names follow the wire format. Nothing here is validated; use
/// [`Node::from_remote`] to obtain a checked snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub md5_checksum: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    /// Byte length; the store encodes it as a decimal string
    #[serde(default)]
    pub size: Option<String>,
}

/// What kind of entry a node is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// A directory; never carries a fingerprint
    Folder,
    /// Regular binary content
    File {
        /// `None` while the store has not computed a digest yet
        md5: Option<FileHash>,
        size: u64,
    },
    /// Remote-native document; only reachable through an export
    Document,
}

/// Immutable snapshot of one remote entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    id: RemoteId,
    name: String,
    mime_type: String,
    #[serde(flatten)]
    kind: NodeKind,
    parent_ids: Vec<RemoteId>,
}

impl Node {
    /// Validate raw metadata into a node
    ///
    /// # Errors
    /// Fails on a missing `id`, `name` or `mimeType`, an invalid id, or an
    /// unparsable size. A malformed checksum is treated as not computed.
    pub fn from_remote(meta: RemoteMetadata) -> Result<Self, DomainError> {
        let id = meta.id.ok_or(DomainError::MissingField { field: "id" })?;
        let id = RemoteId::new(id)?;

        let name = meta
            .name
            .filter(|n| !n.is_empty())
            .ok_or(DomainError::MissingField { field: "name" })?;

        let mime_type = meta
            .mime_type
            .filter(|m| !m.is_empty())
            .ok_or(DomainError::MissingField { field: "mimeType" })?;

        let parent_ids = meta
            .parents
            .into_iter()
            .map(RemoteId::new)
            .collect::<Result<Vec<_>, _>>()?;

        let kind = if mime_type == FOLDER_MIME_TYPE {
            NodeKind::Folder
        } else if mime_type.starts_with(NATIVE_MIME_PREFIX) {
            NodeKind::Document
        } else {
            let size = match meta.size.as_deref() {
                None | Some("") => 0,
                Some(raw) => raw.parse::<u64>().map_err(|_| {
                    DomainError::ValidationFailed(format!("Invalid size for {id}: {raw}"))
                })?,
            };
            let md5 = meta
                .md5_checksum
                .filter(|c| !c.is_empty())
                .and_then(|c| parse_checksum(&id, c));
            NodeKind::File { md5, size }
        };

        Ok(Self {
            id,
            name,
            mime_type,
            kind,
            parent_ids,
        })
    }

    /// Build a node directly from validated parts
    ///
    /// # Errors
    /// Fails if the name is empty or contains `/`
    pub fn new(
        id: RemoteId,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        kind: NodeKind,
        parent_ids: Vec<RemoteId>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(DomainError::InvalidName(name));
        }
        Ok(Self {
            id,
            name,
            mime_type: mime_type.into(),
            kind,
            parent_ids,
        })
    }

    pub fn id(&self) -> &RemoteId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent_ids(&self) -> &[RemoteId] {
        &self.parent_ids
    }

    /// First parent, used wherever a single parent is required
    pub fn parent_id(&self) -> Option<&RemoteId> {
        self.parent_ids.first()
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Folder)
    }

    pub fn is_opaque_document(&self) -> bool {
        matches!(self.kind, NodeKind::Document)
    }

    /// Whether an opaque document can be materialized through an export
    pub fn is_exportable(&self) -> bool {
        self.is_opaque_document() && !NON_EXPORTABLE_MIME_TYPES.contains(&self.mime_type.as_str())
    }

    /// Content digest of a regular file, if the store has computed one
    pub fn content_fingerprint(&self) -> Option<&FileHash> {
        match &self.kind {
            NodeKind::File { md5, .. } => md5.as_ref(),
            _ => None,
        }
    }

    /// Byte length; 0 for folders, documents and unset sizes
    pub fn size(&self) -> u64 {
        match self.kind {
            NodeKind::File { size, .. } => size,
            _ => 0,
        }
    }

    /// Browser link to the entry
    pub fn web_link(&self) -> String {
        format!("{OPEN_LINK_BASE}{}", self.id)
    }
}

/// Checksum as reported by the store; an ill-formed one counts as not computed
fn parse_checksum(id: &RemoteId, raw: String) -> Option<FileHash> {
    match FileHash::new(raw) {
        Ok(hash) => Some(hash),
        Err(e) => {
            debug!(id = %id, error = %e, "Ignoring ill-formed md5Checksum");
            None
        }
    }
}
