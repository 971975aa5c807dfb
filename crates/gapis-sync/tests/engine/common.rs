//! Shared helpers for sync engine integration tests
//!
//! [`MemoryStore`] is an in-memory [`IRemoteStore`] that behaves like the
//! remote service as far as the engine can observe: duplicate sibling names
//! are allowed, digests are computed on upload, metadata-only files carry
//! no digest, and documents can only be exported.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail};
use md5::{Digest, Md5};
use tempfile::TempDir;

use gapis_core::config::Config;
use gapis_core::domain::newtypes::{FileHash, RemoteId, SyncPath};
use gapis_core::domain::node::{Node, NodeKind, FOLDER_MIME_TYPE};
use gapis_core::ports::remote_store::IRemoteStore;
use gapis_sync::engine::SyncEngine;
use gapis_sync::filesystem::LocalFileSystemAdapter;

/// Bytes the fake store writes for any export.
pub const EXPORT_BODY: &[u8] = b"%PDF-1.4 exported";

#[derive(Debug, Clone)]
enum Body {
    Folder,
    /// `None` digest for entries created without content
    File { data: Vec<u8>, md5: Option<FileHash> },
    Document { mime: String },
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    parent: Option<RemoteId>,
    body: Body,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<RemoteId, Entry>>,
    next_id: AtomicUsize,
    mutations: AtomicUsize,
    transfers: AtomicUsize,
}

fn digest(data: &[u8]) -> FileHash {
    FileHash::from_digest(&Md5::digest(data)).unwrap()
}

impl MemoryStore {
    /// A store holding a single empty root folder.
    pub fn new() -> Arc<Self> {
        let store = Self::default();
        store.entries.lock().unwrap().insert(
            RemoteId::root(),
            Entry {
                name: "My Drive".to_string(),
                parent: None,
                body: Body::Folder,
            },
        );
        Arc::new(store)
    }

    fn fresh_id(&self) -> RemoteId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        RemoteId::new(format!("id{n:04}")).unwrap()
    }

    fn insert(&self, parent: &RemoteId, name: &str, body: Body) -> RemoteId {
        let id = self.fresh_id();
        self.entries.lock().unwrap().insert(
            id.clone(),
            Entry {
                name: name.to_string(),
                parent: Some(parent.clone()),
                body,
            },
        );
        id
    }

    fn node_of(id: &RemoteId, entry: &Entry) -> Node {
        let (mime, kind) = match &entry.body {
            Body::Folder => (FOLDER_MIME_TYPE.to_string(), NodeKind::Folder),
            Body::File { data, md5 } => (
                "application/octet-stream".to_string(),
                NodeKind::File {
                    md5: md5.clone(),
                    size: data.len() as u64,
                },
            ),
            Body::Document { mime } => (mime.clone(), NodeKind::Document),
        };
        Node::new(
            id.clone(),
            entry.name.clone(),
            mime,
            kind,
            entry.parent.iter().cloned().collect(),
        )
        .unwrap()
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    // --- seeding (not counted as mutations) ---

    pub fn add_folder(&self, parent: &RemoteId, name: &str) -> RemoteId {
        self.insert(parent, name, Body::Folder)
    }

    pub fn add_file(&self, parent: &RemoteId, name: &str, data: &[u8]) -> RemoteId {
        self.insert(
            parent,
            name,
            Body::File {
                data: data.to_vec(),
                md5: Some(digest(data)),
            },
        )
    }

    /// A file whose digest the store has not computed yet
    pub fn add_file_without_digest(&self, parent: &RemoteId, name: &str, data: &[u8]) -> RemoteId {
        self.insert(
            parent,
            name,
            Body::File {
                data: data.to_vec(),
                md5: None,
            },
        )
    }

    pub fn add_document(&self, parent: &RemoteId, name: &str, mime: &str) -> RemoteId {
        self.insert(
            parent,
            name,
            Body::Document {
                mime: mime.to_string(),
            },
        )
    }

    // --- inspection ---

    pub fn root(&self) -> Node {
        self.node(&RemoteId::root())
    }

    pub fn node(&self, id: &RemoteId) -> Node {
        let entries = self.entries.lock().unwrap();
        Self::node_of(id, &entries[id])
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Content transfers (uploads with a payload and downloads)
    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    pub fn exists(&self, id: &RemoteId) -> bool {
        self.entries.lock().unwrap().contains_key(id)
    }

    pub fn content(&self, id: &RemoteId) -> Option<Vec<u8>> {
        match &self.entries.lock().unwrap().get(id)?.body {
            Body::File { data, .. } => Some(data.clone()),
            _ => None,
        }
    }

    /// Every entry below `folder` as `path -> description`, where the
    /// description is `"dir"`, `"doc"` or the file content as UTF-8.
    pub fn tree(&self, folder: &RemoteId) -> BTreeMap<String, String> {
        let entries = self.entries.lock().unwrap();
        let mut out = BTreeMap::new();
        let mut stack = vec![(folder.clone(), String::new())];
        while let Some((parent, prefix)) = stack.pop() {
            for (id, entry) in entries.iter() {
                if entry.parent.as_ref() != Some(&parent) {
                    continue;
                }
                let path = format!("{prefix}{}", entry.name);
                let desc = match &entry.body {
                    Body::Folder => {
                        stack.push((id.clone(), format!("{path}/")));
                        "dir".to_string()
                    }
                    Body::File { data, .. } => String::from_utf8_lossy(data).into_owned(),
                    Body::Document { .. } => "doc".to_string(),
                };
                // Duplicate names collapse; callers check counts separately.
                out.insert(path, desc);
            }
        }
        out
    }

    pub fn children_named(&self, folder: &RemoteId, name: &str) -> Vec<Node> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|(_, e)| e.parent.as_ref() == Some(folder) && e.name == name)
            .map(|(id, e)| Self::node_of(id, e))
            .collect()
    }

    fn lookup(&self, id: &RemoteId) -> anyhow::Result<Entry> {
        self.entries
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("not found: {id}"))
    }
}

#[async_trait::async_trait]
impl IRemoteStore for MemoryStore {
    async fn list_children(
        &self,
        parent: &RemoteId,
        include_folders: bool,
    ) -> anyhow::Result<Vec<Node>> {
        if !matches!(self.lookup(parent)?.body, Body::Folder) {
            bail!("not a folder: {parent}");
        }
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|(_, e)| e.parent.as_ref() == Some(parent))
            .filter(|(_, e)| include_folders || !matches!(e.body, Body::Folder))
            .map(|(id, e)| Self::node_of(id, e))
            .collect())
    }

    async fn get(&self, id: &RemoteId) -> anyhow::Result<Node> {
        let entry = self.lookup(id)?;
        Ok(Self::node_of(id, &entry))
    }

    async fn search(
        &self,
        parent: Option<&RemoteId>,
        name_contains: &str,
    ) -> anyhow::Result<Vec<Node>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|(_, e)| e.name.contains(name_contains))
            .filter(|(_, e)| parent.map_or(true, |p| e.parent.as_ref() == Some(p)))
            .map(|(id, e)| Self::node_of(id, e))
            .collect())
    }

    async fn create_file(
        &self,
        parent: &RemoteId,
        name: &str,
        _mime_type: Option<&str>,
        content: Option<&[u8]>,
    ) -> anyhow::Result<Node> {
        self.lookup(parent)?;
        let body = match content {
            Some(data) if !data.is_empty() => {
                self.transfers.fetch_add(1, Ordering::SeqCst);
                Body::File {
                    data: data.to_vec(),
                    md5: Some(digest(data)),
                }
            }
            Some(_) => bail!("zero-length upload body"),
            // The store computes the digest of the empty blob right away.
            None => Body::File {
                data: Vec::new(),
                md5: Some(digest(&[])),
            },
        };
        self.mutated();
        let id = self.insert(parent, name, body);
        Ok(self.node(&id))
    }

    async fn create_folder(&self, parent: &RemoteId, name: &str) -> anyhow::Result<Node> {
        self.lookup(parent)?;
        self.mutated();
        let id = self.insert(parent, name, Body::Folder);
        Ok(self.node(&id))
    }

    async fn update_content(&self, id: &RemoteId, content: &[u8]) -> anyhow::Result<Node> {
        {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.get_mut(id).ok_or_else(|| anyhow!("not found: {id}"))?;
            match entry.body {
                Body::File { .. } => {
                    entry.body = Body::File {
                        data: content.to_vec(),
                        md5: Some(digest(content)),
                    }
                }
                _ => bail!("cannot update content of {id}"),
            }
        }
        self.mutated();
        if !content.is_empty() {
            self.transfers.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.node(id))
    }

    async fn rename(&self, id: &RemoteId, new_name: &str) -> anyhow::Result<Node> {
        {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.get_mut(id).ok_or_else(|| anyhow!("not found: {id}"))?;
            entry.name = new_name.to_string();
        }
        self.mutated();
        Ok(self.node(id))
    }

    async fn move_to(
        &self,
        id: &RemoteId,
        new_parent: &RemoteId,
        old_parent: &RemoteId,
    ) -> anyhow::Result<Node> {
        self.lookup(new_parent)?;
        {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.get_mut(id).ok_or_else(|| anyhow!("not found: {id}"))?;
            if entry.parent.as_ref() != Some(old_parent) {
                bail!("{id} is not in {old_parent}");
            }
            entry.parent = Some(new_parent.clone());
        }
        self.mutated();
        Ok(self.node(id))
    }

    async fn delete(&self, id: &RemoteId) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(id).is_none() {
            bail!("not found: {id}");
        }
        // Drop descendants too.
        let mut doomed = vec![id.clone()];
        while let Some(parent) = doomed.pop() {
            let children: Vec<RemoteId> = entries
                .iter()
                .filter(|(_, e)| e.parent.as_ref() == Some(&parent))
                .map(|(cid, _)| cid.clone())
                .collect();
            for child in children {
                entries.remove(&child);
                doomed.push(child);
            }
        }
        drop(entries);
        self.mutated();
        Ok(())
    }

    async fn download(&self, id: &RemoteId, dest: &Path) -> anyhow::Result<u64> {
        let data = match self.lookup(id)?.body {
            Body::File { data, .. } => data,
            _ => bail!("{id} has no binary content"),
        };
        if data.is_empty() {
            bail!("zero-length download of {id}");
        }
        self.transfers.fetch_add(1, Ordering::SeqCst);
        std::fs::write(dest, &data)?;
        Ok(data.len() as u64)
    }

    async fn export(&self, id: &RemoteId, mime_type: &str, dest: &Path) -> anyhow::Result<u64> {
        if !matches!(self.lookup(id)?.body, Body::Document { .. }) {
            bail!("{id} is not a document");
        }
        assert_eq!(mime_type, "application/pdf");
        std::fs::write(dest, EXPORT_BODY)?;
        Ok(EXPORT_BODY.len() as u64)
    }

    async fn read_content(&self, id: &RemoteId) -> anyhow::Result<Vec<u8>> {
        self.content(id).ok_or_else(|| anyhow!("{id} has no binary content"))
    }

    async fn set_sharing(&self, id: &RemoteId, _public: bool) -> anyhow::Result<()> {
        self.lookup(id)?;
        Ok(())
    }
}

/// Engine wired to `store` and the real filesystem.
pub fn engine(store: &Arc<MemoryStore>) -> SyncEngine {
    SyncEngine::new(
        store.clone(),
        Arc::new(LocalFileSystemAdapter::new()),
        &Config::default(),
    )
}

pub fn sync_path(path: &Path) -> SyncPath {
    SyncPath::new(path.to_path_buf()).unwrap()
}

/// Every entry below `root` as `relative path -> description`, matching
/// the format of [`MemoryStore::tree`].
pub fn local_tree(root: &Path) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let mut stack = vec![(root.to_path_buf(), String::new())];
    while let Some((dir, prefix)) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let name = entry.file_name().into_string().unwrap();
            let path = format!("{prefix}{name}");
            if entry.file_type().unwrap().is_dir() {
                stack.push((entry.path(), format!("{path}/")));
                out.insert(path, "dir".to_string());
            } else {
                let data = std::fs::read(entry.path()).unwrap();
                out.insert(path, String::from_utf8_lossy(&data).into_owned());
            }
        }
    }
    out
}

/// Build a local tree from `(relative path, content)` pairs; a `None`
/// content makes a directory.
pub fn make_local(entries: &[(&str, Option<&str>)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (rel, content) in entries {
        let path = dir.path().join(rel);
        match content {
            Some(text) => {
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, text).unwrap();
            }
            None => std::fs::create_dir_all(path).unwrap(),
        }
    }
    dir
}

pub fn tree_of(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
