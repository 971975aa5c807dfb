//! Directory synchronization engine
//!
//! The [`SyncEngine`] mirrors a local directory tree onto a remote folder
//! ([`SyncEngine::push`]) or a remote folder onto a local tree
//! ([`SyncEngine::pull`]).
//!
//! ## Matching
//!
//! Local and remote entries are joined on `(name, is_directory)`. The
//! remote store does not keep sibling names unique, so a local entry may
//! match several remote entries; such ambiguous matches are skipped rather
//! than guessed, except for directories when `remove_nonexisting` asks for
//! a forced replacement.
//!
//! ## Traversal
//!
//! Depth-first over an explicit work stack, one remote call at a time. A
//! failure aborts the run without undoing what was already applied; running
//! the same operation again recomputes the remaining diff.
//!
//! No retries happen here: throttling and transient failures are handled
//! (or reported) by the remote store adapter. The engine also assumes it is
//! the only writer while it runs; concurrent edits to the same folders are
//! not detected.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use gapis_core::config::Config;
use gapis_core::domain::errors::DomainError;
use gapis_core::domain::newtypes::{FileHash, RemoteId, SyncPath};
use gapis_core::domain::node::Node;
use gapis_core::ports::local_filesystem::{ILocalFileSystem, LocalEntry};
use gapis_core::ports::remote_store::IRemoteStore;

use crate::SyncError;

// ============================================================================
// Options and report
// ============================================================================

/// Flags shared by push, pull and upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Delete destination entries that have no counterpart on the source side
    pub remove_nonexisting: bool,
    /// Allow-list of entry names for the top-level folder only
    pub subfolders: Option<Vec<String>>,
    /// Include names starting with `.`
    pub hidden: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            remove_nonexisting: true,
            subfolders: None,
            hidden: true,
        }
    }
}

impl SyncOptions {
    /// Defaults taken from the `sync` section of the configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            remove_nonexisting: config.sync.remove_nonexisting,
            subfolders: None,
            hidden: config.sync.hidden,
        }
    }

    /// Whether an entry name takes part in the sync at this level
    fn admits(&self, name: &str, top: bool) -> bool {
        if !self.hidden && name.starts_with('.') {
            return false;
        }
        match (&self.subfolders, top) {
            (Some(allowed), true) => allowed.iter().any(|a| a == name),
            _ => true,
        }
    }

    /// Pull filters the remote listing at the top level only; nested
    /// folders are mirrored whole
    fn pulls(&self, name: &str, top: bool) -> bool {
        !top || self.admits(name, true)
    }

    /// Remote removal is suppressed at the level an allow-list applies to
    fn removes_at(&self, top: bool) -> bool {
        self.remove_nonexisting && !(top && self.subfolders.is_some())
    }
}

/// Summary of one push, pull or upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub files_uploaded: u32,
    pub files_updated: u32,
    pub files_downloaded: u32,
    pub documents_exported: u32,
    pub remote_folders_created: u32,
    pub local_folders_created: u32,
    pub remote_deleted: u32,
    pub local_deleted: u32,
    /// Local entries left alone because several remote siblings matched
    pub skipped_ambiguous: u32,
    /// Entries skipped because the two sides disagree on what they are
    pub conflicts: Vec<String>,
    pub duration_ms: u64,
}

impl SyncReport {
    /// Create, update and delete calls issued against the remote store
    pub fn remote_mutations(&self) -> u32 {
        self.files_uploaded + self.files_updated + self.remote_folders_created + self.remote_deleted
    }

    /// Writes, directory creations and deletions on the local side
    pub fn local_mutations(&self) -> u32 {
        self.files_downloaded
            + self.documents_exported
            + self.local_folders_created
            + self.local_deleted
    }

    fn conflict(&mut self, path: &dyn std::fmt::Display, reason: &str) {
        warn!(%path, reason, "Skipping conflicting entry");
        self.conflicts.push(format!("{path}: {reason}"));
    }
}

// ============================================================================
// Planning
// ============================================================================

/// What push does with one local entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAction {
    /// Recurse into the single matching remote folder
    Descend,
    /// Delete every match, create a new folder and upload the subtree into it
    Replace,
    /// Create a new remote file
    Upload,
    /// Compare fingerprints with the single match and overwrite on difference
    CompareContent,
    /// Several matches and no permission to force; leave everything as is
    SkipAmbiguous,
}

/// Decide the push action for a local entry given its match count
pub fn plan_push(is_dir: bool, matches: usize, remove_nonexisting: bool) -> PushAction {
    match (is_dir, matches) {
        (true, 1) => PushAction::Descend,
        (true, 0) => PushAction::Replace,
        (true, _) if remove_nonexisting => PushAction::Replace,
        (true, _) => PushAction::SkipAmbiguous,
        (false, 0) => PushAction::Upload,
        (false, 1) => PushAction::CompareContent,
        (false, _) => PushAction::SkipAmbiguous,
    }
}

/// What pull does with one remote child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullAction {
    /// Recurse into the existing local directory
    Descend,
    /// Create the local directory, then recurse
    CreateAndDescend,
    /// Export the document, replacing whatever file is there
    Export,
    /// A native type without an export format
    SkipUnexportable,
    /// No local copy yet
    Download,
    /// Local file exists; download only when the fingerprints differ
    CompareContent,
    /// Directory on one side, file on the other
    TypeConflict,
}

/// Decide the pull action for a remote child given the local entry of the
/// same name (`Some(is_dir)`), if any
pub fn plan_pull(remote: &Node, local_is_dir: Option<bool>) -> PullAction {
    if remote.is_directory() {
        return match local_is_dir {
            Some(true) => PullAction::Descend,
            Some(false) => PullAction::TypeConflict,
            None => PullAction::CreateAndDescend,
        };
    }
    if local_is_dir == Some(true) {
        return PullAction::TypeConflict;
    }
    if remote.is_opaque_document() {
        return if remote.is_exportable() {
            PullAction::Export
        } else {
            PullAction::SkipUnexportable
        };
    }
    match local_is_dir {
        None => PullAction::Download,
        _ => PullAction::CompareContent,
    }
}

/// Whether a remote file and a local digest describe the same content
///
/// A remote file without a computed digest never matches.
pub fn fingerprints_match(remote: &Node, local: &FileHash) -> bool {
    remote
        .content_fingerprint()
        .is_some_and(|remote_hash| remote_hash == local)
}

fn ensure_directory(node: &Node) -> Result<(), SyncError> {
    if node.is_directory() {
        Ok(())
    } else {
        Err(SyncError::NotADirectory(format!(
            "remote '{}' ({})",
            node.name(),
            node.id()
        )))
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// One folder pair waiting on the work stack
#[derive(Debug)]
struct Frame {
    remote: Node,
    local: SyncPath,
    /// The folder the operation was invoked on
    top: bool,
    /// The destination side was just created and is known to be empty
    fresh: bool,
}

/// Push / pull engine over the two ports
///
/// ## Dependencies
///
/// - `remote`: remote store (list, create, update, delete, download, export)
/// - `local`: local filesystem (list, hash, read, write, remove)
/// - `export_mime_type`: format opaque documents are exported to on pull
pub struct SyncEngine {
    remote: Arc<dyn IRemoteStore + Send + Sync>,
    local: Arc<dyn ILocalFileSystem + Send + Sync>,
    export_mime_type: String,
}

impl SyncEngine {
    /// Creates a new `SyncEngine` with the given dependencies
    ///
    /// # Arguments
    /// * `remote` - Remote store operations (IRemoteStore)
    /// * `local` - Local file operations (ILocalFileSystem)
    /// * `config` - Application configuration (export format)
    pub fn new(
        remote: Arc<dyn IRemoteStore + Send + Sync>,
        local: Arc<dyn ILocalFileSystem + Send + Sync>,
        config: &Config,
    ) -> Self {
        Self {
            remote,
            local,
            export_mime_type: config.drive.export_mime_type.clone(),
        }
    }

    // ========================================================================
    // push
    // ========================================================================

    /// Make the remote folder `node` mirror the local directory `local_path`
    ///
    /// # Errors
    /// `SyncError::NotADirectory` if `node` is not a folder or `local_path`
    /// is not a directory, `SyncError::LocalPathMissing` if it does not
    /// exist; both before any mutation. Otherwise the first failing remote
    /// or local call.
    #[tracing::instrument(skip(self, node, options), fields(remote = %node.id(), local = %local_path))]
    pub async fn push(
        &self,
        node: &Node,
        local_path: &SyncPath,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        ensure_directory(node)?;
        self.ensure_local_directory(local_path).await?;

        let start = Instant::now();
        let mut report = SyncReport::default();
        info!("Starting push");

        let mut stack = vec![Frame {
            remote: node.clone(),
            local: local_path.clone(),
            top: true,
            fresh: false,
        }];
        while let Some(frame) = stack.pop() {
            self.push_level(frame, options, &mut stack, &mut report)
                .await?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            uploaded = report.files_uploaded,
            updated = report.files_updated,
            folders_created = report.remote_folders_created,
            deleted = report.remote_deleted,
            skipped = report.skipped_ambiguous,
            conflicts = report.conflicts.len(),
            duration_ms = report.duration_ms,
            "Push complete"
        );
        Ok(report)
    }

    async fn push_level(
        &self,
        frame: Frame,
        options: &SyncOptions,
        stack: &mut Vec<Frame>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let Frame {
            remote: folder,
            local,
            top,
            fresh,
        } = frame;
        debug!(remote = %folder.id(), local = %local, fresh, "Pushing folder");

        let entries: Vec<LocalEntry> = self
            .local
            .list_dir(&local)
            .await
            .with_context(|| format!("Failed to list local directory {local}"))?
            .into_iter()
            .filter(|e| options.admits(&e.name, top))
            .collect();

        let children = if fresh {
            Vec::new()
        } else {
            self.remote
                .list_children(folder.id(), true)
                .await
                .with_context(|| format!("Failed to list remote folder {}", folder.id()))?
        };

        for entry in &entries {
            let local_child = local.join(&entry.name)?;
            let matches: Vec<&Node> = children
                .iter()
                .filter(|c| c.name() == entry.name && c.is_directory() == entry.is_dir)
                .collect();

            match plan_push(entry.is_dir, matches.len(), options.remove_nonexisting) {
                PushAction::Descend => stack.push(Frame {
                    remote: matches[0].clone(),
                    local: local_child,
                    top: false,
                    fresh: false,
                }),
                PushAction::Replace => {
                    for stale in &matches {
                        self.delete_remote(stale, report).await?;
                    }
                    let created = self
                        .remote
                        .create_folder(folder.id(), &entry.name)
                        .await
                        .with_context(|| format!("Failed to create remote folder for {local_child}"))?;
                    report.remote_folders_created += 1;
                    debug!(id = %created.id(), path = %local_child, "Remote folder created");
                    stack.push(Frame {
                        remote: created,
                        local: local_child,
                        top: false,
                        fresh: true,
                    });
                }
                PushAction::Upload => {
                    self.upload_file(folder.id(), &entry.name, &local_child)
                        .await?;
                    report.files_uploaded += 1;
                }
                PushAction::CompareContent => {
                    self.refresh_remote_content(matches[0], &local_child, report)
                        .await?;
                }
                PushAction::SkipAmbiguous => {
                    warn!(
                        path = %local_child,
                        matches = matches.len(),
                        "Several remote entries share this name, skipping"
                    );
                    report.skipped_ambiguous += 1;
                }
            }
        }

        if options.removes_at(top) {
            let present: HashSet<(&str, bool)> = entries
                .iter()
                .map(|e| (e.name.as_str(), e.is_dir))
                .collect();
            for child in &children {
                if !present.contains(&(child.name(), child.is_directory())) {
                    self.delete_remote(child, report).await?;
                }
            }
        }

        Ok(())
    }

    async fn refresh_remote_content(
        &self,
        remote: &Node,
        path: &SyncPath,
        report: &mut SyncReport,
    ) -> Result<()> {
        if remote.is_opaque_document() {
            report.conflict(path, "remote entry is a native document");
            return Ok(());
        }

        let local_hash = self
            .local
            .compute_hash(path)
            .await
            .with_context(|| format!("Failed to hash {path}"))?;
        if fingerprints_match(remote, &local_hash) {
            debug!(path = %path, "Unchanged");
            return Ok(());
        }

        let data = self
            .local
            .read_file(path)
            .await
            .with_context(|| format!("Failed to read {path}"))?;
        self.remote
            .update_content(remote.id(), &data)
            .await
            .with_context(|| format!("Failed to update remote content of {path}"))?;
        report.files_updated += 1;
        debug!(path = %path, id = %remote.id(), bytes = data.len(), "Remote content updated");
        Ok(())
    }

    async fn upload_file(&self, parent: &RemoteId, name: &str, path: &SyncPath) -> Result<Node> {
        let data = self
            .local
            .read_file(path)
            .await
            .with_context(|| format!("Failed to read {path}"))?;
        // Zero-byte files are created from metadata alone.
        let content = (!data.is_empty()).then_some(data.as_slice());
        let node = self
            .remote
            .create_file(parent, name, None, content)
            .await
            .with_context(|| format!("Failed to upload {path}"))?;
        debug!(path = %path, id = %node.id(), bytes = data.len(), "File uploaded");
        Ok(node)
    }

    async fn delete_remote(&self, node: &Node, report: &mut SyncReport) -> Result<()> {
        self.remote
            .delete(node.id())
            .await
            .with_context(|| format!("Failed to delete remote entry {} ({})", node.name(), node.id()))?;
        report.remote_deleted += 1;
        debug!(id = %node.id(), name = node.name(), "Remote entry deleted");
        Ok(())
    }

    async fn ensure_local_directory(&self, path: &SyncPath) -> Result<()> {
        if !self.local.exists(path).await? {
            return Err(SyncError::LocalPathMissing(path.as_path().to_path_buf()).into());
        }
        if !self.local.is_dir(path).await? {
            return Err(SyncError::NotADirectory(format!("local '{path}'")).into());
        }
        Ok(())
    }

    // ========================================================================
    // pull
    // ========================================================================

    /// Make the local directory `local_path` mirror the remote folder `node`
    ///
    /// `local_path` and its missing parents are created when absent.
    ///
    /// # Errors
    /// `SyncError::NotADirectory` if `node` is not a folder or `local_path`
    /// exists but is not a directory; both before any mutation. Otherwise
    /// the first failing remote or local call.
    #[tracing::instrument(skip(self, node, options), fields(remote = %node.id(), local = %local_path))]
    pub async fn pull(
        &self,
        node: &Node,
        local_path: &SyncPath,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        ensure_directory(node)?;

        let start = Instant::now();
        let mut report = SyncReport::default();

        let fresh = if self.local.exists(local_path).await? {
            if !self.local.is_dir(local_path).await? {
                return Err(SyncError::NotADirectory(format!("local '{local_path}'")).into());
            }
            false
        } else {
            self.local
                .create_directory(local_path)
                .await
                .with_context(|| format!("Failed to create {local_path}"))?;
            report.local_folders_created += 1;
            true
        };
        info!("Starting pull");

        let mut stack = vec![Frame {
            remote: node.clone(),
            local: local_path.clone(),
            top: true,
            fresh,
        }];
        while let Some(frame) = stack.pop() {
            self.pull_level(frame, options, &mut stack, &mut report)
                .await?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            downloaded = report.files_downloaded,
            exported = report.documents_exported,
            folders_created = report.local_folders_created,
            deleted = report.local_deleted,
            conflicts = report.conflicts.len(),
            duration_ms = report.duration_ms,
            "Pull complete"
        );
        Ok(report)
    }

    async fn pull_level(
        &self,
        frame: Frame,
        options: &SyncOptions,
        stack: &mut Vec<Frame>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let Frame {
            remote: folder,
            local,
            top,
            fresh,
        } = frame;
        debug!(remote = %folder.id(), local = %local, fresh, "Pulling folder");

        // Sorted so removals happen in a stable order.
        let local_entries: BTreeMap<String, bool> = if fresh {
            BTreeMap::new()
        } else {
            self.local
                .list_dir(&local)
                .await
                .with_context(|| format!("Failed to list local directory {local}"))?
                .into_iter()
                .map(|e| (e.name, e.is_dir))
                .collect()
        };

        let children = self
            .remote
            .list_children(folder.id(), true)
            .await
            .with_context(|| format!("Failed to list remote folder {}", folder.id()))?;

        let mut checked: HashSet<&str> = HashSet::new();
        for child in children.iter().filter(|c| options.pulls(c.name(), top)) {
            checked.insert(child.name());

            let target = match local.join(child.name()) {
                Ok(target) => target,
                Err(_) => {
                    report.conflict(
                        &format!("{local}/{}", child.name()),
                        "remote name is not a valid local file name",
                    );
                    continue;
                }
            };

            match plan_pull(child, local_entries.get(child.name()).copied()) {
                PullAction::Descend => stack.push(Frame {
                    remote: child.clone(),
                    local: target,
                    top: false,
                    fresh: false,
                }),
                PullAction::CreateAndDescend => {
                    self.local
                        .create_directory(&target)
                        .await
                        .with_context(|| format!("Failed to create {target}"))?;
                    report.local_folders_created += 1;
                    stack.push(Frame {
                        remote: child.clone(),
                        local: target,
                        top: false,
                        fresh: true,
                    });
                }
                PullAction::TypeConflict => {
                    let reason = if child.is_directory() {
                        "remote folder, local file"
                    } else {
                        "remote file, local directory"
                    };
                    report.conflict(&target, reason);
                }
                PullAction::Export => {
                    let bytes = self
                        .remote
                        .export(child.id(), &self.export_mime_type, target.as_path())
                        .await
                        .with_context(|| format!("Failed to export {} to {target}", child.id()))?;
                    report.documents_exported += 1;
                    debug!(path = %target, bytes, "Document exported");
                }
                PullAction::SkipUnexportable => {
                    debug!(path = %target, mime = child.mime_type(), "No export format, skipping");
                }
                PullAction::Download => {
                    self.download(child, &target).await?;
                    report.files_downloaded += 1;
                }
                PullAction::CompareContent => {
                    let local_hash = self
                        .local
                        .compute_hash(&target)
                        .await
                        .with_context(|| format!("Failed to hash {target}"))?;
                    if fingerprints_match(child, &local_hash) {
                        debug!(path = %target, "Unchanged");
                    } else {
                        self.download(child, &target).await?;
                        report.files_downloaded += 1;
                    }
                }
            }
        }

        if options.remove_nonexisting {
            for (name, is_dir) in &local_entries {
                if checked.contains(name.as_str()) {
                    continue;
                }
                let path = local.join(name)?;
                let removed = if *is_dir {
                    self.local.remove_tree(&path).await
                } else {
                    self.local.remove_file(&path).await
                };
                removed.with_context(|| format!("Failed to remove {path}"))?;
                report.local_deleted += 1;
                debug!(path = %path, "Local entry removed");
            }
        }

        Ok(())
    }

    async fn download(&self, remote: &Node, target: &SyncPath) -> Result<()> {
        let written = if remote.size() == 0 {
            // Nothing to transfer.
            self.local.write_file(target, &[]).await
        } else {
            self.remote
                .download(remote.id(), target.as_path())
                .await
                .map(|_| ())
        };
        written.with_context(|| format!("Failed to download {} to {target}", remote.id()))?;
        debug!(path = %target, bytes = remote.size(), "File downloaded");
        Ok(())
    }

    // ========================================================================
    // upload
    // ========================================================================

    /// Upload a local file or directory tree under the remote folder `parent`
    ///
    /// A file becomes a new remote file; a directory becomes a new remote
    /// folder of the same name with the whole subtree pushed into it.
    /// Existing remote entries of the same name are left alone.
    ///
    /// # Returns
    /// The created node and the run's report
    #[tracing::instrument(skip(self, parent, options), fields(parent = %parent.id(), local = %local_path))]
    pub async fn upload(
        &self,
        parent: &Node,
        local_path: &SyncPath,
        options: &SyncOptions,
    ) -> Result<(Node, SyncReport)> {
        ensure_directory(parent)?;
        if !self.local.exists(local_path).await? {
            return Err(SyncError::LocalPathMissing(local_path.as_path().to_path_buf()).into());
        }
        let name = local_path
            .file_name()
            .ok_or_else(|| SyncError::from(DomainError::InvalidName(local_path.to_string())))?
            .to_string();

        let start = Instant::now();
        let mut report = SyncReport::default();

        let node = if self.local.is_dir(local_path).await? {
            let folder = self
                .remote
                .create_folder(parent.id(), &name)
                .await
                .with_context(|| format!("Failed to create remote folder for {local_path}"))?;
            report.remote_folders_created += 1;

            let mut stack = vec![Frame {
                remote: folder.clone(),
                local: local_path.clone(),
                top: true,
                fresh: true,
            }];
            while let Some(frame) = stack.pop() {
                self.push_level(frame, options, &mut stack, &mut report)
                    .await?;
            }
            folder
        } else {
            let node = self.upload_file(parent.id(), &name, local_path).await?;
            report.files_uploaded += 1;
            node
        };

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            id = %node.id(),
            uploaded = report.files_uploaded,
            folders_created = report.remote_folders_created,
            duration_ms = report.duration_ms,
            "Upload complete"
        );
        Ok((node, report))
    }
}

// ============================================================================
// Unit tests
// ============================================================================
