//! Push: local tree onto a remote folder

use gapis_core::domain::newtypes::{FileHash, RemoteId};
use gapis_sync::engine::SyncOptions;
use gapis_sync::SyncError;

use crate::common::{self, MemoryStore};

fn opts(remove_nonexisting: bool, hidden: bool) -> SyncOptions {
    SyncOptions {
        remove_nonexisting,
        subfolders: None,
        hidden,
    }
}

// ============================================================================
// Mirroring
// ============================================================================

#[tokio::test]
async fn test_push_into_empty_folder_skips_hidden() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let local = common::make_local(&[
        ("a.txt", Some("H1")),
        ("b", None),
        (".secret", Some("s3cr3t")),
    ]);

    let report = common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &opts(true, false),
        )
        .await
        .unwrap();

    assert_eq!(
        store.tree(&target),
        common::tree_of(&[("a.txt", "H1"), ("b", "dir")])
    );
    assert_eq!(report.files_uploaded, 1);
    assert_eq!(report.remote_folders_created, 1);
    assert_eq!(report.remote_deleted, 0);
    assert!(report.conflicts.is_empty());
}

#[tokio::test]
async fn test_push_nested_tree() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let local = common::make_local(&[
        ("top.txt", Some("top")),
        ("src/main.rs", Some("fn main() {}")),
        ("src/deep/more/leaf.txt", Some("leaf")),
        ("empty", None),
    ]);

    common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &SyncOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(store.tree(&target), common::local_tree(local.path()));
}

#[tokio::test]
async fn test_push_is_idempotent() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let local = common::make_local(&[
        ("a.txt", Some("alpha")),
        ("empty.txt", Some("")),
        ("dir/b.txt", Some("beta")),
        ("dir/sub", None),
    ]);
    let engine = common::engine(&store);
    let path = common::sync_path(local.path());

    engine
        .push(&store.node(&target), &path, &SyncOptions::default())
        .await
        .unwrap();
    let after_first = store.mutations();

    let second = engine
        .push(&store.node(&target), &path, &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(second.remote_mutations(), 0);
    assert_eq!(store.mutations(), after_first);
}

#[tokio::test]
async fn test_push_updates_changed_file_in_place() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let existing = store.add_file(&target, "a.txt", b"old");
    let unchanged = store.add_file(&target, "b.txt", b"same");
    let local = common::make_local(&[("a.txt", Some("new")), ("b.txt", Some("same"))]);

    let report = common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &SyncOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.files_updated, 1);
    assert_eq!(report.files_uploaded, 0);
    // Same remote entries, new content.
    assert_eq!(store.content(&existing).unwrap(), b"new");
    assert_eq!(store.content(&unchanged).unwrap(), b"same");
}

#[tokio::test]
async fn test_push_empty_files() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let local = common::make_local(&[("empty.txt", Some(""))]);
    let engine = common::engine(&store);
    let path = common::sync_path(local.path());

    let first = engine
        .push(&store.node(&target), &path, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(first.files_uploaded, 1);
    // Created from metadata alone, no payload sent.
    assert_eq!(store.transfers(), 0);

    let created = store.children_named(&target, "empty.txt");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].size(), 0);
    assert_eq!(created[0].content_fingerprint(), Some(&FileHash::of_empty()));

    let second = engine
        .push(&store.node(&target), &path, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(second.remote_mutations(), 0);
}

#[tokio::test]
async fn test_push_overwrites_empty_file_without_digest() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let id = store.add_file_without_digest(&target, "e.txt", b"");
    let local = common::make_local(&[("e.txt", Some(""))]);

    let report = common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &SyncOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.files_updated, 1);
    assert_eq!(report.files_uploaded, 0);
    assert_eq!(
        store.node(&id).content_fingerprint(),
        Some(&FileHash::of_empty())
    );
}

#[tokio::test]
async fn test_push_truncated_file_is_updated() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let id = store.add_file(&target, "log.txt", b"lots of lines");
    let local = common::make_local(&[("log.txt", Some(""))]);

    let report = common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &SyncOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.files_updated, 1);
    assert_eq!(store.content(&id).unwrap(), b"");
}

// ============================================================================
// Deletion policy
// ============================================================================

#[tokio::test]
async fn test_push_removes_remote_extras() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let gone_file = store.add_file(&target, "gone.txt", b"x");
    let gone_dir = store.add_folder(&target, "old");
    let nested = store.add_file(&gone_dir, "inner.txt", b"y");
    let local = common::make_local(&[("keep.txt", Some("k"))]);

    let report = common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &opts(true, true),
        )
        .await
        .unwrap();

    assert_eq!(report.remote_deleted, 2);
    assert!(!store.exists(&gone_file));
    assert!(!store.exists(&gone_dir));
    assert!(!store.exists(&nested));
    assert_eq!(store.tree(&target), common::tree_of(&[("keep.txt", "k")]));
}

#[tokio::test]
async fn test_push_keeps_remote_extras_without_removal() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    store.add_file(&target, "gone.txt", b"x");
    let local = common::make_local(&[("keep.txt", Some("k"))]);

    let report = common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &opts(false, true),
        )
        .await
        .unwrap();

    assert_eq!(report.remote_deleted, 0);
    assert_eq!(
        store.tree(&target),
        common::tree_of(&[("gone.txt", "x"), ("keep.txt", "k")])
    );
}

#[tokio::test]
async fn test_push_removes_remote_hidden_entries_when_hidden_is_off() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let hidden = store.add_file(&target, ".env", b"TOKEN=1");
    let local = common::make_local(&[(".env", Some("TOKEN=1")), ("a.txt", Some("a"))]);

    common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &opts(true, false),
        )
        .await
        .unwrap();

    assert!(!store.exists(&hidden));
}

#[tokio::test]
async fn test_push_type_change_replaces_remote_entry() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let was_file = store.add_file(&target, "data", b"flat");
    let local = common::make_local(&[("data/part1", Some("p1"))]);

    let report = common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &opts(true, true),
        )
        .await
        .unwrap();

    assert!(!store.exists(&was_file));
    assert_eq!(report.remote_folders_created, 1);
    assert_eq!(
        store.tree(&target),
        common::tree_of(&[("data", "dir"), ("data/part1", "p1")])
    );
}

// ============================================================================
// Ambiguity
// ============================================================================

#[tokio::test]
async fn test_push_skips_ambiguous_files() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let first = store.add_file(&target, "a.txt", b"one");
    let second = store.add_file(&target, "a.txt", b"two");
    let local = common::make_local(&[("a.txt", Some("three"))]);
    let before = store.mutations();

    let report = common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &opts(true, true),
        )
        .await
        .unwrap();

    assert_eq!(report.skipped_ambiguous, 1);
    assert_eq!(store.mutations(), before);
    assert_eq!(store.content(&first).unwrap(), b"one");
    assert_eq!(store.content(&second).unwrap(), b"two");
}

#[tokio::test]
async fn test_push_skips_ambiguous_folders_without_removal() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    store.add_folder(&target, "b");
    store.add_folder(&target, "b");
    let local = common::make_local(&[("b/x.txt", Some("x"))]);

    let report = common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &opts(false, true),
        )
        .await
        .unwrap();

    assert_eq!(report.skipped_ambiguous, 1);
    assert_eq!(store.children_named(&target, "b").len(), 2);
    assert_eq!(report.remote_mutations(), 0);
}

#[tokio::test]
async fn test_push_replaces_ambiguous_folders_with_removal() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let b1 = store.add_folder(&target, "b");
    let b2 = store.add_folder(&target, "b");
    store.add_file(&b1, "stale.txt", b"stale");
    let local = common::make_local(&[("b/x.txt", Some("x"))]);

    let report = common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &opts(true, true),
        )
        .await
        .unwrap();

    assert!(!store.exists(&b1));
    assert!(!store.exists(&b2));
    assert_eq!(store.children_named(&target, "b").len(), 1);
    assert_eq!(report.remote_deleted, 2);
    assert_eq!(report.remote_folders_created, 1);
    assert_eq!(
        store.tree(&target),
        common::tree_of(&[("b", "dir"), ("b/x.txt", "x")])
    );
}

#[tokio::test]
async fn test_push_leaves_native_document_alone() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    let doc = store.add_document(&target, "Notes", "application/vnd.google-apps.document");
    let local = common::make_local(&[("Notes", Some("exported once"))]);

    let report = common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &opts(true, true),
        )
        .await
        .unwrap();

    assert!(store.exists(&doc));
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.remote_mutations(), 0);
}

// ============================================================================
// Filters and preconditions
// ============================================================================

#[tokio::test]
async fn test_push_subfolders_allow_list() {
    let store = MemoryStore::new();
    let target = store.add_folder(&RemoteId::root(), "backup");
    store.add_file(&target, "untracked.txt", b"u");
    let local = common::make_local(&[
        ("a.txt", Some("a")),
        ("docs/guide.md", Some("guide")),
        ("music/song.mp3", Some("la")),
    ]);
    let options = SyncOptions {
        subfolders: Some(vec!["docs".to_string()]),
        ..SyncOptions::default()
    };

    common::engine(&store)
        .push(
            &store.node(&target),
            &common::sync_path(local.path()),
            &options,
        )
        .await
        .unwrap();

    // Unlisted top-level entries are neither uploaded nor removed.
    assert_eq!(
        store.tree(&target),
        common::tree_of(&[
            ("docs", "dir"),
            ("docs/guide.md", "guide"),
            ("untracked.txt", "u"),
        ])
    );
}

#[tokio::test]
async fn test_push_rejects_file_node() {
    let store = MemoryStore::new();
    let file = store.add_file(&RemoteId::root(), "a.txt", b"a");
    let local = common::make_local(&[]);

    let err = common::engine(&store)
        .push(
            &store.node(&file),
            &common::sync_path(local.path()),
            &SyncOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::NotADirectory(_))
    ));
    assert_eq!(store.mutations(), 0);
}

#[tokio::test]
async fn test_push_rejects_missing_local_path() {
    let store = MemoryStore::new();
    let local = common::make_local(&[]);
    let missing = local.path().join("nope");

    let err = common::engine(&store)
        .push(
            &store.root(),
            &common::sync_path(&missing),
            &SyncOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::LocalPathMissing(_))
    ));
}

#[tokio::test]
async fn test_push_rejects_local_file() {
    let store = MemoryStore::new();
    let local = common::make_local(&[("plain.txt", Some("p"))]);

    let err = common::engine(&store)
        .push(
            &store.root(),
            &common::sync_path(&local.path().join("plain.txt")),
            &SyncOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::NotADirectory(_))
    ));
    assert_eq!(store.mutations(), 0);
}
