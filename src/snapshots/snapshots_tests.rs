use super::*;
use std::sync::{Arc, Barrier};

use crate::generator::{generate, UserRecord};
use crate::registry::Registry;

fn doc_with(users: &[&str]) -> AuthorizationDocument {
    AuthorizationDocument {
        users: users
            .iter()
            .map(|u| UserRecord { username: u.to_string(), password: "pw".into(), permissions: None })
            .collect(),
        accounts: None,
    }
}

#[test]
fn create_then_get_roundtrips_document() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(tmp.path()).unwrap();
    let doc = doc_with(&["a", "b"]);
    let info = store.create_snapshot("hello", &doc).unwrap();
    assert_eq!(info.name, "hello");
    assert_eq!(store.get_snapshot("hello").unwrap(), doc);
    assert_eq!(store.snapshot_bytes("hello").unwrap(), doc.render().unwrap());
    assert_eq!(store.snapshot_info("hello").unwrap(), info);
    assert!(store.exists("hello"));
}

#[test]
fn duplicate_name_is_rejected_and_original_kept() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(tmp.path()).unwrap();
    store.create_snapshot("v1", &doc_with(&["a"])).unwrap();
    let before = store.snapshot_bytes("v1").unwrap();
    let err = store.create_snapshot("v1", &doc_with(&["b"])).unwrap_err();
    assert!(matches!(err, ConfError::AlreadyExists { .. }), "{:?}", err);
    assert_eq!(store.snapshot_bytes("v1").unwrap(), before);
}

#[test]
fn unknown_snapshot_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(tmp.path()).unwrap();
    assert!(matches!(store.get_snapshot("nope"), Err(ConfError::NotFound { .. })));
    assert!(matches!(store.snapshot_info("nope"), Err(ConfError::NotFound { .. })));
    assert!(!store.exists("nope"));
}

#[test]
fn names_cannot_escape_the_data_root() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(tmp.path()).unwrap();
    for bad in ["../x", "a/b", ".tmp-abc", ""] {
        let err = store.create_snapshot(bad, &doc_with(&[])).unwrap_err();
        assert_eq!(err.code_str(), "validation_error", "{}", bad);
    }
}

#[test]
fn list_is_sorted_and_skips_staging() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(tmp.path()).unwrap();
    for n in ["c", "a", "b"] {
        store.create_snapshot(n, &doc_with(&[n])).unwrap();
    }
    std::fs::create_dir_all(paths::snapshot_staging_dir(tmp.path(), "dead")).unwrap();
    let names: Vec<String> = store.list_snapshots().unwrap().into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn open_removes_stale_staging_dirs() {
    let tmp = tempfile::tempdir().unwrap();
    let stale = paths::snapshot_staging_dir(tmp.path(), "crashed");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join(DOCUMENT_FILE), b"{\"us").unwrap();
    let _store = SnapshotStore::open(tmp.path()).unwrap();
    assert!(!stale.exists());
}

#[test]
fn snapshot_is_immune_to_registry_changes() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(tmp.path()).unwrap();
    let reg = Registry::in_memory();
    reg.upsert_identity("a", "one", None, None).unwrap();
    store.create_snapshot("s", &generate(&reg.get_all()).unwrap()).unwrap();
    let before = store.snapshot_bytes("s").unwrap();
    reg.upsert_identity("a", "two", None, None).unwrap();
    reg.upsert_identity("b", "three", None, Some("x".into())).unwrap();
    reg.delete_identity("a").unwrap();
    assert_eq!(store.snapshot_bytes("s").unwrap(), before);
}

#[test]
fn racing_creates_have_one_winner() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(SnapshotStore::open(tmp.path()).unwrap());
    let n = 8;
    let barrier = Arc::new(Barrier::new(n));
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let store = store.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let writer = format!("writer-{}", i);
                barrier.wait();
                store.create_snapshot("race", &doc_with(&[writer.as_str()]))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results.iter().filter(|r| matches!(r, Err(ConfError::AlreadyExists { .. }))).count();
    assert_eq!(ok, 1);
    assert_eq!(conflicts, n - 1);
    assert_eq!(store.get_snapshot("race").unwrap().users.len(), 1);
}

#[test]
fn list_skips_foreign_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(tmp.path()).unwrap();
    store.create_snapshot("real", &doc_with(&["u"])).unwrap();
    let root = paths::snapshots_dir(tmp.path());
    std::fs::create_dir(root.join("not a name")).unwrap();
    std::fs::create_dir(root.join("empty")).unwrap();
    std::fs::create_dir(root.join("no-meta")).unwrap();
    std::fs::write(root.join("no-meta").join(DOCUMENT_FILE), b"{\"users\":[]}\n").unwrap();
    std::fs::write(root.join("stray.txt"), b"x").unwrap();

    let names: Vec<String> = store.list_snapshots().unwrap().into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["real"]);
}

#[cfg(unix)]
#[test]
fn failed_rename_cleans_up_and_persists_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(tmp.path()).unwrap();
    // A dangling symlink at the target is not an existing snapshot, but a directory
    // cannot be renamed over it.
    let target = paths::snapshot_dir(tmp.path(), "blocked");
    std::os::unix::fs::symlink(tmp.path().join("nowhere"), &target).unwrap();

    let err = store.create_snapshot("blocked", &doc_with(&["u"])).unwrap_err();
    assert_eq!(err.code_str(), "storage_failure");
    assert!(!store.exists("blocked"));
    assert!(matches!(store.get_snapshot("blocked"), Err(ConfError::NotFound { .. })));
    let staged = std::fs::read_dir(paths::snapshots_dir(tmp.path()))
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
        .count();
    assert_eq!(staged, 0);
    assert!(store.list_snapshots().unwrap().is_empty());
}
