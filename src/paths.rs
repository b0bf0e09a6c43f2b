use std::path::{Path, PathBuf};

/// Centralized helpers for the on-disk layout rooted at a data directory.
/// Every module resolves locations through these so the layout stays in one place.
#[inline]
pub fn snapshots_dir(data_root: &Path) -> PathBuf { data_root.join("snapshots") }

#[inline]
pub fn snapshot_dir(data_root: &Path, name: &str) -> PathBuf { snapshots_dir(data_root).join(name) }

/// Temp directories are dot-prefixed so they can never collide with a valid snapshot name.
#[inline]
pub fn snapshot_staging_dir(data_root: &Path, token: &str) -> PathBuf {
    snapshots_dir(data_root).join(format!(".tmp-{}", token))
}

// ---- Live artifact (under current/) ----
#[inline]
pub fn current_dir(data_root: &Path) -> PathBuf { data_root.join("current") }

#[inline]
pub fn current_document(data_root: &Path) -> PathBuf { current_dir(data_root).join(DOCUMENT_FILE) }

#[inline]
pub fn current_pointer(data_root: &Path) -> PathBuf { current_dir(data_root).join(META_FILE) }

// ---- Registry mirror (under resources/) ----
#[inline]
pub fn resources_dir(data_root: &Path) -> PathBuf { data_root.join("resources") }

#[inline]
pub fn users_dir(data_root: &Path) -> PathBuf { resources_dir(data_root).join("users") }

#[inline]
pub fn permissions_dir(data_root: &Path) -> PathBuf { resources_dir(data_root).join("permissions") }

/// Generated authorization document, as included by the broker config.
pub const DOCUMENT_FILE: &str = "auth.json";
/// Per-snapshot metadata, and the publish pointer under current/.
pub const META_FILE: &str = "snapshot.json";
