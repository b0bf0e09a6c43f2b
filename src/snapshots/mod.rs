//!
//! acl-proxy snapshot store
//! ------------------------
//! Immutable, named authorization documents under `snapshots/<name>/`. Each snapshot
//! directory holds the rendered `auth.json` and a `snapshot.json` with its metadata.
//!
//! Creation stages both files in a dot-prefixed temp directory, fsyncs them, and
//! renames the directory to its final name in a single step, so a reader either sees
//! no snapshot or a complete one. Creation is serialized in-process, which makes
//! "exactly one creator wins" hold for concurrent calls with the same name; the
//! directory rename fails on a populated target, which also covers other processes.
//!
//! Snapshots are never rewritten or deleted here. Retention belongs to the operator.

use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::atomic::{fsync_dir, write_synced};
use crate::error::{ConfError, ConfResult};
use crate::generator::AuthorizationDocument;
use crate::model::SnapshotInfo;
use crate::paths::{self, DOCUMENT_FILE, META_FILE};
use crate::validate::validate_name;

pub struct SnapshotStore {
    data_root: PathBuf,
    create_lock: Mutex<()>,
}

impl SnapshotStore {
    /// Open the store under `data_root`, creating `snapshots/` and removing any
    /// staging directories left behind by an interrupted create.
    pub fn open<P: AsRef<Path>>(data_root: P) -> ConfResult<Self> {
        let data_root = data_root.as_ref().to_path_buf();
        let dir = paths::snapshots_dir(&data_root);
        std::fs::create_dir_all(&dir).map_err(|e| ConfError::storage(format!("create {}", dir.display()), e))?;
        let rd = std::fs::read_dir(&dir).map_err(|e| ConfError::storage(format!("read {}", dir.display()), e))?;
        for entry in rd.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(".tmp-") {
                warn!(target: "acl_proxy::snapshot", "removing stale staging directory {}", entry.path().display());
                let _ = std::fs::remove_dir_all(entry.path());
            }
        }
        Ok(Self { data_root, create_lock: Mutex::new(()) })
    }

    pub fn data_root(&self) -> &Path { &self.data_root }

    fn dir_for(&self, name: &str) -> ConfResult<PathBuf> {
        validate_name("snapshot", name)?;
        Ok(paths::snapshot_dir(&self.data_root, name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.dir_for(name).map(|d| d.join(DOCUMENT_FILE).is_file()).unwrap_or(false)
    }

    /// Persist `document` as snapshot `name`. Fails with `AlreadyExists` if the name is
    /// taken; the existing snapshot is left untouched.
    pub fn create_snapshot(&self, name: &str, document: &AuthorizationDocument) -> ConfResult<SnapshotInfo> {
        let final_dir = self.dir_for(name)?;
        let bytes = document.render()?;
        let info = SnapshotInfo { name: name.to_string(), created_at: Utc::now() };
        let meta = serde_json::to_vec_pretty(&info).map_err(|e| ConfError::storage("encode snapshot metadata", e))?;

        let _guard = self.create_lock.lock();
        if final_dir.exists() {
            return Err(ConfError::already_exists("snapshot", name));
        }
        let token = uuid::Uuid::new_v4().simple().to_string();
        let staging = paths::snapshot_staging_dir(&self.data_root, &token);
        if let Err(e) = self.stage(&staging, &bytes, &meta) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }
        if let Err(e) = std::fs::rename(&staging, &final_dir) {
            let _ = std::fs::remove_dir_all(&staging);
            if final_dir.exists() {
                return Err(ConfError::already_exists("snapshot", name));
            }
            return Err(ConfError::storage(format!("rename {} -> {}", staging.display(), final_dir.display()), e));
        }
        let _ = fsync_dir(&paths::snapshots_dir(&self.data_root));
        info!(target: "acl_proxy::snapshot", "created snapshot '{}' ({} bytes)", name, bytes.len());
        Ok(info)
    }

    fn stage(&self, staging: &Path, document: &[u8], meta: &[u8]) -> ConfResult<()> {
        std::fs::create_dir(staging).map_err(|e| ConfError::storage(format!("create {}", staging.display()), e))?;
        write_synced(&staging.join(DOCUMENT_FILE), document)?;
        write_synced(&staging.join(META_FILE), meta)?;
        fsync_dir(staging).map_err(|e| ConfError::storage(format!("sync {}", staging.display()), e))?;
        debug!(target: "acl_proxy::snapshot", "staged snapshot in {}", staging.display());
        Ok(())
    }

    /// Exact bytes persisted for snapshot `name`.
    pub fn snapshot_bytes(&self, name: &str) -> ConfResult<Vec<u8>> {
        let path = self.dir_for(name)?.join(DOCUMENT_FILE);
        match std::fs::read(&path) {
            Ok(b) => Ok(b),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConfError::not_found("snapshot", name)),
            Err(e) => Err(ConfError::storage(format!("read {}", path.display()), e)),
        }
    }

    pub fn get_snapshot(&self, name: &str) -> ConfResult<AuthorizationDocument> {
        AuthorizationDocument::from_bytes(&self.snapshot_bytes(name)?)
    }

    pub fn snapshot_info(&self, name: &str) -> ConfResult<SnapshotInfo> {
        let path = self.dir_for(name)?.join(META_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ConfError::not_found("snapshot", name)),
            Err(e) => return Err(ConfError::storage(format!("read {}", path.display()), e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| ConfError::storage(format!("decode {}", path.display()), e))
    }

    /// All snapshots sorted by name. Directories that are not complete snapshots are skipped.
    pub fn list_snapshots(&self) -> ConfResult<Vec<SnapshotInfo>> {
        let dir = paths::snapshots_dir(&self.data_root);
        let rd = std::fs::read_dir(&dir).map_err(|e| ConfError::storage(format!("read {}", dir.display()), e))?;
        let mut names: Vec<String> = Vec::new();
        for entry in rd {
            let entry = entry.map_err(|e| ConfError::storage(format!("read {}", dir.display()), e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            if validate_name("snapshot", &name).is_err() || !self.exists(&name) {
                warn!(target: "acl_proxy::snapshot", "ignoring foreign entry {}", entry.path().display());
                continue;
            }
            names.push(name);
        }
        names.sort();
        let mut out = Vec::with_capacity(names.len());
        for name in &names {
            match self.snapshot_info(name) {
                Ok(info) => out.push(info),
                Err(ConfError::NotFound { .. }) => {
                    warn!(target: "acl_proxy::snapshot", "snapshot '{}' has no metadata, skipping", name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "snapshots_tests.rs"]
mod snapshots_tests;
