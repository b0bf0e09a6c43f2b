//!
//! acl-proxy publisher
//! -------------------
//! Owns the publish pointer and the live artifact under `current/`.
//!
//! A publish copies the chosen snapshot's bytes over `current/auth.json` with an
//! fsynced staging file and a rename, then replaces `current/snapshot.json` (the
//! pointer) the same way. The broker reads `auth.json` without going through this
//! process, so the rename is what keeps it from ever seeing a mixed file. Publishes
//! are serialized with each other by the pointer mutex.
//!
//! After the swap the configured `Notifier` runs. Its failure comes back as a warning
//! on the outcome; the publish stays committed.
//!
//! On open, a live document that disagrees with the pointer (a crash between the two
//! renames) is rewritten from the pointer's snapshot.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::atomic::{remove_file_if_exists, replace_file};
use crate::error::{ConfError, ConfResult};
use crate::model::SnapshotState;
use crate::paths;
use crate::snapshots::SnapshotStore;

mod notifier;

pub use notifier::{CommandNotifier, NoopNotifier, Notifier, PublishEvent};

/// Persisted form of the publish pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPointer {
    pub name: String,
    pub published_at: DateTime<Utc>,
    /// Snapshots that were live before and have since been replaced.
    #[serde(default)]
    pub superseded: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub name: String,
    pub published_at: DateTime<Utc>,
    /// Set when the broker notification failed after the switch was committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<ConfError>,
}

pub struct Publisher {
    data_root: PathBuf,
    snapshots: Arc<SnapshotStore>,
    notifier: Box<dyn Notifier>,
    pointer: Mutex<Option<PublishPointer>>,
}

impl Publisher {
    /// Open the publisher, restoring the pointer from `current/snapshot.json` if present.
    pub fn open(snapshots: Arc<SnapshotStore>, notifier: Box<dyn Notifier>) -> ConfResult<Self> {
        let data_root = snapshots.data_root().to_path_buf();
        let dir = paths::current_dir(&data_root);
        std::fs::create_dir_all(&dir).map_err(|e| ConfError::storage(format!("create {}", dir.display()), e))?;
        if let Ok(rd) = std::fs::read_dir(&dir) {
            for entry in rd.flatten() {
                if entry.file_name().to_string_lossy().starts_with('.') {
                    warn!(target: "acl_proxy::publish", "removing stale staging file {}", entry.path().display());
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
        let pointer = load_pointer(&paths::current_pointer(&data_root))?;
        reconcile_live(&snapshots, &paths::current_document(&data_root), pointer.as_ref())?;
        if let Some(p) = &pointer {
            info!(target: "acl_proxy::publish", "live snapshot is '{}' (published {})", p.name, p.published_at);
        }
        Ok(Self { data_root, snapshots, notifier, pointer: Mutex::new(pointer) })
    }

    /// Path the broker reads.
    pub fn live_path(&self) -> PathBuf { paths::current_document(&self.data_root) }

    /// Name of the live snapshot, `None` until the first publish.
    pub fn current_name(&self) -> Option<String> {
        self.pointer.lock().as_ref().map(|p| p.name.clone())
    }

    pub fn snapshot_state(&self, name: &str) -> ConfResult<SnapshotState> {
        if !self.snapshots.exists(name) {
            return Err(ConfError::not_found("snapshot", name));
        }
        let ptr = self.pointer.lock();
        Ok(match ptr.as_ref() {
            Some(p) if p.name == name => SnapshotState::Live,
            Some(p) if p.superseded.contains(name) => SnapshotState::Superseded,
            _ => SnapshotState::Created,
        })
    }

    /// Make snapshot `name` live.
    pub fn publish(&self, name: &str) -> ConfResult<PublishOutcome> {
        let published_at = self.switch(name)?;
        let live = self.live_path();
        let warning = match self.notifier.notify(&PublishEvent { name, document_path: &live }) {
            Ok(()) => None,
            Err(e) => {
                warn!(target: "acl_proxy::publish", "snapshot '{}' is live but notification failed: {}", name, e);
                Some(e)
            }
        };
        Ok(PublishOutcome { name: name.to_string(), published_at, warning })
    }

    fn switch(&self, name: &str) -> ConfResult<DateTime<Utc>> {
        let bytes = self.snapshots.snapshot_bytes(name)?;
        let doc_path = paths::current_document(&self.data_root);
        let ptr_path = paths::current_pointer(&self.data_root);

        let mut ptr = self.pointer.lock();
        let previous = match std::fs::read(&doc_path) {
            Ok(b) => Some(b),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(ConfError::storage(format!("read {}", doc_path.display()), e)),
        };

        let mut superseded = ptr.as_ref().map(|p| p.superseded.clone()).unwrap_or_default();
        if let Some(p) = ptr.as_ref() {
            if p.name != name {
                superseded.insert(p.name.clone());
            }
        }
        superseded.remove(name);
        let next = PublishPointer { name: name.to_string(), published_at: Utc::now(), superseded };
        let encoded = serde_json::to_vec_pretty(&next).map_err(|e| ConfError::storage("encode publish pointer", e))?;

        replace_file(&doc_path, &bytes)?;
        if let Err(e) = replace_file(&ptr_path, &encoded) {
            // Put the previous live document back so file and pointer agree.
            let restored = match &previous {
                Some(prev) => replace_file(&doc_path, prev),
                None => remove_file_if_exists(&doc_path),
            };
            if let Err(re) = restored {
                warn!(target: "acl_proxy::publish", "failed to restore live document after pointer write error: {}", re);
            }
            return Err(e);
        }
        info!(target: "acl_proxy::publish", "published snapshot '{}' ({} bytes)", name, bytes.len());
        let published_at = next.published_at;
        *ptr = Some(next);
        Ok(published_at)
    }
}

/// Bring `current/auth.json` back in line with the pointer. A crash between the two
/// renames of a publish leaves the new document live under the old pointer; the
/// pointer is authoritative, so the document is rewritten from its snapshot.
fn reconcile_live(snapshots: &SnapshotStore, live: &Path, pointer: Option<&PublishPointer>) -> ConfResult<()> {
    let on_disk = match std::fs::read(live) {
        Ok(b) => Some(b),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(ConfError::storage(format!("read {}", live.display()), e)),
    };
    match pointer {
        Some(p) => {
            let expected = match snapshots.snapshot_bytes(&p.name) {
                Ok(b) => b,
                Err(ConfError::NotFound { .. }) => {
                    warn!(target: "acl_proxy::publish", "live snapshot '{}' is missing from the snapshot store", p.name);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            if on_disk.as_deref() != Some(expected.as_slice()) {
                warn!(
                    target: "acl_proxy::publish",
                    "{} does not match live snapshot '{}'; restoring it",
                    live.display(), p.name
                );
                replace_file(live, &expected)?;
            }
        }
        None if on_disk.is_some() => {
            warn!(target: "acl_proxy::publish", "removing {} left by an unfinished first publish", live.display());
            remove_file_if_exists(live)?;
        }
        None => {}
    }
    Ok(())
}

fn load_pointer(path: &Path) -> ConfResult<Option<PublishPointer>> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ConfError::storage(format!("decode {}", path.display()), e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfError::storage(format!("read {}", path.display()), e)),
    }
}
