//!
//! acl-proxy store facade
//! ----------------------
//! Single entry point used by the HTTP layer. Owns the registry, snapshot store and
//! publisher for one data root; build as many independent instances as needed.
//!
//! Snapshot capture reads the registry through `Registry::get_all`, which takes the
//! same lock as every mutation, so a snapshot reflects a real point in the upsert
//! history. Generation happens before anything is written: a dangling template
//! reference aborts the create with nothing persisted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::credential::{CredentialPolicy, Plaintext};
use crate::error::{ConfError, ConfResult};
use crate::generator::{generate, AuthorizationDocument};
use crate::model::{Identity, PermissionTemplate, SnapshotInfo, SnapshotState, SubjectRules};
use crate::publisher::{NoopNotifier, Notifier, PublishOutcome, Publisher};
use crate::registry::{Registry, RegistryView};
use crate::snapshots::SnapshotStore;
use crate::validate::validate_name;

pub struct ConfigStore {
    data_root: PathBuf,
    registry: Registry,
    snapshots: Arc<SnapshotStore>,
    publisher: Publisher,
}

impl ConfigStore {
    /// Open with the plaintext credential policy and no broker notification.
    pub fn open<P: AsRef<Path>>(data_root: P) -> ConfResult<Self> {
        Self::open_with(data_root, Box::new(Plaintext), Box::new(NoopNotifier))
    }

    pub fn open_with<P: AsRef<Path>>(
        data_root: P,
        credentials: Box<dyn CredentialPolicy>,
        notifier: Box<dyn Notifier>,
    ) -> ConfResult<Self> {
        let data_root = data_root.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_root)
            .map_err(|e| ConfError::storage(format!("create {}", data_root.display()), e))?;
        let registry = Registry::open(&data_root, credentials)?;
        let snapshots = Arc::new(SnapshotStore::open(&data_root)?);
        let publisher = Publisher::open(snapshots.clone(), notifier)?;
        Ok(Self { data_root, registry, snapshots, publisher })
    }

    pub fn data_root(&self) -> &Path { &self.data_root }

    pub fn registry(&self) -> &Registry { &self.registry }

    // ---- Registry ----

    pub fn upsert_identity(
        &self,
        name: &str,
        credential: &str,
        permission_ref: Option<String>,
        account_ref: Option<String>,
    ) -> ConfResult<Identity> {
        self.registry.upsert_identity(name, credential, permission_ref, account_ref)
    }

    pub fn upsert_permission(
        &self,
        name: &str,
        publish: SubjectRules,
        subscribe: SubjectRules,
    ) -> ConfResult<PermissionTemplate> {
        self.registry.upsert_permission(name, publish, subscribe)
    }

    pub fn delete_identity(&self, name: &str) -> ConfResult<()> { self.registry.delete_identity(name) }

    pub fn delete_permission(&self, name: &str) -> ConfResult<()> { self.registry.delete_permission(name) }

    pub fn get_identity(&self, name: &str) -> ConfResult<Identity> { self.registry.get_identity(name) }

    pub fn get_permission(&self, name: &str) -> ConfResult<PermissionTemplate> { self.registry.get_permission(name) }

    pub fn list_identities(&self) -> Vec<Identity> { self.registry.list_identities() }

    pub fn list_permissions(&self) -> Vec<PermissionTemplate> { self.registry.list_permissions() }

    pub fn view(&self) -> RegistryView { self.registry.get_all() }

    // ---- Snapshots ----

    /// Capture the current registry state as snapshot `name`.
    pub fn create_snapshot(&self, name: &str) -> ConfResult<SnapshotInfo> {
        validate_name("snapshot", name)?;
        if self.snapshots.exists(name) {
            return Err(ConfError::already_exists("snapshot", name));
        }
        let view = self.registry.get_all();
        let document = generate(&view)?;
        debug!(
            target: "acl_proxy::snapshot",
            "captured '{}': identities={} permissions={}",
            name, view.identities.len(), view.permissions.len()
        );
        self.snapshots.create_snapshot(name, &document)
    }

    pub fn get_snapshot(&self, name: &str) -> ConfResult<AuthorizationDocument> { self.snapshots.get_snapshot(name) }

    /// Exact persisted bytes of snapshot `name`.
    pub fn snapshot_bytes(&self, name: &str) -> ConfResult<Vec<u8>> { self.snapshots.snapshot_bytes(name) }

    pub fn snapshot_info(&self, name: &str) -> ConfResult<SnapshotInfo> { self.snapshots.snapshot_info(name) }

    pub fn list_snapshots(&self) -> ConfResult<Vec<SnapshotInfo>> { self.snapshots.list_snapshots() }

    // ---- Publish ----

    pub fn publish(&self, name: &str) -> ConfResult<PublishOutcome> { self.publisher.publish(name) }

    pub fn current_name(&self) -> Option<String> { self.publisher.current_name() }

    pub fn snapshot_state(&self, name: &str) -> ConfResult<SnapshotState> { self.publisher.snapshot_state(name) }

    pub fn live_path(&self) -> PathBuf { self.publisher.live_path() }
}

/// Cheaply clonable handle shared across request handlers.
#[derive(Clone)]
pub struct SharedConfigStore(pub Arc<ConfigStore>);

impl SharedConfigStore {
    pub fn new(store: ConfigStore) -> Self { Self(Arc::new(store)) }

    pub fn open<P: AsRef<Path>>(data_root: P) -> ConfResult<Self> { Ok(Self::new(ConfigStore::open(data_root)?)) }
}

impl std::ops::Deref for SharedConfigStore {
    type Target = ConfigStore;
    fn deref(&self) -> &ConfigStore { &self.0 }
}
