//!
//! acl-proxy registry
//! ------------------
//! Authoritative in-memory store of identities and permission templates.
//!
//! All mutations and the point-in-time read used for snapshot capture go through a
//! single `RwLock`, so a reader never observes a half-applied upsert. When the
//! registry is opened on a data root, each mutation is mirrored to
//! `resources/{users,permissions}/<name>.json` while the write lock is held; a
//! failed mirror write leaves memory untouched.
//!
//! References (`permission_ref`, `account_ref`) are not checked here.
//! Identities and templates may be upserted in any order; resolution happens in
//! the generator.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::credential::{CredentialPolicy, Plaintext};
use crate::error::{ConfError, ConfResult};
use crate::model::{Identity, PermissionTemplate, SubjectRules};
use crate::validate::{normalize_ref, normalize_subjects, validate_name};

mod resources;

use resources::ResourceMirror;

/// Consistent point-in-time copy of the registry, keyed and ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryView {
    pub identities: BTreeMap<String, Identity>,
    pub permissions: BTreeMap<String, PermissionTemplate>,
}

#[derive(Default)]
struct State {
    identities: BTreeMap<String, Identity>,
    permissions: BTreeMap<String, PermissionTemplate>,
}

pub struct Registry {
    state: RwLock<State>,
    mirror: Option<ResourceMirror>,
    credentials: Box<dyn CredentialPolicy>,
}

impl Registry {
    /// Registry with no durable mirror and the plaintext credential policy.
    pub fn in_memory() -> Self {
        Self::in_memory_with_policy(Box::new(Plaintext))
    }

    pub fn in_memory_with_policy(credentials: Box<dyn CredentialPolicy>) -> Self {
        Self { state: RwLock::new(State::default()), mirror: None, credentials }
    }

    /// Open a registry mirrored under `data_root/resources`, loading any state left there.
    pub fn open<P: AsRef<Path>>(data_root: P, credentials: Box<dyn CredentialPolicy>) -> ConfResult<Self> {
        let mirror = ResourceMirror::open(data_root.as_ref())?;
        let (identities, permissions) = mirror.load()?;
        info!(
            target: "acl_proxy::registry",
            "registry loaded: identities={} permissions={} policy={}",
            identities.len(), permissions.len(), credentials.name()
        );
        Ok(Self {
            state: RwLock::new(State { identities, permissions }),
            mirror: Some(mirror),
            credentials,
        })
    }

    /// Create or replace an identity. Template and account references are not resolved here.
    pub fn upsert_identity(
        &self,
        name: &str,
        credential: &str,
        permission_ref: Option<String>,
        account_ref: Option<String>,
    ) -> ConfResult<Identity> {
        validate_name("identity", name)?;
        let permission_ref = normalize_ref("permissions", permission_ref)?;
        let account_ref = normalize_ref("account", account_ref)?;
        let credential = self.credentials.prepare(name, credential)?;
        let ident = Identity { name: name.to_string(), credential, permission_ref, account_ref };

        let mut st = self.state.write();
        if st.identities.get(name) == Some(&ident) {
            return Ok(ident);
        }
        if let Some(m) = &self.mirror {
            m.write_identity(&ident)?;
        }
        st.identities.insert(ident.name.clone(), ident.clone());
        debug!(
            target: "acl_proxy::registry",
            "upsert identity '{}' permissions={:?} account={:?}",
            ident.name, ident.permission_ref, ident.account_ref
        );
        Ok(ident)
    }

    /// Create or replace a permission template.
    pub fn upsert_permission(
        &self,
        name: &str,
        publish: SubjectRules,
        subscribe: SubjectRules,
    ) -> ConfResult<PermissionTemplate> {
        validate_name("permission", name)?;
        let template = PermissionTemplate {
            name: name.to_string(),
            publish: SubjectRules {
                allow: normalize_subjects("publish.allow", publish.allow)?,
                deny: normalize_subjects("publish.deny", publish.deny)?,
            },
            subscribe: SubjectRules {
                allow: normalize_subjects("subscribe.allow", subscribe.allow)?,
                deny: normalize_subjects("subscribe.deny", subscribe.deny)?,
            },
        };

        let mut st = self.state.write();
        if st.permissions.get(name) == Some(&template) {
            return Ok(template);
        }
        if let Some(m) = &self.mirror {
            m.write_permission(&template)?;
        }
        st.permissions.insert(template.name.clone(), template.clone());
        debug!(target: "acl_proxy::registry", "upsert permission '{}'", template.name);
        Ok(template)
    }

    pub fn delete_identity(&self, name: &str) -> ConfResult<()> {
        let mut st = self.state.write();
        if !st.identities.contains_key(name) {
            return Err(ConfError::not_found("identity", name));
        }
        if let Some(m) = &self.mirror {
            m.remove_identity(name)?;
        }
        st.identities.remove(name);
        debug!(target: "acl_proxy::registry", "deleted identity '{}'", name);
        Ok(())
    }

    pub fn delete_permission(&self, name: &str) -> ConfResult<()> {
        let mut st = self.state.write();
        if !st.permissions.contains_key(name) {
            return Err(ConfError::not_found("permission", name));
        }
        if let Some(m) = &self.mirror {
            m.remove_permission(name)?;
        }
        st.permissions.remove(name);
        debug!(target: "acl_proxy::registry", "deleted permission '{}'", name);
        Ok(())
    }

    pub fn get_identity(&self, name: &str) -> ConfResult<Identity> {
        self.state.read().identities.get(name).cloned().ok_or_else(|| ConfError::not_found("identity", name))
    }

    pub fn get_permission(&self, name: &str) -> ConfResult<PermissionTemplate> {
        self.state.read().permissions.get(name).cloned().ok_or_else(|| ConfError::not_found("permission", name))
    }

    /// All identities sorted by name.
    pub fn list_identities(&self) -> Vec<Identity> {
        self.state.read().identities.values().cloned().collect()
    }

    /// All permission templates sorted by name.
    pub fn list_permissions(&self) -> Vec<PermissionTemplate> {
        self.state.read().permissions.values().cloned().collect()
    }

    /// Point-in-time copy taken under the same lock as mutations.
    pub fn get_all(&self) -> RegistryView {
        let st = self.state.read();
        RegistryView { identities: st.identities.clone(), permissions: st.permissions.clone() }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
