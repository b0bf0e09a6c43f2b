//!
//! acl-proxy config generator
//! --------------------------
//! Pure, deterministic transform from a `RegistryView` to the broker's authorization
//! document. Users are ordered by name and accounts live in a `BTreeMap`, so the
//! same registry state always serializes to the same bytes no matter the order in
//! which it was built.
//!
//! Document shapes:
//! - no identity has an account: `{"users": [...]}`
//! - otherwise: `{"users": [<global identities>], "accounts": {"<name>": {"users": [...]}}}`
//!
//! The JSON is meant to be pulled in with `include "auth.json"`, either inside an
//! `authorization {}` block (flat) or at top level, referenced as `$users` / `$accounts`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfError, ConfResult};
use crate::model::{Identity, PermissionTemplate, SubjectRules};
use crate::registry::RegistryView;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDocument {
    /// Flat user list, or the global-scope users when accounts are present.
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<BTreeMap<String, AccountRecord>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionsBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<SubjectRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<SubjectRules>,
}

impl AuthorizationDocument {
    /// Canonical serialization: pretty JSON with a trailing newline.
    pub fn render(&self) -> ConfResult<Vec<u8>> {
        let mut out = serde_json::to_vec_pretty(self).map_err(|e| ConfError::storage("encode document", e))?;
        out.push(b'\n');
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> ConfResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ConfError::storage("decode document", e))
    }

    /// Every user in the document, global first, then accounts in name order.
    pub fn all_users(&self) -> impl Iterator<Item = &UserRecord> {
        self.users
            .iter()
            .chain(self.accounts.iter().flat_map(|m| m.values()).flat_map(|a| a.users.iter()))
    }
}

/// Identities grouped by account. `None` is the global scope.
pub fn group_by_account(identities: &BTreeMap<String, Identity>) -> BTreeMap<Option<&str>, Vec<&Identity>> {
    let mut groups: BTreeMap<Option<&str>, Vec<&Identity>> = BTreeMap::new();
    for ident in identities.values() {
        groups.entry(ident.account()).or_default().push(ident);
    }
    groups
}

fn permissions_block(t: &PermissionTemplate) -> Option<PermissionsBlock> {
    let publish = (!t.publish.is_unrestricted()).then(|| t.publish.clone());
    let subscribe = (!t.subscribe.is_unrestricted()).then(|| t.subscribe.clone());
    if publish.is_none() && subscribe.is_none() {
        return None;
    }
    Some(PermissionsBlock { publish, subscribe })
}

fn render_user(ident: &Identity, view: &RegistryView) -> ConfResult<UserRecord> {
    let permissions = match ident.permission() {
        None => None,
        Some(tname) => {
            let t = view.permissions.get(tname).ok_or_else(|| ConfError::dangling(&ident.name, tname))?;
            permissions_block(t)
        }
    };
    Ok(UserRecord { username: ident.name.clone(), password: ident.credential.clone(), permissions })
}

/// Build the authorization document. Fails with `DanglingReference` on the first
/// identity (in name order) whose template is missing; no partial document is returned.
pub fn generate(view: &RegistryView) -> ConfResult<AuthorizationDocument> {
    for ident in view.identities.values() {
        if let Some(tname) = ident.permission() {
            if !view.permissions.contains_key(tname) {
                return Err(ConfError::dangling(&ident.name, tname));
            }
        }
    }
    let groups = group_by_account(&view.identities);
    let mut users: Vec<UserRecord> = Vec::new();
    let mut accounts: BTreeMap<String, AccountRecord> = BTreeMap::new();
    for (account, members) in groups {
        let rendered = members.into_iter().map(|i| render_user(i, view)).collect::<ConfResult<Vec<_>>>()?;
        match account {
            None => users = rendered,
            Some(name) => {
                accounts.insert(name.to_string(), AccountRecord { users: rendered });
            }
        }
    }
    let accounts = if accounts.is_empty() { None } else { Some(accounts) };
    Ok(AuthorizationDocument { users, accounts })
}

/// `generate` followed by `render`.
pub fn generate_bytes(view: &RegistryView) -> ConfResult<Vec<u8>> {
    generate(view)?.render()
}

#[cfg(test)]
#[path = "generator_tests.rs"]
mod generator_tests;
