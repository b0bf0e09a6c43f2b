//!
//! acl-proxy data model
//! --------------------
//! Identities and permission templates are the only stored entities. Accounts are
//! derived from `Identity::account_ref` at generation time and never stored on their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named principal with a credential and optional template/account references.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    /// Opaque secret material, already passed through the configured credential policy.
    pub credential: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_ref: Option<String>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("name", &self.name)
            .field("credential", &"<redacted>")
            .field("permission_ref", &self.permission_ref)
            .field("account_ref", &self.account_ref)
            .finish()
    }
}

impl Identity {
    /// The account this identity belongs to, or `None` for the global scope.
    /// An empty reference is treated the same as an absent one.
    pub fn account(&self) -> Option<&str> {
        self.account_ref.as_deref().filter(|a| !a.is_empty())
    }

    pub fn permission(&self) -> Option<&str> {
        self.permission_ref.as_deref().filter(|p| !p.is_empty())
    }
}

/// Allow/deny subject pattern sets for one direction (publish or subscribe).
/// An empty set means unrestricted on that axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRules {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
}

impl SubjectRules {
    pub fn is_unrestricted(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTemplate {
    pub name: String,
    #[serde(default)]
    pub publish: SubjectRules,
    #[serde(default)]
    pub subscribe: SubjectRules,
}

/// Metadata persisted next to every snapshot document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a snapshot as seen by the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotState {
    /// Exists in the snapshot store but has never been live.
    Created,
    /// Target of the publish pointer.
    Live,
    /// Was live once; another snapshot has been published since.
    Superseded,
}
