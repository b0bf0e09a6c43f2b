use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::atomic::{remove_file_if_exists, replace_file};
use crate::error::{ConfError, ConfResult};
use crate::model::{Identity, PermissionTemplate};
use crate::paths;

/// Durable one-file-per-entity mirror of the registry under `resources/`.
pub(super) struct ResourceMirror {
    users: PathBuf,
    permissions: PathBuf,
}

impl ResourceMirror {
    pub(super) fn open(data_root: &Path) -> ConfResult<Self> {
        let users = paths::users_dir(data_root);
        let permissions = paths::permissions_dir(data_root);
        for dir in [&users, &permissions] {
            std::fs::create_dir_all(dir).map_err(|e| ConfError::storage(format!("create {}", dir.display()), e))?;
        }
        Ok(Self { users, permissions })
    }

    pub(super) fn load(
        &self,
    ) -> ConfResult<(BTreeMap<String, Identity>, BTreeMap<String, PermissionTemplate>)> {
        let identities = load_dir::<Identity>(&self.users, |i| &i.name)?;
        let permissions = load_dir::<PermissionTemplate>(&self.permissions, |p| &p.name)?;
        Ok((identities, permissions))
    }

    pub(super) fn write_identity(&self, ident: &Identity) -> ConfResult<()> {
        write_json(&self.users.join(file_name(&ident.name)), ident)
    }

    pub(super) fn write_permission(&self, template: &PermissionTemplate) -> ConfResult<()> {
        write_json(&self.permissions.join(file_name(&template.name)), template)
    }

    pub(super) fn remove_identity(&self, name: &str) -> ConfResult<()> {
        remove_file_if_exists(&self.users.join(file_name(name)))
    }

    pub(super) fn remove_permission(&self, name: &str) -> ConfResult<()> {
        remove_file_if_exists(&self.permissions.join(file_name(name)))
    }
}

fn file_name(name: &str) -> String { format!("{}.json", name) }

fn write_json<T: Serialize>(path: &Path, value: &T) -> ConfResult<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| ConfError::storage("encode resource", e))?;
    replace_file(path, &bytes)
}

fn load_dir<T: DeserializeOwned>(dir: &Path, key: impl Fn(&T) -> &String) -> ConfResult<BTreeMap<String, T>> {
    let mut out = BTreeMap::new();
    let rd = std::fs::read_dir(dir).map_err(|e| ConfError::storage(format!("read {}", dir.display()), e))?;
    for entry in rd {
        let p = entry.map_err(|e| ConfError::storage(format!("read {}", dir.display()), e))?.path();
        let Some(fname) = p.file_name().and_then(|s| s.to_str()) else { continue };
        // Staging leftovers from an interrupted write
        if fname.starts_with('.') {
            warn!(target: "acl_proxy::registry", "removing stale staging file {}", p.display());
            let _ = std::fs::remove_file(&p);
            continue;
        }
        let Some(stem) = fname.strip_suffix(".json") else { continue };
        let bytes = std::fs::read(&p).map_err(|e| ConfError::storage(format!("read {}", p.display()), e))?;
        let value: T = serde_json::from_slice(&bytes)
            .map_err(|e| ConfError::storage(format!("decode {}", p.display()), e))?;
        if key(&value) != stem {
            return Err(ConfError::storage(
                format!("load {}", p.display()),
                format!("file name does not match stored name '{}'", key(&value)),
            ));
        }
        out.insert(stem.to_string(), value);
    }
    Ok(out)
}
