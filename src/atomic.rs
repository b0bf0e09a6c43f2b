//! Atomic file replacement
//! -----------------------
//! Writes go to a dot-prefixed sibling, are fsynced, and are renamed into place so a
//! reader of the final path sees either the previous or the new full contents.
//! A failed write removes its temp file and leaves the target untouched.
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ConfError, ConfResult};

/// Sibling path used while staging `target`.
pub fn staging_path(target: &Path) -> PathBuf {
    let name = target.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    target.with_file_name(format!(".{}.staging-{}", name, uuid::Uuid::new_v4().simple()))
}

/// Write `bytes` to `path` and fsync the file.
pub fn write_synced(path: &Path, bytes: &[u8]) -> ConfResult<()> {
    let mut f = File::create(path).map_err(|e| ConfError::storage(format!("create {}", path.display()), e))?;
    f.write_all(bytes).map_err(|e| ConfError::storage(format!("write {}", path.display()), e))?;
    f.sync_all().map_err(|e| ConfError::storage(format!("sync {}", path.display()), e))?;
    Ok(())
}

/// Atomically replace `target` with `bytes`.
pub fn replace_file(target: &Path, bytes: &[u8]) -> ConfResult<()> {
    let dir = target.parent().ok_or_else(|| ConfError::storage("replace", "target has no parent directory"))?;
    std::fs::create_dir_all(dir).map_err(|e| ConfError::storage(format!("create {}", dir.display()), e))?;
    let staging = staging_path(target);
    if let Err(e) = write_synced(&staging, bytes) {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }
    if let Err(e) = std::fs::rename(&staging, target) {
        let _ = std::fs::remove_file(&staging);
        return Err(ConfError::storage(format!("rename {} -> {}", staging.display(), target.display()), e));
    }
    let _ = fsync_dir(dir);
    Ok(())
}

/// Best-effort directory flush so the rename itself is durable.
pub fn fsync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Remove a file, treating "already gone" as success.
pub fn remove_file_if_exists(path: &Path) -> ConfResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConfError::storage(format!("remove {}", path.display()), e)),
    }
}
