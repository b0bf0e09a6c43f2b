//! Broker reload notification hooks.
//! A notifier runs after the live artifact has been swapped; its failure is reported
//! but never rolls the publish back.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{ConfError, ConfResult};

/// What was just made live.
#[derive(Debug, Clone, Copy)]
pub struct PublishEvent<'a> {
    pub name: &'a str,
    pub document_path: &'a Path,
}

pub trait Notifier: Send + Sync + Debug {
    fn notify(&self, event: &PublishEvent<'_>) -> ConfResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: &PublishEvent<'_>) -> ConfResult<()> { Ok(()) }
}

/// Runs an operator-provided publish script, e.g. one calling `nats-server --signal reload`.
///
/// The script receives the live document path as its only argument and the snapshot
/// name in `ACL_PROXY_SNAPSHOT`. A non-zero exit status is a notification failure.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: PathBuf,
}

impl CommandNotifier {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self { program: program.into() }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, event: &PublishEvent<'_>) -> ConfResult<()> {
        debug!(target: "acl_proxy::publish", "running publish script {} for '{}'", self.program.display(), event.name);
        let output = Command::new(&self.program)
            .arg(event.document_path)
            .env("ACL_PROXY_SNAPSHOT", event.name)
            .output()
            .map_err(|e| ConfError::notification(format!("spawn {}: {}", self.program.display(), e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConfError::notification(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
