//! Unified error model for the registry, snapshot store and publisher.
//! Every core operation returns `ConfResult`; the HTTP layer maps variants to
//! status codes through `http_status` and to stable machine codes through `code_str`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfError {
    /// Malformed input, rejected before the registry is touched.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    /// An identity references a permission template that does not exist at generation time.
    #[error("identity '{identity}' references missing permission template '{template}'")]
    DanglingReference { identity: String, template: String },

    #[error("storage failure while {op}: {message}")]
    Storage { op: String, message: String },

    /// Broker reload notification failed after a committed publish.
    #[error("broker notification failed: {message}")]
    Notification { message: String },
}

impl ConfError {
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        ConfError::Validation { field: field.into(), message: message.into() }
    }
    pub fn not_found<K: Into<String>, N: Into<String>>(kind: K, name: N) -> Self {
        ConfError::NotFound { kind: kind.into(), name: name.into() }
    }
    pub fn already_exists<K: Into<String>, N: Into<String>>(kind: K, name: N) -> Self {
        ConfError::AlreadyExists { kind: kind.into(), name: name.into() }
    }
    pub fn dangling<I: Into<String>, T: Into<String>>(identity: I, template: T) -> Self {
        ConfError::DanglingReference { identity: identity.into(), template: template.into() }
    }
    pub fn storage<O: Into<String>, M: std::fmt::Display>(op: O, err: M) -> Self {
        ConfError::Storage { op: op.into(), message: err.to_string() }
    }
    pub fn notification<M: Into<String>>(message: M) -> Self {
        ConfError::Notification { message: message.into() }
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            ConfError::Validation { .. } => "validation_error",
            ConfError::NotFound { .. } => "not_found",
            ConfError::AlreadyExists { .. } => "already_exists",
            ConfError::DanglingReference { .. } => "dangling_reference",
            ConfError::Storage { .. } => "storage_failure",
            ConfError::Notification { .. } => "notification_failure",
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            ConfError::Validation { .. } => 400,
            ConfError::NotFound { .. } => 404,
            ConfError::AlreadyExists { .. } => 409,
            ConfError::DanglingReference { .. } => 422,
            ConfError::Storage { .. } => 503,
            ConfError::Notification { .. } => 502,
        }
    }
}

pub type ConfResult<T> = Result<T, ConfError>;
