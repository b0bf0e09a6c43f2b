//! Pluggable credential handling.
//!
//! The registry never interprets credentials; it only runs them through a
//! `CredentialPolicy` at upsert time. The default keeps the credential as
//! supplied, which is what the broker reads as a cleartext password.
//! `BcryptOnly` accepts only pre-hashed bcrypt strings, which NATS verifies natively.

use std::fmt::Debug;

use crate::error::{ConfError, ConfResult};

pub trait CredentialPolicy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Check and transform a raw credential into what gets stored and rendered.
    fn prepare(&self, identity: &str, raw: &str) -> ConfResult<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Plaintext;

impl CredentialPolicy for Plaintext {
    fn name(&self) -> &'static str { "plaintext" }

    fn prepare(&self, _identity: &str, raw: &str) -> ConfResult<String> {
        if raw.is_empty() {
            return Err(ConfError::validation("password", "must not be empty"));
        }
        Ok(raw.to_string())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BcryptOnly;

impl BcryptOnly {
    const PREFIXES: [&'static str; 3] = ["$2a$", "$2b$", "$2y$"];

    fn looks_like_bcrypt(raw: &str) -> bool {
        // $2b$<cost:2>$<salt+hash:53>
        raw.len() == 60
            && Self::PREFIXES.iter().any(|p| raw.starts_with(p))
            && raw.as_bytes()[4..6].iter().all(u8::is_ascii_digit)
            && raw.as_bytes()[6] == b'$'
    }
}

impl CredentialPolicy for BcryptOnly {
    fn name(&self) -> &'static str { "bcrypt" }

    fn prepare(&self, identity: &str, raw: &str) -> ConfResult<String> {
        if !Self::looks_like_bcrypt(raw) {
            return Err(ConfError::validation(
                "password",
                format!("credential for '{}' must be a bcrypt hash", identity),
            ));
        }
        Ok(raw.to_string())
    }
}

/// Resolve a policy by its configuration name.
pub fn policy_by_name(name: &str) -> Option<Box<dyn CredentialPolicy>> {
    match name {
        "plaintext" => Some(Box::new(Plaintext)),
        "bcrypt" => Some(Box::new(BcryptOnly)),
        _ => None,
    }
}
