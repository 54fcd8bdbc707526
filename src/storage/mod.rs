// src/storage/mod.rs

//! Object storage location and credential vending.
//!
//! The staging operator needs two things from object storage: a fully
//! qualified source URI for the current run, and short-lived credentials the
//! warehouse can use to read it. Both come from an [`ObjectStorageLocator`],
//! injected the same way as the warehouse gateway.
//!
//! - [`template`] renders run-dependent key templates.
//! - [`s3`] holds the environment-backed S3 locator used in production.

pub mod s3;
pub mod template;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::types::RunContext;

pub use s3::S3Locator;

/// Default credential TTL (1 hour).
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(3600);

/// Minimum credential TTL (1 minute).
pub const MIN_CREDENTIAL_TTL: Duration = Duration::from_secs(60);

/// Maximum credential TTL (1 hour).
pub const MAX_CREDENTIAL_TTL: Duration = Duration::from_secs(3600);

/// Clamps a TTL to the allowed range.
#[must_use]
pub fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.clamp(MIN_CREDENTIAL_TTL, MAX_CREDENTIAL_TTL)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("unknown placeholder '{{{0}}}' in source key template")]
    UnknownPlaceholder(String),

    #[error("no credentials configured for '{0}'")]
    MissingCredentials(String),

    #[error("credentials for '{id}' expired at {expired_at}")]
    CredentialsExpired { id: String, expired_at: DateTime<Utc> },

    #[error("object storage unreachable: {0}")]
    Unreachable(String),
}

/// Bucket + key of a staging source, possibly templated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceTemplate {
    pub bucket: String,
    pub key: String,
    /// Substitute run placeholders (`{year}`, `{month}`, ...) into `key`.
    #[serde(default)]
    pub render_key: bool,
}

/// A string that must never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret. Call sites should pass it straight into a statement.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Scoped, time-limited read credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key: SecretString,
    pub secret_key: SecretString,
    pub session_token: Option<SecretString>,
    pub expiry: DateTime<Utc>,
}

impl Credentials {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// Resolves staging sources and vends credentials for them.
pub trait ObjectStorageLocator: Send + Sync {
    /// Turn a source template into a fully qualified URI for this run.
    fn resolve(&self, source: &SourceTemplate, ctx: &RunContext) -> Result<String, StorageError>;

    /// Fetch credentials registered under `credential_id`.
    fn credentials(&self, credential_id: &str) -> Result<Credentials, StorageError>;
}
