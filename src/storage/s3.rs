// src/storage/s3.rs

//! S3-style locator with credentials taken from the process environment.
//!
//! A credential id such as `aws_credentials` maps to the variables
//! `AWS_CREDENTIALS_ACCESS_KEY_ID`, `AWS_CREDENTIALS_SECRET_ACCESS_KEY` and
//! (optionally) `AWS_CREDENTIALS_SESSION_TOKEN`.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use super::{
    clamp_ttl, template, Credentials, ObjectStorageLocator, SecretString, SourceTemplate,
    StorageError, DEFAULT_CREDENTIAL_TTL,
};
use crate::types::RunContext;

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct S3Locator {
    ttl: Duration,
    lookup: Lookup,
}

impl fmt::Debug for S3Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Locator")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Default for S3Locator {
    fn default() -> Self {
        Self::from_env()
    }
}

impl S3Locator {
    /// Locator reading credentials from `std::env`.
    pub fn from_env() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Locator reading credentials through an arbitrary lookup function.
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            ttl: DEFAULT_CREDENTIAL_TTL,
            lookup: Box::new(lookup),
        }
    }

    /// Override the credential TTL; clamped to [1 minute, 1 hour].
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = clamp_ttl(ttl);
        self
    }

    fn var(&self, credential_id: &str, suffix: &str) -> Option<String> {
        (self.lookup)(&env_key(credential_id, suffix)).filter(|v| !v.is_empty())
    }
}

impl ObjectStorageLocator for S3Locator {
    fn resolve(&self, source: &SourceTemplate, ctx: &RunContext) -> Result<String, StorageError> {
        let key = if source.render_key {
            template::render(&source.key, ctx)?
        } else {
            source.key.clone()
        };
        let uri = format!(
            "s3://{}/{}",
            source.bucket.trim_end_matches('/'),
            key.trim_start_matches('/')
        );
        debug!(%uri, "resolved staging source");
        Ok(uri)
    }

    fn credentials(&self, credential_id: &str) -> Result<Credentials, StorageError> {
        let missing = || StorageError::MissingCredentials(credential_id.to_string());

        let access_key = self.var(credential_id, "ACCESS_KEY_ID").ok_or_else(missing)?;
        let secret_key = self.var(credential_id, "SECRET_ACCESS_KEY").ok_or_else(missing)?;
        let session_token = self.var(credential_id, "SESSION_TOKEN");

        // `ttl` is clamped to at most an hour, well inside `TimeDelta`'s range.
        let ttl = chrono::Duration::seconds(self.ttl.as_secs() as i64);

        Ok(Credentials {
            access_key: SecretString::new(access_key),
            secret_key: SecretString::new(secret_key),
            session_token: session_token.map(SecretString::new),
            expiry: Utc::now() + ttl,
        })
    }
}

/// `aws_credentials` + `ACCESS_KEY_ID` -> `AWS_CREDENTIALS_ACCESS_KEY_ID`.
fn env_key(credential_id: &str, suffix: &str) -> String {
    let prefix: String = credential_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{prefix}_{suffix}")
}
