use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use loadgraph::storage::template;
use loadgraph::storage::{
    Credentials, ObjectStorageLocator, SecretString, SourceTemplate, StorageError,
};
use loadgraph::types::RunContext;

/// Locator with a fixed set of credentials and no environment access.
#[derive(Debug, Clone, Default)]
pub struct StaticLocator {
    credentials: HashMap<String, Credentials>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register credentials valid for the next hour.
    pub fn with_credentials(self, id: &str, access_key: &str, secret_key: &str) -> Self {
        self.with_expiry(id, access_key, secret_key, Utc::now() + Duration::hours(1))
    }

    /// Register credentials with an explicit expiry (possibly in the past).
    pub fn with_expiry(
        mut self,
        id: &str,
        access_key: &str,
        secret_key: &str,
        expiry: DateTime<Utc>,
    ) -> Self {
        self.credentials.insert(
            id.to_string(),
            Credentials {
                access_key: SecretString::new(access_key),
                secret_key: SecretString::new(secret_key),
                session_token: None,
                expiry,
            },
        );
        self
    }
}

impl ObjectStorageLocator for StaticLocator {
    fn resolve(&self, source: &SourceTemplate, ctx: &RunContext) -> Result<String, StorageError> {
        let key = if source.render_key {
            template::render(&source.key, ctx)?
        } else {
            source.key.clone()
        };
        Ok(format!("s3://{}/{}", source.bucket, key))
    }

    fn credentials(&self, credential_id: &str) -> Result<Credentials, StorageError> {
        self.credentials
            .get(credential_id)
            .cloned()
            .ok_or_else(|| StorageError::MissingCredentials(credential_id.to_string()))
    }
}
