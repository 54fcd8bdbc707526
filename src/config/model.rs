// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::dag::RetryPolicy;
use crate::operators::Operator;
use crate::types::parse_duration;

/// Configuration exactly as read from TOML, before semantic validation.
///
/// ```toml
/// [config]
/// parallelism = 4
/// deadline = "2h"
///
/// [default]
/// retries = 1
/// retry_delay = "5m"
///
/// [warehouse]
/// connection_env = "LOADGRAPH_WAREHOUSE"
///
/// [storage]
/// credential_ttl = "30m"
///
/// [task.begin]
/// kind = "barrier"
///
/// [task.create_users]
/// kind = "create_table"
/// after = ["begin"]
/// table = "users"
/// sql = "CREATE TABLE IF NOT EXISTS users (userid INT NOT NULL)"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub default: DefaultSection,

    #[serde(default)]
    pub warehouse: WarehouseSection,

    #[serde(default)]
    pub storage: StorageSection,

    /// Keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated pipeline definition.
///
/// Only obtainable through `ConfigFile::try_from(raw)`, so holding one means
/// the graph is acyclic with a single start and end task.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub default: DefaultSection,
    pub warehouse: WarehouseSection,
    pub storage: StorageSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            default: raw.default,
            warehouse: raw.warehouse,
            storage: raw.storage,
            task: raw.task,
        }
    }

    /// Retry policy of `task` after applying `[default]`.
    pub fn retry_policy(&self, task: &str) -> RetryPolicy {
        let tc = self.task.get(task);
        RetryPolicy {
            max_retries: tc
                .and_then(|t| t.retries)
                .unwrap_or(self.default.retries),
            delay: tc
                .and_then(|t| t.retry_delay)
                .unwrap_or(self.default.retry_delay),
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Upper bound on concurrently running operators.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Cancel the run once this much time has passed.
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub deadline: Option<Duration>,
}

fn default_parallelism() -> usize {
    4
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            deadline: None,
        }
    }
}

/// `[default]` section: retry policy applied to tasks that do not set one.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultSection {
    #[serde(default)]
    pub retries: u32,

    #[serde(default = "default_retry_delay", deserialize_with = "deserialize_duration")]
    pub retry_delay: Duration,
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(300)
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_delay: default_retry_delay(),
        }
    }
}

/// `[warehouse]` section.
///
/// The connection string is either inline or read from an environment
/// variable, so passwords can stay out of the file.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseSection {
    #[serde(default)]
    pub connection: Option<String>,

    #[serde(default)]
    pub connection_env: Option<String>,

    /// Idle connections kept for reuse.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    4
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            connection: None,
            connection_env: None,
            pool_size: default_pool_size(),
        }
    }
}

impl WarehouseSection {
    /// Resolve the connection string, preferring the inline value.
    pub fn connection_string(&self) -> Option<String> {
        self.connection.clone().or_else(|| {
            self.connection_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|s| !s.is_empty())
        })
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Lifetime of vended object-storage credentials; clamped to
    /// [1 minute, 1 hour] by the locator.
    #[serde(default = "default_credential_ttl", deserialize_with = "deserialize_duration")]
    pub credential_ttl: Duration,
}

fn default_credential_ttl() -> Duration {
    crate::storage::DEFAULT_CREDENTIAL_TTL
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            credential_ttl: default_credential_ttl(),
        }
    }
}

/// `[task.<name>]` section.
///
/// The operator payload is flattened in: `kind` selects the variant and the
/// remaining keys are that variant's fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskConfig {
    /// Upstream tasks; this task waits for all of them to succeed.
    #[serde(default)]
    pub after: Vec<String>,

    /// Overrides `[default].retries`.
    #[serde(default)]
    pub retries: Option<u32>,

    /// Overrides `[default].retry_delay`.
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub retry_delay: Option<Duration>,

    #[serde(flatten)]
    pub operator: Operator,
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    s.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}
