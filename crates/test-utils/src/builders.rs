#![allow(dead_code)]

use std::time::Duration;

use loadgraph::config::{ConfigFile, RawConfigFile, TaskConfig};
use loadgraph::errors::Result;
use loadgraph::operators::{
    CreateTableSpec, DataFormat, LoadSpec, Operator, StagingSpec,
};
use loadgraph::quality::QualityRules;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.config.config.parallelism = parallelism;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.config.config.deadline = Some(deadline);
        self
    }

    pub fn with_default_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.config.default.retries = retries;
        self.config.default.retry_delay = delay;
        self
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`, one constructor per operator kind.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(operator: Operator) -> Self {
        Self {
            task: TaskConfig {
                after: vec![],
                retries: None,
                retry_delay: None,
                operator,
            },
        }
    }

    pub fn barrier() -> Self {
        Self::new(Operator::Barrier)
    }

    /// `CREATE TABLE IF NOT EXISTS <table> (id INT)`.
    pub fn create_table(table: &str) -> Self {
        Self::new(Operator::CreateTable(CreateTableSpec {
            table: table.to_string(),
            sql: format!("CREATE TABLE IF NOT EXISTS {table} (id INT)"),
        }))
    }

    /// JSON staging from `s3://<bucket>/<key>` with credentials id `aws`.
    pub fn stage(table: &str, bucket: &str, key: &str) -> Self {
        Self::new(Operator::Stage(StagingSpec {
            bucket: bucket.to_string(),
            key: key.to_string(),
            render_key: key.contains('{'),
            format: DataFormat::Json,
            format_mode: None,
            region: "us-west-2".to_string(),
            target_table: table.to_string(),
            credentials_id: "aws".to_string(),
            truncate: true,
        }))
    }

    pub fn load_fact(table: &str, columns: &[&str], transform_sql: &str, truncate: bool) -> Self {
        Self::new(Operator::LoadFact(load_spec(table, columns, transform_sql, truncate)))
    }

    pub fn load_dimension(
        table: &str,
        columns: &[&str],
        transform_sql: &str,
        truncate: bool,
    ) -> Self {
        Self::new(Operator::LoadDimension(load_spec(table, columns, transform_sql, truncate)))
    }

    pub fn quality_check(rules: QualityRules) -> Self {
        Self::new(Operator::QualityCheck(rules))
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.task.retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.task.retry_delay = Some(delay);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

fn load_spec(table: &str, columns: &[&str], transform_sql: &str, truncate: bool) -> LoadSpec {
    LoadSpec {
        target_table: table.to_string(),
        target_columns: columns.iter().map(|c| c.to_string()).collect(),
        transform_sql: transform_sql.to_string(),
        truncate,
    }
}
