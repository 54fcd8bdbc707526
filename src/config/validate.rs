// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, Reversed};
use petgraph::{Incoming, Outgoing};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{LoadgraphError, Result};
use crate::operators::Operator;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = LoadgraphError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_operators(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(LoadgraphError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

/// Upper bound for `deadline` and `retry_delay`.
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn ensure_within_max(what: &str, d: Duration) -> Result<()> {
    if d > MAX_DURATION {
        return Err(LoadgraphError::ConfigError(format!(
            "{what} must be at most {}h (got {d:?})",
            MAX_DURATION.as_secs() / 3600
        )));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.parallelism == 0 {
        return Err(LoadgraphError::ConfigError(
            "[config].parallelism must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.deadline.is_some_and(|d| d.is_zero()) {
        return Err(LoadgraphError::ConfigError(
            "[config].deadline must be greater than zero".to_string(),
        ));
    }
    if let Some(deadline) = cfg.config.deadline {
        ensure_within_max("[config].deadline", deadline)?;
    }
    ensure_within_max("[default].retry_delay", cfg.default.retry_delay)?;
    for (name, task) in cfg.task.iter() {
        if let Some(delay) = task.retry_delay {
            ensure_within_max(&format!("task '{name}' retry_delay"), delay)?;
        }
    }
    if cfg.warehouse.pool_size == 0 {
        return Err(LoadgraphError::ConfigError(
            "[warehouse].pool_size must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(LoadgraphError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(LoadgraphError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

/// Operator-specific checks that would otherwise only surface mid-run.
fn validate_operators(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        match &task.operator {
            Operator::CreateTable(spec) => {
                if !spec.is_idempotent() {
                    return Err(LoadgraphError::ConfigError(format!(
                        "task '{name}': create statement must use CREATE TABLE IF NOT EXISTS"
                    )));
                }
            }
            Operator::Stage(spec) => {
                if spec.target_table.trim().is_empty() {
                    return Err(LoadgraphError::ConfigError(format!(
                        "task '{name}': stage requires a target_table"
                    )));
                }
                if spec.credentials_id.trim().is_empty() {
                    return Err(LoadgraphError::ConfigError(format!(
                        "task '{name}': stage requires a credentials_id"
                    )));
                }
            }
            Operator::LoadFact(spec) | Operator::LoadDimension(spec) => {
                if spec.target_columns.is_empty() {
                    return Err(LoadgraphError::ConfigError(format!(
                        "task '{name}': target_columns must not be empty"
                    )));
                }
            }
            Operator::QualityCheck(rules) => {
                let missing_table = rules
                    .row_count
                    .iter()
                    .flatten()
                    .any(|r| r.table.as_deref().is_none_or(|t| t.trim().is_empty()));
                if missing_table {
                    return Err(LoadgraphError::ConfigError(format!(
                        "task '{name}': every row_count rule needs a table"
                    )));
                }
            }
            Operator::Barrier => {}
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    if let Err(cycle) = toposort(&graph, None) {
        return Err(LoadgraphError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        )));
    }

    let starts: Vec<&str> = graph
        .nodes()
        .filter(|n| graph.neighbors_directed(*n, Incoming).next().is_none())
        .collect();
    let ends: Vec<&str> = graph
        .nodes()
        .filter(|n| graph.neighbors_directed(*n, Outgoing).next().is_none())
        .collect();

    let [start] = starts.as_slice() else {
        return Err(LoadgraphError::ConfigError(format!(
            "graph must have exactly one start task (no `after`), found {}: {:?}",
            starts.len(),
            starts
        )));
    };
    let [end] = ends.as_slice() else {
        return Err(LoadgraphError::ConfigError(format!(
            "graph must have exactly one end task (no dependents), found {}: {:?}",
            ends.len(),
            ends
        )));
    };

    let mut from_start = HashSet::new();
    let mut dfs = Dfs::new(&graph, *start);
    while let Some(n) = dfs.next(&graph) {
        from_start.insert(n);
    }

    let reversed = Reversed(&graph);
    let mut to_end = HashSet::new();
    let mut dfs = Dfs::new(reversed, *end);
    while let Some(n) = dfs.next(reversed) {
        to_end.insert(n);
    }

    for name in cfg.task.keys() {
        let name = name.as_str();
        if !from_start.contains(name) || !to_end.contains(name) {
            return Err(LoadgraphError::ConfigError(format!(
                "task '{name}' is not on a path from '{start}' to '{end}'"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn diamond_is_valid() {
        let cfg = parse(
            r#"
[task.a]
kind = "barrier"
[task.b]
kind = "barrier"
after = ["a"]
[task.c]
kind = "barrier"
after = ["a"]
[task.d]
kind = "barrier"
after = ["b", "c"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.task.len(), 4);
    }

    #[test]
    fn cycle_is_rejected() {
        let err = parse(
            r#"
[task.a]
kind = "barrier"
[task.b]
kind = "barrier"
after = ["a", "c"]
[task.c]
kind = "barrier"
after = ["b"]
[task.d]
kind = "barrier"
after = ["c"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, LoadgraphError::DagCycle(_)));
    }

    #[test]
    fn two_start_tasks_are_rejected() {
        let err = parse(
            r#"
[task.a]
kind = "barrier"
[task.b]
kind = "barrier"
[task.c]
kind = "barrier"
after = ["a", "b"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one start task"));
    }

    #[test]
    fn two_end_tasks_are_rejected() {
        let err = parse(
            r#"
[task.a]
kind = "barrier"
[task.b]
kind = "barrier"
after = ["a"]
[task.c]
kind = "barrier"
after = ["a"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one end task"));
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let err = parse(
            r#"
[default]
retries = 1
retry_delay = "18446744073709551615s"

[task.a]
kind = "barrier"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("[default].retry_delay must be at most"));

        let err = parse(
            r#"
[task.a]
kind = "barrier"
retry_delay = "200h"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("task 'a' retry_delay"));

        let err = parse(
            r#"
[config]
deadline = "169h"

[task.a]
kind = "barrier"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("[config].deadline"));

        assert!(parse(
            r#"
[config]
deadline = "168h"

[task.a]
kind = "barrier"
"#,
        )
        .is_ok());
    }

    #[test]
    fn unknown_and_self_dependencies_are_rejected() {
        let err = parse(
            r#"
[task.a]
kind = "barrier"
after = ["ghost"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown dependency 'ghost'"));

        let err = parse(
            r#"
[task.a]
kind = "barrier"
after = ["a"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot depend on itself"));
    }

    #[test]
    fn create_without_if_not_exists_is_rejected() {
        let err = parse(
            r#"
[task.create]
kind = "create_table"
table = "users"
sql = "CREATE TABLE users (id INT)"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("IF NOT EXISTS"));
    }

    #[test]
    fn row_count_rule_without_table_is_rejected() {
        let err = parse(
            r#"
[task.check]
kind = "quality_check"
row_count = [{ min = 1 }]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("row_count rule needs a table"));
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let err = parse(
            r#"
[config]
parallelism = 0

[task.a]
kind = "barrier"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("parallelism"));
    }

    #[test]
    fn empty_config_is_rejected() {
        assert!(parse("").is_err());
    }
}
