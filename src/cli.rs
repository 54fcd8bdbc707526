// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};

use crate::types::parse_duration;

/// Command-line arguments for `loadgraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "loadgraph",
    version,
    about = "Run a warehouse load pipeline described as a task DAG.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Loadgraph.toml")]
    pub config: PathBuf,

    /// Logical date of the run (YYYY-MM-DD); selects source partitions.
    ///
    /// Defaults to today's date in UTC.
    #[arg(long, value_name = "DATE")]
    pub logical_date: Option<NaiveDate>,

    /// Override `[config].parallelism`.
    #[arg(long, value_name = "N")]
    pub parallelism: Option<usize>,

    /// Override `[config].deadline` (e.g. "90m", "2h").
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub deadline: Option<Duration>,

    /// Write the run report as JSON to this path.
    #[arg(long, value_name = "PATH")]
    pub report_json: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `LOADGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the execution order, but don't connect anywhere.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["loadgraph"]).unwrap();
        assert_eq!(args.config, PathBuf::from("Loadgraph.toml"));
        assert!(args.logical_date.is_none());
        assert!(args.deadline.is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn parses_overrides() {
        let args = CliArgs::try_parse_from([
            "loadgraph",
            "--config",
            "demos/sparkify.toml",
            "--logical-date",
            "2018-11-01",
            "--parallelism",
            "2",
            "--deadline",
            "90m",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.logical_date, NaiveDate::from_ymd_opt(2018, 11, 1));
        assert_eq!(args.parallelism, Some(2));
        assert_eq!(args.deadline, Some(Duration::from_secs(90 * 60)));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }

    #[test]
    fn rejects_bad_date() {
        assert!(CliArgs::try_parse_from(["loadgraph", "--logical-date", "2018-13-01"]).is_err());
    }
}
