// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a config file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file and validate it.
///
/// This is the entry point for the rest of the application. It checks:
///
/// - unknown or self `after` references,
/// - cycles, and that the graph has a single start and a single end task,
/// - operator settings that can be checked without a warehouse
///   (idempotent DDL, row-count rules naming a table, ...),
/// - global config sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_validates_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[task.begin]
kind = "barrier"

[task.end]
kind = "barrier"
after = ["begin"]
"#
        )
        .unwrap();

        let cfg = load_and_validate(file.path()).unwrap();
        assert_eq!(cfg.task.len(), 2);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_and_validate("/definitely/not/here/Loadgraph.toml").unwrap_err();
        assert!(matches!(err, crate::errors::LoadgraphError::IoError(_)));
    }
}
