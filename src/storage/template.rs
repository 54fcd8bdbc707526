// src/storage/template.rs

//! Rendering of `{placeholder}` templates from a [`RunContext`].

use std::sync::LazyLock;

use regex::Regex;

use super::StorageError;
use crate::types::RunContext;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.]*)\}").expect("placeholder regex is valid")
});

/// Substitute run placeholders into `template`.
///
/// Recognised placeholders:
/// - `{year}` / `{execution_date.year}`: four-digit year
/// - `{month}` / `{execution_date.month}`: month without zero padding
/// - `{ds}`: `YYYY-MM-DD`
///
/// Anything else in braces is rejected instead of being passed through, so a
/// typo cannot silently point the load at a non-existent prefix.
pub fn render(template: &str, ctx: &RunContext) -> Result<String, StorageError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        out.push_str(&lookup(name.as_str(), ctx)?);
        last = whole.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

fn lookup(name: &str, ctx: &RunContext) -> Result<String, StorageError> {
    match name {
        "year" | "execution_date.year" => Ok(ctx.year().to_string()),
        "month" | "execution_date.month" => Ok(ctx.month().to_string()),
        "ds" => Ok(ctx.ds()),
        other => Err(StorageError::UnknownPlaceholder(other.to_string())),
    }
}
