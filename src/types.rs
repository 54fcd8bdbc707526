// src/types.rs

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Logical time window of a run, supplied by whoever schedules the run.
///
/// Only the date matters for template rendering; the core never reads the
/// wall clock to decide which partition to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunContext {
    pub logical_date: NaiveDate,
}

impl RunContext {
    pub fn new(logical_date: NaiveDate) -> Self {
        Self { logical_date }
    }

    /// Convenience constructor for the first day of a month.
    pub fn for_month(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self::new)
    }

    pub fn year(&self) -> i32 {
        self.logical_date.year()
    }

    pub fn month(&self) -> u32 {
        self.logical_date.month()
    }

    /// `YYYY-MM-DD` form of the logical date.
    pub fn ds(&self) -> String {
        self.logical_date.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ds())
    }
}

/// Parse a short duration string such as `"30s"`, `"5m"` or `"2h"`.
///
/// Supported units: `ms`, `s`, `m`, `h`.
pub fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    use std::time::Duration;

    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ))
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn run_context_exposes_year_month_and_ds() {
        let ctx = RunContext::for_month(2018, 11).unwrap();
        assert_eq!(ctx.year(), 2018);
        assert_eq!(ctx.month(), 11);
        assert_eq!(ctx.ds(), "2018-11-01");
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration(" 2h "), Ok(Duration::from_secs(7200)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("3d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_duration_rejects_overflowing_values() {
        let err = parse_duration("6000000000000000h").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_duration("99999999999999999999s").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Ok(Duration::from_secs(u64::MAX))
        );
    }
}
