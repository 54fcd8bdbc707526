// src/warehouse/mock.rs

//! In-memory warehouse used by tests.
//!
//! It understands just enough SQL to exercise the operators:
//! `CREATE TABLE [IF NOT EXISTS]`, `TRUNCATE [TABLE]`, `COPY`, `INSERT INTO`
//! and `SELECT COUNT(*) FROM t [WHERE c IS NULL OR ...]`. Anything else is
//! accepted and ignored. A batch passed to `execute` is applied atomically: if
//! any statement in it fails, none of its effects are kept.
//!
//! `COPY` and `INSERT` append as many synthetic rows as configured with
//! [`MockWarehouse::set_copy_rows`] / [`MockWarehouse::set_insert_rows`]
//! (zero by default). Columns missing from a row count as populated.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use regex::Regex;

use super::{GatewayError, Row, Value, WarehouseGateway};

static CREATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?([\w.]+)").expect("valid regex")
});
static TRUNCATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^TRUNCATE\s+(?:TABLE\s+)?([\w.]+)").expect("valid regex"));
static COPY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^COPY\s+([\w.]+)").expect("valid regex"));
static INSERT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^INSERT\s+INTO\s+([\w.]+)").expect("valid regex"));
static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^SELECT\s+COUNT\(\*\)\s+FROM\s+([\w.]+)(?:\s+WHERE\s+(.*?))?\s*;?\s*$")
        .expect("valid regex")
});
static IS_NULL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\w+)\s+IS\s+NULL").expect("valid regex"));

/// One call received by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Execute(String),
    Query(String),
}

impl GatewayCall {
    pub fn sql(&self) -> &str {
        match self {
            GatewayCall::Execute(s) | GatewayCall::Query(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MockTable {
    rows: Vec<HashMap<String, Value>>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    pattern: String,
    error: GatewayError,
    /// `None` fails forever; `Some(n)` fails the next `n` matching calls.
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct MockState {
    tables: HashMap<String, MockTable>,
    copy_rows: HashMap<String, usize>,
    insert_rows: HashMap<String, usize>,
    failures: Vec<FailureRule>,
    responses: Vec<(String, Vec<Row>)>,
    calls: Vec<GatewayCall>,
}

impl MockState {
    fn injected_failure(&mut self, sql: &str) -> Option<GatewayError> {
        let rule = self
            .failures
            .iter_mut()
            .find(|r| r.remaining != Some(0) && sql.contains(&r.pattern))?;
        if let Some(n) = rule.remaining.as_mut() {
            *n -= 1;
        }
        Some(rule.error.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockWarehouse {
    state: Arc<Mutex<MockState>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table (no-op if it already exists).
    pub fn create_table(&self, table: &str) {
        let mut state = self.state.lock().unwrap();
        state.tables.entry(normalize(table)).or_default();
    }

    /// Append explicit rows to `table`, creating it if needed.
    pub fn seed_rows(&self, table: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        let mut state = self.state.lock().unwrap();
        let t = state.tables.entry(normalize(table)).or_default();
        for row in rows {
            let map = columns
                .iter()
                .map(|c| c.to_lowercase())
                .zip(row)
                .collect::<HashMap<_, _>>();
            t.rows.push(map);
        }
    }

    /// Append `n` rows with no explicit column values.
    pub fn seed_synthetic_rows(&self, table: &str, n: usize) {
        let mut state = self.state.lock().unwrap();
        let t = state.tables.entry(normalize(table)).or_default();
        t.rows.extend(std::iter::repeat_with(HashMap::new).take(n));
    }

    /// Rows appended to `table` by each `COPY` into it.
    pub fn set_copy_rows(&self, table: &str, n: usize) {
        self.state.lock().unwrap().copy_rows.insert(normalize(table), n);
    }

    /// Rows appended to `table` by each `INSERT INTO` it.
    pub fn set_insert_rows(&self, table: &str, n: usize) {
        self.state.lock().unwrap().insert_rows.insert(normalize(table), n);
    }

    /// Fail calls whose SQL contains `pattern`.
    ///
    /// `times = None` fails every matching call; `Some(n)` only the next `n`.
    pub fn fail_when(&self, pattern: &str, error: GatewayError, times: Option<usize>) {
        self.state.lock().unwrap().failures.push(FailureRule {
            pattern: pattern.to_string(),
            error,
            remaining: times,
        });
    }

    /// Answer queries containing `pattern` with `rows` instead of evaluating them.
    pub fn respond_to_query(&self, pattern: &str, rows: Vec<Row>) {
        self.state
            .lock()
            .unwrap()
            .responses
            .push((pattern.to_string(), rows));
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(&normalize(table))
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&normalize(table))
            .map(|t| t.rows.len())
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// SQL of every `execute` call so far.
    pub fn executed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Execute(s) => Some(s),
                GatewayCall::Query(_) => None,
            })
            .collect()
    }

    /// SQL of every `query` call so far.
    pub fn queries(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Query(s) => Some(s),
                GatewayCall::Execute(_) => None,
            })
            .collect()
    }
}

impl WarehouseGateway for MockWarehouse {
    fn execute(&self, statement: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::Execute(statement.to_string()));

        if let Some(err) = state.injected_failure(statement) {
            return Err(err);
        }

        // Work on a copy so a failing statement discards the whole batch.
        let mut tables = state.tables.clone();
        for stmt in statement.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            apply_statement(&mut tables, &state.copy_rows, &state.insert_rows, stmt)?;
        }
        state.tables = tables;
        Ok(())
    }

    fn query(&self, statement: &str) -> Result<Vec<Row>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::Query(statement.to_string()));

        if let Some(err) = state.injected_failure(statement) {
            return Err(err);
        }
        if let Some((_, rows)) = state.responses.iter().find(|(p, _)| statement.contains(p)) {
            return Ok(rows.clone());
        }

        let Some(caps) = COUNT_RE.captures(statement.trim()) else {
            return Ok(Vec::new());
        };
        let table = normalize(&caps[1]);
        let t = state.tables.get(&table).ok_or_else(|| missing_relation(&table))?;

        let count = match caps.get(2) {
            None => t.rows.len(),
            Some(predicate) => {
                let columns: Vec<String> = IS_NULL_RE
                    .captures_iter(predicate.as_str())
                    .map(|c| c[1].to_lowercase())
                    .collect();
                t.rows
                    .iter()
                    .filter(|row| {
                        columns
                            .iter()
                            .any(|c| row.get(c).is_some_and(Value::is_null))
                    })
                    .count()
            }
        };

        Ok(vec![vec![Value::Int(count as i64)]])
    }
}

fn apply_statement(
    tables: &mut HashMap<String, MockTable>,
    copy_rows: &HashMap<String, usize>,
    insert_rows: &HashMap<String, usize>,
    stmt: &str,
) -> Result<(), GatewayError> {
    if let Some(caps) = CREATE_RE.captures(stmt) {
        let table = normalize(&caps[2]);
        if tables.contains_key(&table) {
            if caps.get(1).is_none() {
                return Err(GatewayError::Statement(format!(
                    "relation \"{table}\" already exists"
                )));
            }
        } else {
            tables.insert(table, MockTable::default());
        }
    } else if let Some(caps) = TRUNCATE_RE.captures(stmt) {
        let table = normalize(&caps[1]);
        tables
            .get_mut(&table)
            .ok_or_else(|| missing_relation(&table))?
            .rows
            .clear();
    } else if let Some(caps) = COPY_RE.captures(stmt) {
        let table = normalize(&caps[1]);
        let n = copy_rows.get(&table).copied().unwrap_or(0);
        append_synthetic(tables, &table, n)?;
    } else if let Some(caps) = INSERT_RE.captures(stmt) {
        let table = normalize(&caps[1]);
        let n = insert_rows.get(&table).copied().unwrap_or(0);
        append_synthetic(tables, &table, n)?;
    }
    Ok(())
}

fn append_synthetic(
    tables: &mut HashMap<String, MockTable>,
    table: &str,
    n: usize,
) -> Result<(), GatewayError> {
    let t = tables.get_mut(table).ok_or_else(|| missing_relation(table))?;
    t.rows.extend(std::iter::repeat_with(HashMap::new).take(n));
    Ok(())
}

fn missing_relation(table: &str) -> GatewayError {
    GatewayError::Statement(format!("relation \"{table}\" does not exist"))
}

fn normalize(table: &str) -> String {
    table.trim().to_lowercase()
}
