pub mod ingest;

use std::path::Path;

use anyhow::Result;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

/// Outcome of running one SQL statement. Execution failures are data, not
/// errors: they flow to the formatter as an `Error` variant and never
/// propagate as a Rust error.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum QueryOutcome {
    Table(ResultSet),
    Error { error: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub struct MetricsStore {
    conn: Connection,
}

impl MetricsStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Run one statement and materialize the full result set. Column names
    /// come from the statement descriptor; statements without one (anything
    /// that is not a SELECT) report no columns and no rows.
    pub fn query(&self, sql: &str) -> QueryOutcome {
        match self.run(sql) {
            Ok(result) => QueryOutcome::Table(result),
            Err(err) => QueryOutcome::Error {
                error: err.to_string(),
            },
        }
    }

    fn run(&self, sql: &str) -> rusqlite::Result<ResultSet> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let column_count = columns.len();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                record.push(value_ref_to_json(row.get_ref(idx)?));
            }
            out.push(record);
        }
        Ok(ResultSet { columns, rows: out })
    }
}

fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).to_string()),
        ValueRef::Blob(blob) => Value::String(String::from_utf8_lossy(blob).to_string()),
    }
}
