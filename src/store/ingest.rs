//! One-shot CSV loader. Each run fully replaces the three tables; there is
//! no append path. Coercion failures abort with the offending file and row.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use tracing::info;

use crate::schema::{ColumnType, TableSpec, TABLES};
use crate::store::MetricsStore;

const INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_ad_sales_item_date
    ON ad_sales_metrics(item_id, date);
CREATE INDEX IF NOT EXISTS idx_total_sales_item_date
    ON total_sales_metrics(item_id, date);
CREATE INDEX IF NOT EXISTS idx_eligibility_item_date
    ON eligibility_table(item_id, eligibility_datetime_utc);
"#;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub ingested_at: DateTime<Utc>,
    pub tables: Vec<TableCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: usize,
}

pub fn ingest(store: &mut MetricsStore, data_dir: &Path) -> Result<IngestReport> {
    let mut tables = Vec::with_capacity(TABLES.len());
    for spec in &TABLES {
        let path = data_dir.join(spec.csv_file);
        let rows = load_csv(&path, spec)
            .with_context(|| format!("failed loading {}", path.display()))?;
        let count = replace_table(store, spec, rows)?;
        info!(table = spec.name, rows = count, "table replaced");
        tables.push(TableCount {
            table: spec.name.to_string(),
            rows: count,
        });
    }
    store.conn.execute_batch(INDEX_DDL)?;
    Ok(IngestReport {
        ingested_at: Utc::now(),
        tables,
    })
}

fn load_csv(path: &Path, spec: &TableSpec) -> Result<Vec<Vec<SqlValue>>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let indexes = spec
        .columns
        .iter()
        .map(|column| {
            headers
                .iter()
                .position(|h| h.trim() == column.name)
                .ok_or_else(|| anyhow!("missing column {:?}", column.name))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let mut row = Vec::with_capacity(spec.columns.len());
        for (column, &idx) in spec.columns.iter().zip(&indexes) {
            let raw = record.get(idx).unwrap_or("");
            // item_id arrives with stray whitespace in every feed.
            let raw = if column.name == "item_id" { raw.trim() } else { raw };
            let value = coerce(raw, column.ty).with_context(|| {
                format!("row {} column {:?}: bad value {:?}", line + 2, column.name, raw)
            })?;
            row.push(value);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn coerce(raw: &str, ty: ColumnType) -> Result<SqlValue> {
    let value = match ty {
        ColumnType::Text => SqlValue::Text(raw.to_string()),
        ColumnType::Integer => {
            let trimmed = raw.trim();
            match trimmed.parse::<i64>() {
                Ok(n) => SqlValue::Integer(n),
                // Feeds sometimes serialize counts as "4.0".
                Err(_) => SqlValue::Integer(trimmed.parse::<f64>()? as i64),
            }
        }
        ColumnType::Real => SqlValue::Real(raw.trim().parse::<f64>()?),
    };
    Ok(value)
}

fn replace_table(
    store: &mut MetricsStore,
    spec: &TableSpec,
    rows: Vec<Vec<SqlValue>>,
) -> Result<usize> {
    let tx = store.conn.transaction()?;
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", spec.name))?;
    tx.execute(&spec.create_sql(), [])?;
    let count = rows.len();
    {
        let mut stmt = tx.prepare(&spec.insert_sql())?;
        for row in rows {
            stmt.execute(params_from_iter(row))?;
        }
    }
    tx.commit()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::QueryOutcome;
    use serde_json::json;
    use std::fs;

    fn write_fixtures(dir: &Path) {
        fs::write(
            dir.join("ad_sales.csv"),
            "date,item_id,ad_sales,impressions,ad_spend,clicks,units_sold\n\
             2024-01-01, 42 ,120.5,1000,30.0,10,5\n\
             2024-01-02,42,90.0,800,18.0,0,3\n\
             ,,,,,,\n",
        )
        .unwrap();
        fs::write(
            dir.join("total_sales.csv"),
            "date,item_id,total_sales,total_units_ordered\n\
             2024-01-01,42,100.0,4\n\
             2024-01-02,42,50.0,2\n",
        )
        .unwrap();
        fs::write(
            dir.join("eligibility.csv"),
            "eligibility_datetime_utc,item_id,eligibility,message\n\
             2024-01-01T00:00:00Z, 42 ,TRUE,listed\n",
        )
        .unwrap();
    }

    #[test]
    fn ingest_loads_and_counts_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let mut store = MetricsStore::open_in_memory().unwrap();
        let report = ingest(&mut store, dir.path()).unwrap();

        let counts: Vec<(String, usize)> = report
            .tables
            .iter()
            .map(|t| (t.table.clone(), t.rows))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("ad_sales_metrics".to_string(), 2),
                ("total_sales_metrics".to_string(), 2),
                ("eligibility_table".to_string(), 1),
            ]
        );
    }

    #[test]
    fn blank_rows_are_dropped_and_item_id_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let mut store = MetricsStore::open_in_memory().unwrap();
        ingest(&mut store, dir.path()).unwrap();

        let outcome = store.query("SELECT COUNT(*), MIN(item_id) FROM ad_sales_metrics");
        let QueryOutcome::Table(result) = outcome else {
            panic!("expected a result set");
        };
        assert_eq!(result.rows, vec![vec![json!(2), json!(42)]]);

        // Eligibility keeps item_id textual but still trimmed.
        let outcome = store.query("SELECT item_id FROM eligibility_table");
        let QueryOutcome::Table(result) = outcome else {
            panic!("expected a result set");
        };
        assert_eq!(result.rows, vec![vec![json!("42")]]);
    }

    #[test]
    fn reingest_replaces_rather_than_appends() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let mut store = MetricsStore::open_in_memory().unwrap();
        ingest(&mut store, dir.path()).unwrap();
        ingest(&mut store, dir.path()).unwrap();

        let outcome = store.query("SELECT COUNT(*) FROM total_sales_metrics");
        let QueryOutcome::Table(result) = outcome else {
            panic!("expected a result set");
        };
        assert_eq!(result.rows, vec![vec![json!(2)]]);
    }

    #[test]
    fn zero_click_division_is_null_after_ingest() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let mut store = MetricsStore::open_in_memory().unwrap();
        ingest(&mut store, dir.path()).unwrap();

        let outcome = store.query(
            "SELECT ROUND(ad_spend / NULLIF(clicks, 0), 2) AS CPC \
             FROM ad_sales_metrics ORDER BY date",
        );
        let QueryOutcome::Table(result) = outcome else {
            panic!("expected a result set");
        };
        assert_eq!(result.rows, vec![vec![json!(3.0)], vec![serde_json::Value::Null]]);
    }

    #[test]
    fn unparseable_numeric_field_aborts_with_context() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        fs::write(
            dir.path().join("total_sales.csv"),
            "date,item_id,total_sales,total_units_ordered\n2024-01-01,42,not-a-number,4\n",
        )
        .unwrap();
        let mut store = MetricsStore::open_in_memory().unwrap();
        let err = ingest(&mut store, dir.path()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("total_sales.csv"));
        assert!(message.contains("total_sales"));
    }
}
