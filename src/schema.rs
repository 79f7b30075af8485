//! Fixed catalog of the three metric tables. The catalog drives both the
//! prompt sent to the completion backend and the DDL issued at ingest, so
//! the two can never drift apart.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
}

#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub csv_file: &'static str,
    pub columns: &'static [ColumnSpec],
}

pub const AD_SALES: TableSpec = TableSpec {
    name: "ad_sales_metrics",
    csv_file: "ad_sales.csv",
    columns: &[
        ColumnSpec { name: "date", ty: ColumnType::Text },
        ColumnSpec { name: "item_id", ty: ColumnType::Integer },
        ColumnSpec { name: "ad_sales", ty: ColumnType::Real },
        ColumnSpec { name: "impressions", ty: ColumnType::Integer },
        ColumnSpec { name: "ad_spend", ty: ColumnType::Real },
        ColumnSpec { name: "clicks", ty: ColumnType::Integer },
        ColumnSpec { name: "units_sold", ty: ColumnType::Integer },
    ],
};

pub const TOTAL_SALES: TableSpec = TableSpec {
    name: "total_sales_metrics",
    csv_file: "total_sales.csv",
    columns: &[
        ColumnSpec { name: "date", ty: ColumnType::Text },
        ColumnSpec { name: "item_id", ty: ColumnType::Integer },
        ColumnSpec { name: "total_sales", ty: ColumnType::Real },
        ColumnSpec { name: "total_units_ordered", ty: ColumnType::Integer },
    ],
};

// Eligibility feeds arrive with inconsistent typing upstream, so every
// column stays TEXT.
pub const ELIGIBILITY: TableSpec = TableSpec {
    name: "eligibility_table",
    csv_file: "eligibility.csv",
    columns: &[
        ColumnSpec { name: "eligibility_datetime_utc", ty: ColumnType::Text },
        ColumnSpec { name: "item_id", ty: ColumnType::Text },
        ColumnSpec { name: "eligibility", ty: ColumnType::Text },
        ColumnSpec { name: "message", ty: ColumnType::Text },
    ],
};

pub const TABLES: [TableSpec; 3] = [AD_SALES, TOTAL_SALES, ELIGIBILITY];

impl TableSpec {
    pub fn create_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.ty.sql()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({})", self.name, columns)
    }

    pub fn insert_sql(&self) -> String {
        let names = self
            .columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=self.columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO {} ({}) VALUES ({})", self.name, names, placeholders)
    }

    pub fn prompt_line(&self) -> String {
        let names = self
            .columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ");
        format!("- {}({})", self.name, names)
    }
}

/// Schema description embedded verbatim into every completion prompt.
pub fn prompt_block() -> String {
    let mut block = String::from("Tables:\n");
    for table in &TABLES {
        let _ = writeln!(block, "{}", table.prompt_line());
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_sql_lists_every_column() {
        let sql = AD_SALES.create_sql();
        assert!(sql.starts_with("CREATE TABLE ad_sales_metrics ("));
        assert!(sql.contains("item_id INTEGER"));
        assert!(sql.contains("ad_spend REAL"));
        assert!(sql.contains("units_sold INTEGER"));
    }

    #[test]
    fn insert_sql_uses_numbered_placeholders() {
        let sql = TOTAL_SALES.insert_sql();
        assert_eq!(
            sql,
            "INSERT INTO total_sales_metrics (date, item_id, total_sales, total_units_ordered) \
             VALUES (?1, ?2, ?3, ?4)"
        );
    }

    #[test]
    fn prompt_block_names_all_tables() {
        let block = prompt_block();
        assert!(block.contains("- ad_sales_metrics(date, item_id, ad_sales"));
        assert!(block.contains("- total_sales_metrics("));
        assert!(block.contains("- eligibility_table(eligibility_datetime_utc"));
    }
}
