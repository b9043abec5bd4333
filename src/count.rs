//! The `count` command: source row counts, optionally compared with the
//! materialized views that read the exported topics back into ClickHouse.
//!
//! The view for table `t` is `<target database>.mv_from_kafka_t`. A real
//! `MaterializedView` is counted exactly; anything else under that name is
//! counted from `system.parts` like the source tables.

use anyhow::Context;
use async_trait::async_trait;
use ch_sync_clickhouse_source::{ClickHouseSource, TableRows};
use ch_sync_export::{Result, RowSource};
use serde::Serialize;
use tracing::debug;

pub const VIEW_PREFIX: &str = "mv_from_kafka_";
const VIEW_ENGINE: &str = "MaterializedView";

pub fn materialized_view_name(table: &str) -> String {
    format!("{VIEW_PREFIX}{table}")
}

/// Row counts as the `count` command needs them.
#[async_trait]
pub trait CountSource: Send + Sync {
    async fn estimate(&self, database: &str, table: &str) -> Result<u64>;
    async fn estimate_all(&self, database: &str) -> Result<Vec<TableRows>>;
    async fn engine(&self, database: &str, table: &str) -> Result<Option<String>>;
    async fn exact(&self, database: &str, table: &str) -> Result<u64>;
}

#[async_trait]
impl CountSource for ClickHouseSource {
    async fn estimate(&self, database: &str, table: &str) -> Result<u64> {
        self.row_count_estimate(database, table).await
    }

    async fn estimate_all(&self, database: &str) -> Result<Vec<TableRows>> {
        self.count_all_tables_rows(database).await
    }

    async fn engine(&self, database: &str, table: &str) -> Result<Option<String>> {
        self.table_engine(database, table).await
    }

    async fn exact(&self, database: &str, table: &str) -> Result<u64> {
        self.exact_count(database, table).await
    }
}

/// Count of one source table, with its view when compared.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TableCount {
    pub table: String,
    pub rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materialized_view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mv_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mv_error: Option<String>,
    /// Set by `--diff` when the view could be counted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<bool>,
}

/// Output of `count` without `--table`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CountReport {
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_database: Option<String>,
    pub tables: Vec<TableCount>,
    pub total: u64,
}

/// Where a compared view lives and whether differences are flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewComparison {
    pub target_database: String,
    pub diff: bool,
}

async fn view_rows(source: &dyn CountSource, target_database: &str, view: &str) -> Result<u64> {
    match source.engine(target_database, view).await?.as_deref() {
        Some(VIEW_ENGINE) => source.exact(target_database, view).await,
        engine => {
            debug!(target_database, view, ?engine, "Not a materialized view, using part statistics");
            source.estimate(target_database, view).await
        }
    }
}

/// Attach the view count to `count`. A view that cannot be counted is
/// reported in `mv_error` and does not fail the command.
async fn compare(source: &dyn CountSource, count: &mut TableCount, comparison: &ViewComparison) {
    let view = materialized_view_name(&count.table);
    match view_rows(source, &comparison.target_database, &view).await {
        Ok(rows) => {
            count.mv_rows = Some(rows);
            if comparison.diff {
                count.mismatch = Some(rows != count.rows);
            }
        }
        Err(e) => count.mv_error = Some(e.to_string()),
    }
    count.materialized_view = Some(format!("{}.{view}", comparison.target_database));
}

/// Count one table, always alongside its view.
pub async fn count_table(
    source: &dyn CountSource,
    database: &str,
    table: &str,
    comparison: &ViewComparison,
) -> anyhow::Result<TableCount> {
    let rows = source
        .estimate(database, table)
        .await
        .with_context(|| format!("Failed to count {database}.{table}"))?;
    let mut count = TableCount {
        table: table.to_string(),
        rows,
        ..TableCount::default()
    };
    compare(source, &mut count, comparison).await;
    Ok(count)
}

/// Count every table of `database`, comparing views when `comparison` is set.
pub async fn count_all(
    source: &dyn CountSource,
    database: &str,
    comparison: Option<&ViewComparison>,
) -> anyhow::Result<CountReport> {
    let tables = source
        .estimate_all(database)
        .await
        .with_context(|| format!("Failed to count tables of {database}"))?;

    let mut counts = Vec::with_capacity(tables.len());
    for TableRows { table, rows } in tables {
        let mut count = TableCount {
            table,
            rows,
            ..TableCount::default()
        };
        if let Some(comparison) = comparison {
            compare(source, &mut count, comparison).await;
        }
        counts.push(count);
    }

    Ok(CountReport {
        database: database.to_string(),
        target_database: comparison.map(|c| c.target_database.clone()),
        total: counts.iter().map(|c| c.rows).sum(),
        tables: counts,
    })
}
