//! Table preparation and the multi-table `sync` command.
//!
//! Tables are handled strictly one after another: estimate the row count,
//! optionally recreate the topic, make sure the topic exists with enough
//! partitions, then export.

use crate::config::{resolve_table, AppConfig, ResolvedTable, TableEntry, TableOverrides};
use anyhow::{bail, Context};
use ch_sync_clickhouse_source::ClickHouseSource;
use ch_sync_export::{export_table, ExportObserver, RowSource};
use ch_sync_kafka_sink::{partitions_for_rows, KafkaSink, TopicAdmin};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Restrict the run to these tables; empty means every listed table.
    pub tables: Vec<String>,
    pub continue_on_error: bool,
    pub prepare_only: bool,
    /// Ignore cursor settings and export every table from the start by offset.
    pub full_export: bool,
    pub recreate_topic: bool,
    pub replication_factor: i32,
    pub cursor_start_from_target: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TableOutcome {
    pub table: String,
    pub topic: String,
    pub estimated_rows: u64,
    pub partitions: i32,
    pub topic_created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub tables: Vec<TableOutcome>,
}

/// Pick the entries named by `filter`, in the tables file's order.
pub fn select_tables<'a>(entries: &'a [TableEntry], filter: &[String]) -> anyhow::Result<Vec<&'a TableEntry>> {
    if filter.is_empty() {
        return Ok(entries.iter().collect());
    }
    for name in filter {
        if !entries.iter().any(|e| &e.name == name) {
            bail!("Table {name} is not listed in the tables file");
        }
    }
    Ok(entries.iter().filter(|e| filter.contains(&e.name)).collect())
}

/// Replace the cursor start with the highest cursor value already present
/// in the destination table, if there is one.
pub async fn apply_target_cursor(source: &ClickHouseSource, resolved: &mut ResolvedTable) -> anyhow::Result<()> {
    let Some(cursor) = resolved.export.cursor.as_mut() else {
        warn!(table = %resolved.export.table, "No cursor column configured, ignoring target high-water mark");
        return Ok(());
    };
    let max = source
        .max_value(&resolved.target_database, &resolved.target_table, &cursor.column)
        .await
        .with_context(|| {
            format!(
                "Failed to read max({}) from {}.{}",
                cursor.column, resolved.target_database, resolved.target_table
            )
        })?;
    if let Some(max) = max {
        info!(
            column = %cursor.column,
            start = %max,
            target = %format!("{}.{}", resolved.target_database, resolved.target_table),
            "Resuming cursor from destination table"
        );
        cursor.start = Some(max);
    }
    Ok(())
}

pub async fn run_sync(
    source: &ClickHouseSource,
    file: &AppConfig,
    cli: &TableOverrides,
    entries: &[TableEntry],
    options: &SyncOptions,
    observer: &dyn ExportObserver,
) -> anyhow::Result<SyncSummary> {
    let selected = select_tables(entries, &options.tables)?;
    if selected.is_empty() {
        bail!("No tables to sync");
    }

    let mut summary = SyncSummary::default();
    for entry in selected {
        let mut outcome = TableOutcome {
            table: entry.name.clone(),
            ..TableOutcome::default()
        };
        let result = sync_table(source, file, cli, entry, options, observer, &mut outcome).await;
        match result {
            Ok(()) => summary.succeeded += 1,
            Err(e) => {
                summary.failed += 1;
                error!(table = %entry.name, "Table sync failed: {e:#}");
                outcome.error = Some(format!("{e:#}"));
                if !options.continue_on_error {
                    summary.tables.push(outcome);
                    return Err(e.context(format!("Sync of table {} failed", entry.name)));
                }
            }
        }
        summary.tables.push(outcome);
    }
    Ok(summary)
}

async fn sync_table(
    source: &ClickHouseSource,
    file: &AppConfig,
    cli: &TableOverrides,
    entry: &TableEntry,
    options: &SyncOptions,
    observer: &dyn ExportObserver,
    outcome: &mut TableOutcome,
) -> anyhow::Result<()> {
    let mut resolved = resolve_table(&entry.name, cli, Some(entry), file)?;
    if options.full_export {
        resolved.export.cursor = None;
    }
    let topic = resolved.export.resolved_topic();
    outcome.topic = topic.clone();

    let rows = source
        .row_count_estimate(&resolved.export.database, &entry.name)
        .await
        .context("Failed to estimate row count")?;
    let partitions = partitions_for_rows(rows, resolved.rows_per_partition);
    outcome.estimated_rows = rows;
    outcome.partitions = partitions;

    let admin = TopicAdmin::new(resolved.brokers.clone());
    if options.recreate_topic {
        admin
            .delete_topic(&topic)
            .await
            .with_context(|| format!("Failed to delete topic {topic}"))?;
    }
    outcome.topic_created = admin
        .ensure_topic(&topic, partitions, options.replication_factor)
        .await
        .with_context(|| format!("Failed to prepare topic {topic}"))?;
    info!(
        table = %entry.name,
        topic = %topic,
        rows,
        partitions,
        created = outcome.topic_created,
        "Topic prepared"
    );

    if options.prepare_only {
        return Ok(());
    }

    if options.cursor_start_from_target {
        apply_target_cursor(source, &mut resolved).await?;
    }
    let sink = KafkaSink::new(&resolved.brokers, &topic)?;
    let exported = export_table(source, &sink, &admin, observer, &resolved.export)
        .await
        .with_context(|| format!("Export of {}.{} failed", resolved.export.database, entry.name))?;
    outcome.exported_rows = Some(exported.total_rows);
    Ok(())
}
