//! The batch export loop.
//!
//! One run reads a window, turns its rows into messages, delivers them and
//! only then plans the next window. Nothing is pipelined, so batches reach
//! the topic in the order their windows were read.

use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::event::{ExportEvent, ExportObserver};
use crate::pagination::{PaginationState, Planner};
use crate::retry::deliver_with_retry;
use crate::sink::{Message, MessageSink, TopicReadiness};
use crate::source::RowSource;
use crate::value::{Row, Value};
use tracing::{error, info, warn};

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub topic: String,
    pub total_rows: u64,
    pub batches: u64,
}

/// Export one table into its topic.
///
/// In one-shot mode the run ends at the first empty window. In watch mode an
/// empty window is retried after `poll_interval`, forever; callers stop a
/// watch run by dropping the future.
///
/// The sink is closed when the run ends, whether it succeeded or not.
pub async fn export_table(
    source: &dyn RowSource,
    sink: &dyn MessageSink,
    readiness: &dyn TopicReadiness,
    observer: &dyn ExportObserver,
    config: &ExportConfig,
) -> Result<ExportSummary> {
    let result = run(source, sink, readiness, observer, config).await;
    match (&result, sink.close().await) {
        (Ok(_), Err(e)) => return Err(e),
        (Err(_), Err(e)) => warn!(table = %config.table, "Failed to close sink after error: {e}"),
        _ => {}
    }
    result
}

async fn run(
    source: &dyn RowSource,
    sink: &dyn MessageSink,
    readiness: &dyn TopicReadiness,
    observer: &dyn ExportObserver,
    config: &ExportConfig,
) -> Result<ExportSummary> {
    config.validate()?;
    let topic = config.resolved_topic();
    let database = config.database.as_str();
    let table = config.table.as_str();

    let columns: Vec<String> = source
        .columns(database, table)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();
    let mut planner = Planner::new(config, &columns)?;
    let key_index = column_index(&columns, config.key_column.as_deref(), "key")?;
    let cursor_index = column_index(
        &columns,
        config.cursor.as_ref().map(|c| c.column.as_str()),
        "cursor",
    )?;

    info!(
        database,
        table,
        topic = %topic,
        columns = columns.len(),
        cursor_mode = planner.is_cursor_mode(),
        order_by = planner.order_by(),
        "Starting export"
    );

    readiness.wait_ready(&topic, config.ready_timeout).await?;

    let mut total: u64 = 0;
    let mut batches: u64 = 0;

    loop {
        let request = planner.next_request();
        observer.on_event(&ExportEvent::ExportQuery {
            database: database.to_string(),
            table: table.to_string(),
            query: request.sql.clone(),
        });

        let mut cursor = source.execute_query(&request.sql).await.inspect_err(|e| {
            error!(query = %request.sql, "Export query failed: {e}");
        })?;

        let mut batch = Vec::new();
        let mut last_cursor: Option<Value> = None;
        while let Some(row) = cursor.next_row().await {
            let row = row?;
            if let Some(v) = cursor_index.and_then(|i| row.get(i)).filter(|v| !v.is_null()) {
                last_cursor = Some(v.clone());
            }
            batch.push(row_to_message(&row, &columns, key_index)?);
        }
        drop(cursor);

        if batch.is_empty() {
            observer.on_event(&ExportEvent::WindowEmpty {
                database: database.to_string(),
                table: table.to_string(),
                watch: config.watch,
            });
            if config.watch {
                tokio::time::sleep(config.poll_interval).await;
                continue;
            }
            break;
        }

        let size = batch.len();
        if let Err(e) =
            deliver_with_retry(sink, readiness, observer, &topic, &batch, &config.retry).await
        {
            let (offset, cursor_position) = progress_position(planner.state(), total);
            observer.on_event(&ExportEvent::BatchFailed {
                database: database.to_string(),
                table: table.to_string(),
                offset,
                cursor: cursor_position,
                size,
                error: e.to_string(),
            });
            return Err(e);
        }
        planner.advance(size, last_cursor)?;

        total += size as u64;
        batches += 1;
        let (offset, cursor_position) = progress_position(planner.state(), total);
        observer.on_event(&ExportEvent::BatchExported {
            database: database.to_string(),
            table: table.to_string(),
            offset,
            cursor: cursor_position,
            size,
            total,
        });

        tokio::time::sleep(config.throttle).await;
    }

    observer.on_event(&ExportEvent::ExportCompleted {
        database: database.to_string(),
        table: table.to_string(),
        topic: topic.clone(),
        total,
    });

    Ok(ExportSummary {
        topic,
        total_rows: total,
        batches,
    })
}

/// Encode one row as a message: JSON object value, optional raw key.
pub fn row_to_message(row: &Row, columns: &[String], key_index: Option<usize>) -> Result<Message> {
    let value = serde_json::to_vec(&row.to_json_object(columns))?;
    let key = key_index
        .and_then(|i| row.get(i))
        .map(Value::to_key_bytes);
    Ok(Message { key, value })
}

/// Offset mode reports the row offset; cursor mode reports rows so far plus
/// the cursor position.
fn progress_position(state: &PaginationState, total: u64) -> (u64, Option<String>) {
    match state {
        PaginationState::Offset { offset } => (*offset, None),
        PaginationState::Cursor { .. } => (total, Some(state.position())),
    }
}

fn column_index(columns: &[String], name: Option<&str>, role: &str) -> Result<Option<usize>> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    columns
        .iter()
        .position(|c| c == name)
        .map(Some)
        .ok_or_else(|| ExportError::Config(format!("{role} column {name} does not exist")))
}
