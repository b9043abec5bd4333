//! Structured progress events emitted while a run is in flight.

use serde::Serialize;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExportEvent {
    /// Emitted before a window query is executed.
    ExportQuery {
        database: String,
        table: String,
        query: String,
    },
    /// Emitted after a batch has been delivered.
    BatchExported {
        database: String,
        table: String,
        offset: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<String>,
        size: usize,
        total: u64,
    },
    /// Emitted when a batch could not be delivered; the run stops after it.
    BatchFailed {
        database: String,
        table: String,
        offset: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<String>,
        size: usize,
        error: String,
    },
    WindowEmpty {
        database: String,
        table: String,
        watch: bool,
    },
    DeliveryRetry {
        topic: String,
        attempt: u32,
        backoff_ms: u64,
        error: String,
    },
    ExportCompleted {
        database: String,
        table: String,
        topic: String,
        total: u64,
    },
}

/// Receives events as they occur.
pub trait ExportObserver: Send + Sync {
    fn on_event(&self, event: &ExportEvent);
}

impl<F> ExportObserver for F
where
    F: Fn(&ExportEvent) + Send + Sync,
{
    fn on_event(&self, event: &ExportEvent) {
        self(event)
    }
}

/// Discards every event.
pub struct NoopObserver;

impl ExportObserver for NoopObserver {
    fn on_event(&self, _event: &ExportEvent) {}
}

/// Forwards events to `tracing`.
pub struct TracingObserver;

impl ExportObserver for TracingObserver {
    fn on_event(&self, event: &ExportEvent) {
        match event {
            ExportEvent::ExportQuery {
                database,
                table,
                query,
            } => debug!(database, table, query, "export_query"),
            ExportEvent::BatchExported {
                database,
                table,
                offset,
                cursor,
                size,
                total,
            } => info!(
                database,
                table,
                offset,
                cursor = cursor.as_deref().unwrap_or(""),
                size,
                total,
                "batch_exported"
            ),
            ExportEvent::BatchFailed {
                database,
                table,
                offset,
                cursor,
                size,
                error,
            } => error!(
                database,
                table,
                offset,
                cursor = cursor.as_deref().unwrap_or(""),
                size,
                error,
                "batch_failed"
            ),
            ExportEvent::WindowEmpty {
                database,
                table,
                watch,
            } => debug!(database, table, watch, "window_empty"),
            ExportEvent::DeliveryRetry {
                topic,
                attempt,
                backoff_ms,
                error,
            } => warn!(topic, attempt, backoff_ms, error, "delivery_retry"),
            ExportEvent::ExportCompleted {
                database,
                table,
                topic,
                total,
            } => info!(database, table, topic, total, "export_completed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = ExportEvent::BatchExported {
            database: "db".into(),
            table: "t".into(),
            offset: 20,
            cursor: None,
            size: 10,
            total: 20,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "batch_exported");
        assert_eq!(json["offset"], 20);
        assert!(json.get("cursor").is_none());
    }

    #[test]
    fn test_batch_failed_serializes_error_and_cursor() {
        let event = ExportEvent::BatchFailed {
            database: "db".into(),
            table: "t".into(),
            offset: 0,
            cursor: Some("19".into()),
            size: 10,
            error: "Delivery failed: broker down".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "batch_failed");
        assert_eq!(json["cursor"], "19");
        assert_eq!(json["error"], "Delivery failed: broker down");
    }
}
