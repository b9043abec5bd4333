//! Per-run export configuration.

use crate::error::{ExportError, Result};
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(10);

/// Everything one export run needs to know.
///
/// Built by the caller and passed into [`crate::export_table`]; the engine
/// keeps no process-wide state.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub database: String,
    pub table: String,
    /// Destination topic. Empty means `<database>_<table>`.
    pub topic: String,
    pub batch_size: usize,
    /// Raw ordering expression, normalized against the table's columns.
    pub order_by: String,
    pub key_column: Option<String>,
    pub cursor: Option<CursorConfig>,
    /// Keep polling for new rows instead of stopping at the first empty window.
    pub watch: bool,
    pub poll_interval: Duration,
    /// Pause between delivered batches.
    pub throttle: Duration,
    pub retry: RetryPolicy,
    /// Bound on the initial readiness wait before the first delivery.
    pub ready_timeout: Duration,
}

/// Cursor-mode settings: a strictly increasing column and optional bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorConfig {
    pub column: String,
    /// Inclusive lower bound for the first window.
    pub start: Option<String>,
    /// Inclusive upper bound applied to every window.
    pub end: Option<String>,
}

impl CursorConfig {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            start: None,
            end: None,
        }
    }

    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn with_end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }
}

/// Bounded retry for batches rejected because the topic is not known yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Readiness wait between attempts.
    pub ready_timeout: Duration,
    /// Backoff unit; attempt `n` sleeps `base_backoff * n`.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            ready_timeout: Duration::from_secs(5),
            base_backoff: Duration::from_millis(200),
        }
    }
}

impl ExportConfig {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            topic: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            order_by: String::new(),
            key_column: None,
            cursor: None,
            watch: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            throttle: DEFAULT_THROTTLE,
            retry: RetryPolicy::default(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }

    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    pub fn with_cursor(mut self, cursor: CursorConfig) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn with_watch(mut self, poll_interval: Duration) -> Self {
        self.watch = true;
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The topic this run writes to.
    pub fn resolved_topic(&self) -> String {
        default_topic_name(&self.topic, &self.database, &self.table)
    }

    /// Reject configurations that cannot start a run.
    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(ExportError::Config("missing table name".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(ExportError::Config("missing database name".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ExportError::Config(
                "batch size must be greater than zero".to_string(),
            ));
        }
        if let Some(cursor) = &self.cursor {
            if cursor.column.trim().is_empty() {
                return Err(ExportError::Config("cursor column is empty".to_string()));
            }
        }
        Ok(())
    }
}

/// `topic` if set, otherwise `<database>_<table>`.
pub fn default_topic_name(topic: &str, database: &str, table: &str) -> String {
    if topic.trim().is_empty() {
        format!("{database}_{table}")
    } else {
        topic.to_string()
    }
}
