//! ch-sync
//!
//! Exports ClickHouse tables into Kafka topics, batch by batch, as keyed JSON
//! messages. A run either drains a table once or keeps watching it for new
//! rows through a strictly increasing cursor column.
//!
//! # Crates
//!
//! - `ch_sync_export` - the export engine: window planning, batch loop, delivery retry
//! - `ch_sync_clickhouse_source` - ClickHouse HTTP row source
//! - `ch_sync_kafka_sink` - Kafka producer sink and topic lifecycle
//!
//! # CLI Usage
//!
//! ```bash
//! # One-shot export of a table into <database>_<table>
//! ch-sync export --table events --ch-database analytics
//!
//! # Tail a table by cursor, resuming from what the destination already holds
//! ch-sync export --table events --cursor-column id --watch --cursor-start-from-target
//!
//! # Prepare topics and export every table of the tables file
//! ch-sync sync --tables-file tables.yaml --continue-on-error
//! ```

use clap::Parser;

pub mod config;
pub mod count;
pub mod logging;
pub mod progress;
pub mod sync;

use config::{split_brokers, ConnectionOverrides, TableOverrides};

#[derive(Parser, Clone, Debug, Default)]
pub struct ClickHouseOpts {
    /// ClickHouse HTTP endpoint
    #[arg(long, global = true, env = "CH_URL")]
    pub ch_url: Option<String>,

    /// ClickHouse user
    #[arg(long, global = true, env = "CH_USER")]
    pub ch_user: Option<String>,

    /// ClickHouse password
    #[arg(long, global = true, env = "CH_PASSWORD", hide_env_values = true)]
    pub ch_password: Option<String>,

    /// Source database
    #[arg(long, global = true, env = "CH_DATABASE")]
    pub ch_database: Option<String>,
}

impl From<&ClickHouseOpts> for ConnectionOverrides {
    fn from(opts: &ClickHouseOpts) -> Self {
        Self {
            url: opts.ch_url.clone(),
            user: opts.ch_user.clone(),
            password: opts.ch_password.clone(),
            database: opts.ch_database.clone(),
        }
    }
}

#[derive(Parser, Clone, Debug, Default)]
pub struct KafkaOpts {
    /// Comma-separated Kafka brokers
    #[arg(long, global = true, env = "KAFKA_BROKERS")]
    pub kafka_brokers: Option<String>,
}

impl KafkaOpts {
    pub fn brokers(&self) -> Vec<String> {
        self.kafka_brokers
            .as_deref()
            .map(split_brokers)
            .unwrap_or_default()
    }
}

/// Settings shared by `export` and `sync`.
#[derive(Parser, Clone, Debug, Default)]
pub struct BatchOpts {
    /// Rows per query window and per delivered batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Rows per topic partition when sizing new topics
    #[arg(long)]
    pub rows_per_partition: Option<i64>,

    /// Database holding the destination tables
    #[arg(long)]
    pub target_database: Option<String>,

    /// Delivery retries on unknown-topic failures
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Start the cursor at max(cursor column) of the destination table
    #[arg(long)]
    pub cursor_start_from_target: bool,
}

/// Settings that only make sense for a single table.
#[derive(Parser, Clone, Debug, Default)]
pub struct TableOpts {
    /// Destination topic (default: <database>_<table>)
    #[arg(long)]
    pub topic: Option<String>,

    /// Ordering expression, e.g. "ts DESC, id"
    #[arg(long)]
    pub order_by: Option<String>,

    /// Column whose value becomes the message key
    #[arg(long)]
    pub key_column: Option<String>,

    /// Strictly increasing column for cursor pagination
    #[arg(long)]
    pub cursor_column: Option<String>,

    /// Inclusive lower bound of the cursor
    #[arg(long)]
    pub cursor_start: Option<String>,

    /// Inclusive upper bound of the cursor
    #[arg(long)]
    pub cursor_end: Option<String>,

    /// Destination table for --cursor-start-from-target (default: source table name)
    #[arg(long)]
    pub target_table: Option<String>,

    /// Keep polling for new rows after the table is drained
    #[arg(long)]
    pub watch: bool,

    /// Poll interval in watch mode, e.g. "5s" or "500ms"
    #[arg(long)]
    pub poll_interval: Option<String>,
}

/// Command-line overrides for one table.
pub fn table_overrides(
    clickhouse: &ClickHouseOpts,
    kafka: &KafkaOpts,
    batch: &BatchOpts,
    table: Option<&TableOpts>,
) -> TableOverrides {
    let mut overrides = TableOverrides {
        database: clickhouse.ch_database.clone(),
        brokers: kafka.brokers(),
        batch_size: batch.batch_size,
        rows_per_partition: batch.rows_per_partition,
        target_database: batch.target_database.clone(),
        max_retries: batch.max_retries,
        ..TableOverrides::default()
    };
    if let Some(t) = table {
        overrides.topic = t.topic.clone();
        overrides.order_by = t.order_by.clone();
        overrides.key_column = t.key_column.clone();
        overrides.cursor_column = t.cursor_column.clone();
        overrides.cursor_start = t.cursor_start.clone();
        overrides.cursor_end = t.cursor_end.clone();
        overrides.target_table = t.target_table.clone();
        overrides.watch = t.watch;
        overrides.poll_interval = t.poll_interval.clone();
    }
    overrides
}
