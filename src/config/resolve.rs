//! Merging of command-line values, table entries and the config file.
//!
//! For every setting the first non-blank value wins, in this order:
//! command line (or its environment variable), tables-file entry, config
//! file, built-in default.

use super::duration::parse_duration;
use super::file::AppConfig;
use super::tables::TableEntry;
use ch_sync_clickhouse_source::ClickHouseConfig;
use ch_sync_export::{CursorConfig, ExportConfig, RetryPolicy};

pub const DEFAULT_BROKER: &str = "localhost:9092";
pub const DEFAULT_ROWS_PER_PARTITION: i64 = 1_000_000;
pub const DEFAULT_REPLICATION_FACTOR: i32 = 1;

/// Per-table settings taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct TableOverrides {
    pub database: Option<String>,
    pub brokers: Vec<String>,
    pub topic: Option<String>,
    pub batch_size: Option<usize>,
    pub rows_per_partition: Option<i64>,
    pub order_by: Option<String>,
    pub key_column: Option<String>,
    pub cursor_column: Option<String>,
    pub cursor_start: Option<String>,
    pub cursor_end: Option<String>,
    pub target_database: Option<String>,
    pub target_table: Option<String>,
    pub watch: bool,
    pub poll_interval: Option<String>,
    pub max_retries: Option<u32>,
}

/// Everything needed to prepare and export one table.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub export: ExportConfig,
    pub brokers: Vec<String>,
    pub rows_per_partition: i64,
    pub target_database: String,
    pub target_table: String,
}

fn first(candidates: &[Option<&String>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn resolve_table(
    table: &str,
    cli: &TableOverrides,
    entry: Option<&TableEntry>,
    file: &AppConfig,
) -> anyhow::Result<ResolvedTable> {
    let from_entry = |f: fn(&TableEntry) -> Option<&String>| entry.and_then(f);

    let database = first(&[
        cli.database.as_ref(),
        from_entry(|e| e.current_database.as_ref()),
        file.clickhouse.database.as_ref(),
    ])
    .unwrap_or_else(|| "default".to_string());

    let brokers = [
        cli.brokers.as_slice(),
        entry.map(|e| e.brokers.as_slice()).unwrap_or_default(),
        file.kafka.brokers.as_slice(),
    ]
    .into_iter()
    .find(|b| !b.is_empty())
    .map(|b| b.to_vec())
    .unwrap_or_else(|| vec![DEFAULT_BROKER.to_string()]);

    let batch_size = cli
        .batch_size
        .or(entry.and_then(|e| e.batch_size))
        .or(file.sync.batch_size)
        .unwrap_or(ch_sync_export::config::DEFAULT_BATCH_SIZE);

    let rows_per_partition = cli
        .rows_per_partition
        .or(entry.and_then(|e| e.rows_per_partition))
        .or(file.sync.rows_per_partition)
        .unwrap_or(DEFAULT_ROWS_PER_PARTITION);

    let mut export = ExportConfig::new(database.clone(), table).with_batch_size(batch_size);

    if let Some(topic) = first(&[cli.topic.as_ref(), from_entry(|e| e.topic.as_ref())]) {
        export = export.with_topic(topic);
    }
    if let Some(order_by) = first(&[
        cli.order_by.as_ref(),
        from_entry(|e| e.export_order_by.as_ref()),
    ]) {
        export = export.with_order_by(order_by);
    }
    if let Some(key) = first(&[
        cli.key_column.as_ref(),
        from_entry(|e| e.export_key_column.as_ref()),
    ]) {
        export = export.with_key_column(key);
    }
    if let Some(column) = first(&[
        cli.cursor_column.as_ref(),
        from_entry(|e| e.cursor_column.as_ref()),
    ]) {
        let mut cursor = CursorConfig::new(column);
        cursor.start = first(&[
            cli.cursor_start.as_ref(),
            from_entry(|e| e.cursor_start.as_ref()),
        ]);
        cursor.end = first(&[
            cli.cursor_end.as_ref(),
            from_entry(|e| e.cursor_end.as_ref()),
        ]);
        export = export.with_cursor(cursor);
    }

    if cli.watch {
        let poll_interval = match first(&[
            cli.poll_interval.as_ref(),
            file.sync.poll_interval.as_ref(),
        ]) {
            Some(s) => parse_duration(&s)?,
            None => ch_sync_export::config::DEFAULT_POLL_INTERVAL,
        };
        export = export.with_watch(poll_interval);
    }

    if let Some(max_retries) = cli.max_retries.or(file.sync.max_retries) {
        export = export.with_retry(RetryPolicy {
            max_retries,
            ..RetryPolicy::default()
        });
    }

    let target_database = first(&[
        cli.target_database.as_ref(),
        from_entry(|e| e.target_database.as_ref()),
        file.sync.target_database.as_ref(),
    ])
    .unwrap_or_else(|| database.clone());
    let target_table = first(&[
        cli.target_table.as_ref(),
        from_entry(|e| e.target_table.as_ref()),
    ])
    .unwrap_or_else(|| table.to_string());

    export.validate()?;

    Ok(ResolvedTable {
        export,
        brokers,
        rows_per_partition,
        target_database,
        target_table,
    })
}

/// Connection settings from the command line over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

pub fn resolve_clickhouse(cli: &ConnectionOverrides, file: &AppConfig) -> ClickHouseConfig {
    let defaults = ClickHouseConfig::default();
    let section = &file.clickhouse;
    ClickHouseConfig {
        url: first(&[cli.url.as_ref(), section.url.as_ref()]).unwrap_or(defaults.url),
        user: first(&[cli.user.as_ref(), section.user.as_ref()]).unwrap_or(defaults.user),
        // an empty password is a valid setting
        password: cli
            .password
            .clone()
            .or_else(|| section.password.clone())
            .unwrap_or(defaults.password),
        database: first(&[cli.database.as_ref(), section.database.as_ref()])
            .unwrap_or(defaults.database),
    }
}

/// Split a comma-separated broker list, dropping blanks.
pub fn split_brokers(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry() -> TableEntry {
        TableEntry {
            name: "events".into(),
            brokers: vec!["table-broker:9092".into()],
            batch_size: Some(500),
            current_database: Some("raw".into()),
            export_order_by: Some("ts".into()),
            cursor_column: Some("id".into()),
            cursor_start: Some("100".into()),
            ..TableEntry::default()
        }
    }

    fn file() -> AppConfig {
        let mut config = AppConfig::default();
        config.clickhouse.database = Some("filedb".into());
        config.kafka.brokers = vec!["file-broker:9092".into()];
        config.sync.batch_size = Some(2000);
        config.sync.rows_per_partition = Some(10);
        config.sync.target_database = Some("replica".into());
        config
    }

    #[test]
    fn test_defaults_without_any_source() {
        let resolved =
            resolve_table("events", &TableOverrides::default(), None, &AppConfig::default())
                .unwrap();
        assert_eq!(resolved.export.database, "default");
        assert_eq!(resolved.export.batch_size, 10_000);
        assert_eq!(resolved.brokers, vec![DEFAULT_BROKER]);
        assert_eq!(resolved.rows_per_partition, DEFAULT_ROWS_PER_PARTITION);
        assert_eq!(resolved.target_database, "default");
        assert_eq!(resolved.target_table, "events");
        assert_eq!(resolved.export.resolved_topic(), "default_events");
        assert!(resolved.export.cursor.is_none());
    }

    #[test]
    fn test_table_entry_beats_file() {
        let resolved =
            resolve_table("events", &TableOverrides::default(), Some(&entry()), &file()).unwrap();
        assert_eq!(resolved.export.database, "raw");
        assert_eq!(resolved.export.batch_size, 500);
        assert_eq!(resolved.brokers, vec!["table-broker:9092"]);
        assert_eq!(resolved.rows_per_partition, 10);
        assert_eq!(resolved.target_database, "replica");
        assert_eq!(resolved.export.order_by, "ts");
        let cursor = resolved.export.cursor.unwrap();
        assert_eq!(cursor.column, "id");
        assert_eq!(cursor.start.as_deref(), Some("100"));
    }

    #[test]
    fn test_command_line_beats_table_entry() {
        let cli = TableOverrides {
            database: Some("clidb".into()),
            brokers: vec!["cli-broker:9092".into()],
            batch_size: Some(7),
            cursor_start: Some("200".into()),
            topic: Some("custom".into()),
            watch: true,
            poll_interval: Some("250ms".into()),
            max_retries: Some(0),
            ..TableOverrides::default()
        };
        let resolved = resolve_table("events", &cli, Some(&entry()), &file()).unwrap();
        assert_eq!(resolved.export.database, "clidb");
        assert_eq!(resolved.export.batch_size, 7);
        assert_eq!(resolved.brokers, vec!["cli-broker:9092"]);
        assert_eq!(resolved.export.resolved_topic(), "custom");
        assert_eq!(
            resolved.export.cursor.unwrap().start.as_deref(),
            Some("200")
        );
        assert!(resolved.export.watch);
        assert_eq!(resolved.export.poll_interval, Duration::from_millis(250));
        assert_eq!(resolved.export.retry.max_retries, 0);
    }

    #[test]
    fn test_blank_values_fall_through() {
        let cli = TableOverrides {
            database: Some("  ".into()),
            ..TableOverrides::default()
        };
        let resolved = resolve_table("t", &cli, None, &file()).unwrap();
        assert_eq!(resolved.export.database, "filedb");
    }

    #[test]
    fn test_invalid_batch_size_is_rejected() {
        let cli = TableOverrides {
            batch_size: Some(0),
            ..TableOverrides::default()
        };
        assert!(resolve_table("t", &cli, None, &AppConfig::default()).is_err());
    }

    #[test]
    fn test_clickhouse_connection_precedence() {
        let mut config = AppConfig::default();
        config.clickhouse.url = Some("http://ch:8123".into());
        config.clickhouse.password = Some("secret".into());
        let cli = ConnectionOverrides {
            user: Some("reader".into()),
            password: Some(String::new()),
            ..ConnectionOverrides::default()
        };
        let resolved = resolve_clickhouse(&cli, &config);
        assert_eq!(resolved.url, "http://ch:8123");
        assert_eq!(resolved.user, "reader");
        assert_eq!(resolved.password, "");
        assert_eq!(resolved.database, "default");
    }

    #[test]
    fn test_split_brokers() {
        assert_eq!(split_brokers("a:1, b:2,,"), vec!["a:1", "b:2"]);
        assert!(split_brokers("").is_empty());
    }
}
