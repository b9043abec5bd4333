use ch_sync::config::ConnectionOverrides;
use ch_sync::{table_overrides, BatchOpts, ClickHouseOpts, KafkaOpts, TableOpts};
use clap::Parser;

#[test]
fn test_batch_opts_parsing() {
    let opts = BatchOpts::try_parse_from([
        "ch-sync",
        "--batch-size",
        "500",
        "--max-retries",
        "2",
        "--cursor-start-from-target",
    ])
    .unwrap();
    assert_eq!(opts.batch_size, Some(500));
    assert_eq!(opts.max_retries, Some(2));
    assert!(opts.cursor_start_from_target);
    assert!(opts.rows_per_partition.is_none());
}

#[test]
fn test_table_opts_parsing() {
    let opts = TableOpts::try_parse_from([
        "ch-sync",
        "--cursor-column",
        "id",
        "--cursor-start",
        "10",
        "--watch",
        "--poll-interval",
        "500ms",
    ])
    .unwrap();
    assert_eq!(opts.cursor_column.as_deref(), Some("id"));
    assert_eq!(opts.cursor_start.as_deref(), Some("10"));
    assert!(opts.watch);
    assert_eq!(opts.poll_interval.as_deref(), Some("500ms"));
}

#[test]
fn test_kafka_brokers_are_split() {
    let opts = KafkaOpts {
        kafka_brokers: Some("a:9092, b:9092".into()),
    };
    assert_eq!(opts.brokers(), vec!["a:9092", "b:9092"]);
    assert!(KafkaOpts::default().brokers().is_empty());
}

#[test]
fn test_connection_overrides_from_opts() {
    let opts = ClickHouseOpts {
        ch_url: Some("http://ch:8123".into()),
        ch_database: Some("analytics".into()),
        ..ClickHouseOpts::default()
    };
    let overrides: ConnectionOverrides = (&opts).into();
    assert_eq!(overrides.url.as_deref(), Some("http://ch:8123"));
    assert_eq!(overrides.database.as_deref(), Some("analytics"));
    assert!(overrides.password.is_none());
}

#[test]
fn test_table_overrides_without_table_opts() {
    let clickhouse = ClickHouseOpts {
        ch_database: Some("analytics".into()),
        ..ClickHouseOpts::default()
    };
    let kafka = KafkaOpts {
        kafka_brokers: Some("k:9092".into()),
    };
    let batch = BatchOpts {
        batch_size: Some(42),
        ..BatchOpts::default()
    };
    let overrides = table_overrides(&clickhouse, &kafka, &batch, None);
    assert_eq!(overrides.database.as_deref(), Some("analytics"));
    assert_eq!(overrides.brokers, vec!["k:9092"]);
    assert_eq!(overrides.batch_size, Some(42));
    assert!(overrides.cursor_column.is_none());
    assert!(!overrides.watch);
}

#[test]
fn test_table_overrides_with_table_opts() {
    let table = TableOpts {
        topic: Some("t".into()),
        key_column: Some("user_id".into()),
        watch: true,
        ..TableOpts::default()
    };
    let overrides = table_overrides(
        &ClickHouseOpts::default(),
        &KafkaOpts::default(),
        &BatchOpts::default(),
        Some(&table),
    );
    assert_eq!(overrides.topic.as_deref(), Some("t"));
    assert_eq!(overrides.key_column.as_deref(), Some("user_id"));
    assert!(overrides.watch);
    assert!(overrides.brokers.is_empty());
}
