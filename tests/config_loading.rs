use ch_sync::config::{load_tables_file, lookup, resolve_table, AppConfig, LogFormat, TableOverrides};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_discovers_toml_in_working_directory() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("ch-sync.toml"),
        r#"
[clickhouse]
url = "http://ch:8123"
database = "analytics"

[kafka]
brokers = ["k1:9092", "k2:9092"]

[sync]
batch_size = 250
poll_interval = "2s"

[logging]
level = "debug"
format = "json"
"#,
    )
    .unwrap();

    let (config, path) = AppConfig::load(None, dir.path()).unwrap();
    assert_eq!(path.unwrap(), dir.path().join("ch-sync.toml"));
    assert_eq!(config.clickhouse.url.as_deref(), Some("http://ch:8123"));
    assert_eq!(config.kafka.brokers, vec!["k1:9092", "k2:9092"]);
    assert_eq!(config.sync.batch_size, Some(250));
    assert_eq!(config.logging.level.as_deref(), Some("debug"));
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_toml_wins_over_yaml_when_both_exist() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("ch-sync.toml"), "[sync]\nbatch_size = 1\n").unwrap();
    fs::write(dir.path().join("ch-sync.yaml"), "sync:\n  batch_size: 2\n").unwrap();

    let (config, _) = AppConfig::load(None, dir.path()).unwrap();
    assert_eq!(config.sync.batch_size, Some(1));
}

#[test]
fn test_explicit_yaml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.yml");
    fs::write(
        &path,
        "clickhouse:\n  user: reader\nsync:\n  max_retries: 3\n",
    )
    .unwrap();

    let (config, loaded) = AppConfig::load(Some(&path), dir.path()).unwrap();
    assert_eq!(loaded.as_deref(), Some(path.as_path()));
    assert_eq!(config.clickhouse.user.as_deref(), Some("reader"));
    assert_eq!(config.sync.max_retries, Some(3));
    assert_eq!(config.logging.format, LogFormat::Text);
}

#[test]
fn test_discovers_json_config_with_log_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("ch-sync.json"),
        r#"{
  "clickhouse": { "database": "analytics" },
  "sync": { "replication_factor": 3 },
  "logging": { "format": "json", "file": "logs/ch-sync.log" }
}"#,
    )
    .unwrap();

    let (config, path) = AppConfig::load(None, dir.path()).unwrap();
    assert_eq!(path.unwrap(), dir.path().join("ch-sync.json"));
    assert_eq!(config.clickhouse.database.as_deref(), Some("analytics"));
    assert_eq!(config.sync.replication_factor, Some(3));
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.file.as_deref(), Some(std::path::Path::new("logs/ch-sync.log")));
}

#[test]
fn test_malformed_json_config_names_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"sync\": ").unwrap();
    let err = AppConfig::load(Some(&path), dir.path()).unwrap_err();
    assert!(format!("{err:#}").contains("broken.json"));
}

#[test]
fn test_no_config_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let (config, path) = AppConfig::load(None, dir.path()).unwrap();
    assert!(path.is_none());
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = AppConfig::load(Some(&dir.path().join("nope.toml")), dir.path()).unwrap_err();
    assert!(format!("{err:#}").contains("nope.toml"));
}

#[test]
fn test_unknown_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ch-sync.ini");
    fs::write(&path, "batch_size=1").unwrap();
    assert!(AppConfig::load(Some(&path), dir.path()).is_err());
}

#[test]
fn test_tables_file_feeds_resolution() {
    let dir = TempDir::new().unwrap();
    let tables_path = dir.path().join("tables.yaml");
    fs::write(
        &tables_path,
        r#"
tables:
  - name: events
    current_database: raw
    topic: events_stream
    cursor_column: id
    cursor_start: "500"
    batch_size: 100
  - name: users
"#,
    )
    .unwrap();
    let config_path = dir.path().join("ch-sync.toml");
    fs::write(&config_path, "[sync]\nbatch_size = 9000\npoll_interval = \"3s\"\n").unwrap();

    let (config, _) = AppConfig::load(None, dir.path()).unwrap();
    let entries = load_tables_file(&tables_path).unwrap();

    let cli = TableOverrides {
        watch: true,
        ..TableOverrides::default()
    };
    let events = resolve_table("events", &cli, lookup(&entries, "events"), &config).unwrap();
    assert_eq!(events.export.database, "raw");
    assert_eq!(events.export.resolved_topic(), "events_stream");
    assert_eq!(events.export.batch_size, 100);
    assert_eq!(events.export.poll_interval, Duration::from_secs(3));
    assert_eq!(
        events.export.cursor.as_ref().and_then(|c| c.start.as_deref()),
        Some("500")
    );

    let users = resolve_table("users", &cli, lookup(&entries, "users"), &config).unwrap();
    assert_eq!(users.export.batch_size, 9000);
    assert_eq!(users.export.resolved_topic(), "default_users");
}

#[test]
fn test_bad_poll_interval_fails_resolution() {
    let mut config = AppConfig::default();
    config.sync.poll_interval = Some("soon".into());
    let cli = TableOverrides {
        watch: true,
        ..TableOverrides::default()
    };
    assert!(resolve_table("events", &cli, None, &config).is_err());
}
