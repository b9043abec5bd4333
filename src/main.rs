//! Command-line interface for ch-sync
//!
//! # Usage Examples
//!
//! ## Export
//! ```bash
//! # Drain a table once, 5000 rows per batch, keyed by user_id
//! ch-sync export --table events \
//!   --ch-url http://localhost:8123 --ch-database analytics \
//!   --kafka-brokers localhost:9092 \
//!   --batch-size 5000 --key-column user_id
//!
//! # Tail a table by cursor until interrupted
//! ch-sync export --table events --cursor-column id --cursor-start 1000 --watch
//! ```
//!
//! ## Sync
//! ```bash
//! # Prepare topics for every table in tables.yaml without exporting
//! ch-sync sync --tables-file tables.yaml --prepare-only
//!
//! # Recreate topics and export two tables, continuing past failures
//! ch-sync sync --tables events,users --recreate-topic --continue-on-error
//! ```
//!
//! ## Topics and counts
//! ```bash
//! ch-sync topic create --topic analytics_events --partitions 6
//! ch-sync topic wait --topic analytics_events --timeout 30s
//! ch-sync topic info --topic analytics_events
//! ch-sync topic list
//! ch-sync count --ch-database analytics
//!
//! # Compare source tables with the views fed from their topics
//! ch-sync count --with-mv --diff --target-database analytics_replica
//! ```

use anyhow::Context;
use ch_sync::config::{
    load_tables_file, lookup, parse_duration, resolve_clickhouse, resolve_table, AppConfig,
    LogFormat, TableEntry, DEFAULT_BROKER, DEFAULT_REPLICATION_FACTOR,
};
use ch_sync::count::{count_all, count_table, ViewComparison};
use ch_sync::logging::init_logging;
use ch_sync::progress::ProgressPrinter;
use ch_sync::sync::{apply_target_cursor, run_sync, SyncOptions};
use ch_sync::{table_overrides, BatchOpts, ClickHouseOpts, KafkaOpts, TableOpts};
use ch_sync_clickhouse_source::ClickHouseSource;
use ch_sync_export::{export_table, MessageSink, TopicReadiness};
use ch_sync_kafka_sink::{KafkaSink, TopicAdmin};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "ch-sync")]
#[command(about = "Incrementally export ClickHouse tables into Kafka topics")]
#[command(long_about = None)]
struct Cli {
    /// Config file (default: the first of ch-sync.toml, .yaml, .yml or .json in the working directory)
    #[arg(long, global = true, env = "CH_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Tables file with per-table overrides
    #[arg(long, global = true, env = "CH_SYNC_TABLES_FILE")]
    tables_file: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    clickhouse: ClickHouseOpts,

    #[command(flatten)]
    kafka: KafkaOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export one table into its topic
    Export {
        /// Source table
        #[arg(long)]
        table: String,

        #[command(flatten)]
        batch: BatchOpts,

        #[command(flatten)]
        table_opts: TableOpts,
    },

    /// Prepare topics for, and export, every table in the tables file
    Sync {
        /// Only these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        #[command(flatten)]
        batch: BatchOpts,

        /// Replication factor for created topics
        #[arg(long)]
        replication_factor: Option<i32>,

        /// Record failures and continue with the next table
        #[arg(long)]
        continue_on_error: bool,

        /// Create topics but do not export
        #[arg(long)]
        prepare_only: bool,

        /// Ignore cursor settings and export whole tables
        #[arg(long)]
        full_export: bool,

        /// Delete and recreate each topic before exporting
        #[arg(long)]
        recreate_topic: bool,
    },

    /// Print estimated row counts
    Count {
        /// Only this table (always compared with its view)
        #[arg(long)]
        table: Option<String>,

        /// Also count each table's mv_from_kafka_<table> view
        #[arg(long)]
        with_mv: bool,

        /// Flag tables whose view count differs (implies --with-mv)
        #[arg(long)]
        diff: bool,

        /// Database holding the views
        #[arg(long)]
        target_database: Option<String>,
    },

    /// Topic administration
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },
}

#[derive(Subcommand)]
enum TopicAction {
    /// Create a topic unless it already exists, then wait until it is ready
    Create {
        #[arg(long)]
        topic: String,

        #[arg(long, default_value = "1")]
        partitions: i32,

        #[arg(long)]
        replication_factor: Option<i32>,
    },

    /// Delete a topic if it exists
    Delete {
        #[arg(long)]
        topic: String,
    },

    /// Wait until every broker reports the topic
    Wait {
        #[arg(long)]
        topic: String,

        /// e.g. "10s"
        #[arg(long, default_value = "10s")]
        timeout: String,
    },

    /// List topic names
    List,

    /// Print the number of topics
    Count,

    /// Show partition layout; of one topic with its message count, or of every topic
    Info {
        #[arg(long)]
        topic: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let (file, config_path) = AppConfig::load(cli.config.as_deref(), &cwd)?;

    let log_level = cli.log_level.as_deref().or(file.logging.level.as_deref());
    let log_format = cli.log_format.unwrap_or(file.logging.format);
    let log_file = cli.log_file.as_deref().or(file.logging.file.as_deref());
    init_logging(log_level, log_format, log_file)?;
    if let Some(path) = &config_path {
        info!(path = %path.display(), "Loaded config file");
    }

    let tables_path = cli.tables_file.clone().or_else(|| file.sync.tables_file.clone());
    let ch_config = resolve_clickhouse(&(&cli.clickhouse).into(), &file);
    let progress = ProgressPrinter::stdout();

    match cli.command {
        Commands::Export {
            table,
            batch,
            table_opts,
        } => {
            let entries = load_optional_tables(tables_path.as_deref())?;
            let overrides = table_overrides(&cli.clickhouse, &cli.kafka, &batch, Some(&table_opts));
            let mut resolved = resolve_table(&table, &overrides, lookup(&entries, &table), &file)?;

            let source = connect(ch_config).await?;
            if batch.cursor_start_from_target {
                apply_target_cursor(&source, &mut resolved).await?;
            }

            let topic = resolved.export.resolved_topic();
            let admin = TopicAdmin::new(resolved.brokers.clone());
            let sink = KafkaSink::new(&resolved.brokers, &topic)?;

            tokio::select! {
                result = export_table(&source, &sink, &admin, &progress, &resolved.export) => {
                    let summary = result.with_context(|| {
                        format!("Export of {}.{} failed", resolved.export.database, table)
                    })?;
                    info!(
                        topic = %summary.topic,
                        rows = summary.total_rows,
                        batches = summary.batches,
                        "Export finished"
                    );
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping export");
                    sink.close().await.context("Failed to flush producer")?;
                }
            }
        }
        Commands::Sync {
            tables,
            batch,
            replication_factor,
            continue_on_error,
            prepare_only,
            full_export,
            recreate_topic,
        } => {
            let path = tables_path.context("sync needs a tables file (--tables-file or sync.tables_file)")?;
            let entries = load_tables_file(&path)?;
            let overrides = table_overrides(&cli.clickhouse, &cli.kafka, &batch, None);
            let options = SyncOptions {
                tables,
                continue_on_error,
                prepare_only,
                full_export,
                recreate_topic,
                replication_factor: replication_factor
                    .or(file.sync.replication_factor)
                    .unwrap_or(DEFAULT_REPLICATION_FACTOR),
                cursor_start_from_target: batch.cursor_start_from_target,
            };

            let source = connect(ch_config).await?;
            let summary = run_sync(&source, &file, &overrides, &entries, &options, &progress).await?;
            println!("{}", serde_json::to_string(&summary)?);
            if summary.failed > 0 {
                anyhow::bail!("{} of {} tables failed", summary.failed, summary.tables.len());
            }
        }
        Commands::Count {
            table,
            with_mv,
            diff,
            target_database,
        } => {
            let database = ch_config.database.clone();
            let source = connect(ch_config).await?;
            match table {
                Some(table) => {
                    let entries = load_optional_tables(tables_path.as_deref())?;
                    let batch = BatchOpts {
                        target_database,
                        ..BatchOpts::default()
                    };
                    let overrides = table_overrides(&cli.clickhouse, &cli.kafka, &batch, None);
                    let resolved = resolve_table(&table, &overrides, lookup(&entries, &table), &file)?;
                    let comparison = ViewComparison {
                        target_database: resolved.target_database.clone(),
                        diff,
                    };
                    let count = count_table(&source, &resolved.export.database, &table, &comparison).await?;
                    let mut out = serde_json::to_value(&count)?;
                    out["database"] = json!(resolved.export.database);
                    println!("{out}");
                }
                None => {
                    let comparison = (with_mv || diff).then(|| ViewComparison {
                        target_database: target_database
                            .or_else(|| file.sync.target_database.clone())
                            .unwrap_or_else(|| database.clone()),
                        diff,
                    });
                    let report = count_all(&source, &database, comparison.as_ref()).await?;
                    if diff {
                        for table in &report.tables {
                            println!("{}", serde_json::to_string(table)?);
                        }
                    } else {
                        println!("{}", serde_json::to_string(&report)?);
                    }
                }
            }
        }
        Commands::Topic { action } => {
            let mut brokers = cli.kafka.brokers();
            if brokers.is_empty() {
                brokers = file.kafka.brokers.clone();
            }
            if brokers.is_empty() {
                brokers = vec![DEFAULT_BROKER.to_string()];
            }
            let admin = TopicAdmin::new(brokers);
            match action {
                TopicAction::Create {
                    topic,
                    partitions,
                    replication_factor,
                } => {
                    let replication = replication_factor
                        .or(file.sync.replication_factor)
                        .unwrap_or(DEFAULT_REPLICATION_FACTOR);
                    let created = admin
                        .ensure_topic(&topic, partitions, replication)
                        .await
                        .with_context(|| format!("Failed to create topic {topic}"))?;
                    println!("{}", json!({ "topic": topic, "created": created }));
                }
                TopicAction::Delete { topic } => {
                    admin
                        .delete_topic(&topic)
                        .await
                        .with_context(|| format!("Failed to delete topic {topic}"))?;
                    println!("{}", json!({ "topic": topic, "deleted": true }));
                }
                TopicAction::Wait { topic, timeout } => {
                    let timeout = parse_duration(&timeout)?;
                    admin
                        .wait_ready(&topic, timeout)
                        .await
                        .with_context(|| format!("Topic {topic} did not become ready"))?;
                    println!("{}", json!({ "topic": topic, "ready": true }));
                }
                TopicAction::List => {
                    let topics = admin.list_topics().await.context("Failed to list topics")?;
                    println!(
                        "{}",
                        json!({ "brokers": admin.brokers(), "count": topics.len(), "topics": topics })
                    );
                }
                TopicAction::Count => {
                    let topics = admin.list_topics().await.context("Failed to list topics")?;
                    println!("{}", json!({ "brokers": admin.brokers(), "topics": topics.len() }));
                }
                TopicAction::Info { topic: Some(topic) } => {
                    let info = admin
                        .topic_info(&topic)
                        .await
                        .with_context(|| format!("Failed to describe topic {topic}"))?;
                    let messages = admin
                        .message_count(&topic)
                        .await
                        .with_context(|| format!("Failed to count messages of {topic}"))?;
                    let mut out = serde_json::to_value(&info)?;
                    out["messages"] = json!(messages);
                    out["brokers"] = json!(admin.brokers());
                    println!("{out}");
                }
                TopicAction::Info { topic: None } => {
                    let topics = admin.topics_info().await.context("Failed to describe topics")?;
                    println!(
                        "{}",
                        json!({ "brokers": admin.brokers(), "topics": topics.len(), "items": topics })
                    );
                }
            }
        }
    }

    Ok(())
}

/// Build the source and make sure the server answers before any work starts.
async fn connect(config: ch_sync_clickhouse_source::ClickHouseConfig) -> anyhow::Result<ClickHouseSource> {
    let url = config.url.clone();
    let source = ClickHouseSource::new(config)?;
    source
        .ping()
        .await
        .with_context(|| format!("ClickHouse at {url} is not reachable"))?;
    Ok(source)
}

fn load_optional_tables(path: Option<&Path>) -> anyhow::Result<Vec<TableEntry>> {
    match path {
        Some(p) => load_tables_file(p),
        None => Ok(Vec::new()),
    }
}
