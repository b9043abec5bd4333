//! Configuration sources for the `ch-sync` binary.

pub mod duration;
pub mod file;
pub mod resolve;
pub mod tables;

pub use duration::parse_duration;
pub use file::{AppConfig, LogFormat};
pub use resolve::{
    resolve_clickhouse, resolve_table, split_brokers, ConnectionOverrides, ResolvedTable,
    TableOverrides, DEFAULT_BROKER, DEFAULT_REPLICATION_FACTOR,
};
pub use tables::{load_tables_file, lookup, TableEntry};
