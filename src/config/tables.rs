//! The tables file: per-table overrides for `export` and `sync`.
//!
//! Either a bare YAML list of entries or a mapping with a `tables` key.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TableEntry {
    pub name: String,
    pub brokers: Vec<String>,
    pub topic: Option<String>,
    pub batch_size: Option<usize>,
    pub rows_per_partition: Option<i64>,
    /// Source database, when it differs from the connection default.
    pub current_database: Option<String>,
    pub target_database: Option<String>,
    pub target_table: Option<String>,
    #[serde(alias = "order_by")]
    pub export_order_by: Option<String>,
    #[serde(alias = "key_column")]
    pub export_key_column: Option<String>,
    pub cursor_column: Option<String>,
    pub cursor_start: Option<String>,
    pub cursor_end: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TablesDocument {
    Wrapped { tables: Vec<TableEntry> },
    List(Vec<TableEntry>),
}

pub fn parse_tables(content: &str) -> anyhow::Result<Vec<TableEntry>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: TablesDocument = serde_yaml::from_str(content)
        .context("Tables file must be a list of tables or a mapping with a 'tables' list")?;
    let tables = match doc {
        TablesDocument::Wrapped { tables } | TablesDocument::List(tables) => tables,
    };

    let mut seen = HashSet::new();
    for (i, t) in tables.iter().enumerate() {
        if t.name.trim().is_empty() {
            bail!("Table entry #{} has no name", i + 1);
        }
        if !seen.insert(t.name.as_str()) {
            bail!("Table {} is listed more than once", t.name);
        }
    }
    Ok(tables)
}

pub fn load_tables_file(path: &Path) -> anyhow::Result<Vec<TableEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read tables file {}", path.display()))?;
    parse_tables(&content).with_context(|| format!("Invalid tables file {}", path.display()))
}

/// Find the entry for `table`, if the file lists it.
pub fn lookup<'a>(tables: &'a [TableEntry], table: &str) -> Option<&'a TableEntry> {
    tables.iter().find(|t| t.name == table)
}
