//! The `ch-sync` configuration file.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// File names looked for in the working directory when `--config` is not given.
pub const DISCOVERED_NAMES: [&str; 4] = ["ch-sync.toml", "ch-sync.yaml", "ch-sync.yml", "ch-sync.json"];

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub clickhouse: ClickHouseSection,
    pub kafka: KafkaSection,
    pub sync: SyncSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClickHouseSection {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct KafkaSection {
    pub brokers: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSection {
    pub batch_size: Option<usize>,
    pub rows_per_partition: Option<i64>,
    pub replication_factor: Option<i32>,
    pub tables_file: Option<PathBuf>,
    pub target_database: Option<String>,
    /// Watch-mode poll interval, e.g. "5s".
    pub poll_interval: Option<String>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub format: LogFormat,
    /// Append logs to this file instead of writing them to stderr.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl AppConfig {
    /// Load an explicit file, or the first discovered one in `dir`.
    ///
    /// With neither, the built-in defaults apply.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => DISCOVERED_NAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.is_file()),
        };
        match path {
            Some(p) => {
                let config = Self::from_file(&p)?;
                Ok((config, Some(p)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    /// Parse a TOML, YAML or JSON file, chosen by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "toml" => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config {}", path.display())),
            "yaml" | "yml" => {
                if content.trim().is_empty() {
                    return Ok(Self::default());
                }
                serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse YAML config {}", path.display()))
            }
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config {}", path.display())),
            other => bail!(
                "Unsupported config file extension '{other}' for {} (expected toml, yaml, yml or json)",
                path.display()
            ),
        }
    }
}
