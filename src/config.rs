// src/config.rs

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::duck::validate_identifier;
use crate::error::{Error, Result};
use crate::fetch::DatasetSource;

/// How the loader treats an existing target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Drop and recreate the table.
    #[default]
    Replace,
    /// Create the table if missing, then insert without clearing.
    Append,
}

/// Failure policy for `order_date` values that do not match the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DateParsing {
    /// Unparseable dates become null.
    #[default]
    Lenient,
    /// The first unparseable date fails the run.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `:memory:`, a DuckDB file path, or `duckdb://<path>`.
    pub connection: String,
    pub table: String,
    pub mode: LoadMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection: "retail_orders.duckdb".into(),
            table: "orders".into(),
            mode: LoadMode::Replace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// chrono format string for `order_date`.
    pub date_format: String,
    pub date_parsing: DateParsing,
    /// Cell values treated as missing, compared after trimming.
    pub na_values: Vec<String>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".into(),
            date_parsing: DateParsing::Lenient,
            na_values: vec!["".into(), "Not Available".into(), "unknown".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: Option<DatasetSource>,
    /// Where remote downloads are cached.
    pub cache_dir: PathBuf,
    /// Re-download even when the cached artifact exists.
    pub refresh: bool,
    pub store: StoreConfig,
    pub transform: TransformConfig,
    /// Optional Parquet snapshot of the transformed table.
    pub snapshot: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: None,
            cache_dir: PathBuf::from("cache"),
            refresh: false,
            store: StoreConfig::default(),
            transform: TransformConfig::default(),
            snapshot: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: Self =
            serde_yaml::from_str(s).map_err(|e| Error::Config(format!("parsing YAML: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    /// Checks the settings that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.store.table)?;
        if self.transform.date_format.trim().is_empty() {
            return Err(Error::Config("date_format must not be empty".into()));
        }
        Ok(())
    }
}
