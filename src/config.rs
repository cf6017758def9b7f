// ABOUTME: TOML configuration model for sync runs
// ABOUTME: Supports the legacy single-table block and the multi-table list with dependencies

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PK_MAX_LENGTH: usize = 255;

/// How a table is synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Delete every existing row, then insert the full file contents.
    Overwrite,
    /// Diff the file against existing rows and issue only the necessary DML.
    Differential,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Overwrite => "overwrite",
            SyncMode::Differential => "differential",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-table sync options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncConfig {
    /// Path to the source file (.csv or .json)
    #[serde(default)]
    pub file: PathBuf,
    /// Target table name
    #[serde(default)]
    pub table: String,
    /// Optional column allow-list; empty means every common column is synced
    #[serde(default)]
    pub columns: Vec<String>,
    /// Primary-key column; required for differential mode
    #[serde(default)]
    pub primary_key: String,
    /// "overwrite" or "differential"
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Differential only: delete DB rows whose primary key is absent from the file
    #[serde(default)]
    pub delete_not_in_file: bool,
    /// Columns stamped with the run's wall clock on every written row
    #[serde(default)]
    pub timestamp_columns: Vec<String>,
    /// Columns never touched by UPDATE statements
    #[serde(default)]
    pub immutable_columns: Vec<String>,
    /// Tables that must exist before this one (multi-table mode)
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Maximum accepted primary-key length
    #[serde(default = "default_pk_max_length")]
    pub pk_max_length: usize,
}

impl SyncConfig {
    pub fn sync_mode(&self) -> Result<SyncMode> {
        match self.mode.as_str() {
            "overwrite" => Ok(SyncMode::Overwrite),
            "differential" => Ok(SyncMode::Differential),
            other => Err(SyncError::InvalidSyncMode {
                table: self.table.clone(),
                mode: other.to_string(),
            }),
        }
    }
}

fn default_mode() -> String {
    "overwrite".to_string()
}

fn default_pk_max_length() -> usize {
    DEFAULT_PK_MAX_LENGTH
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Root configuration: database endpoint plus either the legacy single-table
/// `[sync]` block or the multi-table `[[tables]]` list. When both are present
/// the `tables` list wins. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RootConfig {
    /// Database endpoint descriptor, passed through to the driver opaquely
    #[serde(default)]
    pub db: String,
    /// Compute and report the execution plan, then roll back
    #[serde(default)]
    pub dry_run: bool,
    /// Outer deadline for the whole run, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub sync: Option<SyncConfig>,
    #[serde(default)]
    pub tables: Vec<SyncConfig>,
}

impl RootConfig {
    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| SyncError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| SyncError::ConfigParse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// The effective table list.
    pub fn table_configs(&self) -> Vec<&SyncConfig> {
        if !self.tables.is_empty() {
            self.tables.iter().collect()
        } else {
            self.sync.iter().collect()
        }
    }

    /// Structural validation, run once at startup before any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.db.trim().is_empty() {
            return Err(SyncError::MissingEndpoint);
        }

        let tables = self.table_configs();
        if tables.is_empty() {
            return Err(SyncError::NoTablesConfigured);
        }

        for (index, cfg) in tables.iter().enumerate() {
            if cfg.table.trim().is_empty() {
                return Err(SyncError::MissingTableName { index });
            }
            let mode = cfg.sync_mode()?;
            if mode == SyncMode::Differential && cfg.primary_key.trim().is_empty() {
                return Err(SyncError::MissingPrimaryKey {
                    table: cfg.table.clone(),
                });
            }
        }

        Ok(())
    }
}
