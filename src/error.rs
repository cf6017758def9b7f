// ABOUTME: Error kinds surfaced by the sync engine and orchestrator
// ABOUTME: Each failure class is a distinct variant carrying table and operation context

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::sync::validator::ValidationReport;

/// All failure kinds produced by configuration loading, pre-flight checks and
/// sync execution. Database errors keep their `tokio_postgres` source attached.
#[derive(Debug, Error)]
pub enum SyncError {
    // Configuration
    #[error("no database endpoint configured (set `db` in the config file)")]
    MissingEndpoint,

    #[error("sync entry {index} has no target table name")]
    MissingTableName { index: usize },

    #[error("table '{table}' uses differential mode but declares no primary key")]
    MissingPrimaryKey { table: String },

    #[error("table '{table}' has invalid sync mode '{mode}' (expected 'overwrite' or 'differential')")]
    InvalidSyncMode { table: String, mode: String },

    #[error("table '{table}' is declared more than once")]
    DuplicateTable { table: String },

    #[error("table '{table}' depends on undeclared table '{dependency}'")]
    UnknownDependency { table: String, dependency: String },

    #[error("dependency cycle detected involving table '{table}'")]
    CycleDetected { table: String },

    #[error("configuration declares no tables to sync")]
    NoTablesConfigured,

    #[error("failed to parse configuration file {path:?}: {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    // Pre-flight
    #[error("source file for table '{table}' has no header columns")]
    EmptySourceHeader { table: String },

    #[error("no common columns between the source file and table '{table}'")]
    NoCommonColumns { table: String },

    #[error("primary key '{column}' of table '{table}' is not in the sync column set")]
    PrimaryKeyNotInSyncColumns { table: String, column: String },

    #[error("primary key validation failed for table '{table}'\n{report}")]
    PrimaryKeyValidationFailed {
        table: String,
        report: ValidationReport,
    },

    // I/O and connectivity
    #[error("failed to read source file {path:?}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse source file {path:?}: {detail}")]
    FileParse { path: PathBuf, detail: String },

    #[error("unsupported source file format {path:?} (expected .csv or .json)")]
    FileFormatUnsupported { path: PathBuf },

    #[error("failed to connect to the database")]
    DbConnect {
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to introspect columns of table '{table}'")]
    DbIntrospection {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("table '{table}' does not exist in the target database")]
    TableNotFound { table: String },

    // Execution
    #[error("failed to query existing rows of table '{table}'")]
    SelectFailed {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("bulk insert into table '{table}' failed")]
    InsertFailed {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("update of row '{pk}' in table '{table}' failed")]
    UpdateFailed {
        table: String,
        pk: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("delete from table '{table}' failed")]
    DeleteFailed {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("cannot bind value '{value}' to column '{column}' ({data_type}) of table '{table}'")]
    ValueBind {
        table: String,
        column: String,
        value: String,
        data_type: String,
    },

    #[error("failed to prepare update statement for table '{table}'")]
    StatementPrepare {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to begin transaction")]
    TransactionBegin {
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to commit transaction")]
    Commit {
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to roll back transaction")]
    Rollback {
        #[source]
        source: tokio_postgres::Error,
    },

    // Lifecycle
    #[error("sync run exceeded the {limit_secs}s deadline")]
    DeadlineExceeded { limit_secs: u64 },

    #[error("sync run was cancelled")]
    Cancelled,
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
