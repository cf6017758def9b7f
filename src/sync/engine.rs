// ABOUTME: Single-table sync engine composing reconciliation, validation, diffing and DML
// ABOUTME: Splits each table into a prepare phase plus delete and upsert phases

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio_postgres::Transaction;

use crate::config::{SyncConfig, SyncMode};
use crate::error::{Result, SyncError};
use crate::loader::LoadedFile;
use crate::record::{Record, Value};
use crate::sync::columns::reconcile_columns;
use crate::sync::diff::{compute_diff, DiffSpec, TableDiff};
use crate::sync::executor::DmlExecutor;
use crate::sync::plan::ExecutionPlan;
use crate::sync::validator::{check_primary_keys, ValidationMode};

/// Run-wide context shared by every table of a sync invocation.
///
/// The wall clock is captured once at startup and reused for every timestamp
/// column, so a single run stamps all affected rows uniformly.
#[derive(Debug, Clone, Copy)]
pub struct SyncContext {
    pub dry_run: bool,
    pub sync_time: DateTime<Utc>,
}

impl SyncContext {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            sync_time: Utc::now(),
        }
    }

    /// Fixed-clock constructor for deterministic tests.
    pub fn with_time(dry_run: bool, sync_time: DateTime<Utc>) -> Self {
        Self { dry_run, sync_time }
    }
}

/// One column of the target table, as reported by the catalog.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

enum PendingOps {
    Overwrite { rows: Vec<Record> },
    Differential { diff: TableDiff },
}

/// A table whose change set has been computed inside the transaction but not
/// yet applied. The orchestrator runs the delete phase of every table before
/// any upsert phase; `sync_table` applies both phases back to back.
pub struct PreparedTable {
    table: String,
    mode: SyncMode,
    primary_key: String,
    sync_columns: Vec<String>,
    insert_columns: Vec<String>,
    stamp_columns: Vec<String>,
    set_columns: Vec<String>,
    timestamp_columns: Vec<String>,
    immutable_columns: Vec<String>,
    column_types: HashMap<String, String>,
    source_rows: usize,
    db_rows: usize,
    ops: PendingOps,
}

impl PreparedTable {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Destructive phase: clear the table (overwrite) or remove the rows the
    /// file no longer carries (differential with delete-not-in-file).
    pub async fn apply_deletes(&self, tx: &Transaction<'_>) -> Result<u64> {
        let executor = DmlExecutor::new(tx, &self.table, &self.column_types);
        match &self.ops {
            PendingOps::Overwrite { .. } => executor.delete_all().await,
            PendingOps::Differential { diff } => {
                executor
                    .delete_records(&self.primary_key, &diff.to_delete)
                    .await
            }
        }
    }

    /// Constructive phase: inserts, then updates.
    pub async fn apply_upserts(
        &self,
        tx: &Transaction<'_>,
        sync_time: DateTime<Utc>,
    ) -> Result<(u64, u64)> {
        let executor = DmlExecutor::new(tx, &self.table, &self.column_types);
        match &self.ops {
            PendingOps::Overwrite { rows } => {
                let inserted = executor
                    .insert_records(&self.insert_columns, rows, &self.stamp_columns, sync_time)
                    .await?;
                Ok((inserted, 0))
            }
            PendingOps::Differential { diff } => {
                let inserted = executor
                    .insert_records(
                        &self.insert_columns,
                        &diff.to_insert,
                        &self.stamp_columns,
                        sync_time,
                    )
                    .await?;
                let updated = executor
                    .update_records(
                        &self.set_columns,
                        &self.primary_key,
                        &diff.to_update,
                        &self.stamp_columns,
                        sync_time,
                    )
                    .await?;
                Ok((inserted, updated))
            }
        }
    }

    pub fn into_plan(self) -> ExecutionPlan {
        let (inserts, updates, deletes) = match self.ops {
            PendingOps::Overwrite { rows } => (rows, Vec::new(), Vec::new()),
            PendingOps::Differential { diff } => (diff.to_insert, diff.to_update, diff.to_delete),
        };
        ExecutionPlan {
            table: self.table,
            mode: self.mode,
            primary_key: self.primary_key,
            source_rows: self.source_rows,
            db_rows: self.db_rows,
            inserts,
            updates,
            deletes,
            sync_columns: self.sync_columns,
            timestamp_columns: self.timestamp_columns,
            immutable_columns: self.immutable_columns,
        }
    }
}

/// Prepare one table: introspect its columns, reconcile the sync-column set,
/// gate differential mode behind strict primary-key validation, and compute
/// the pending change set.
pub async fn prepare(
    tx: &Transaction<'_>,
    cfg: &SyncConfig,
    file: &LoadedFile,
) -> Result<PreparedTable> {
    let mode = cfg.sync_mode()?;
    let table = cfg.table.as_str();
    let primary_key = cfg.primary_key.as_str();

    let column_info = fetch_table_columns(tx, table).await?;
    let db_columns: Vec<String> = column_info.iter().map(|c| c.name.clone()).collect();
    let column_types: HashMap<String, String> = column_info
        .into_iter()
        .map(|c| (c.name, c.data_type))
        .collect();

    let sync_columns =
        reconcile_columns(table, &file.headers, &db_columns, &cfg.columns, primary_key)?;
    tracing::debug!(
        "Table '{}': syncing columns [{}]",
        table,
        sync_columns.join(", ")
    );

    // Timestamp columns must exist in the table to be stamped.
    let timestamp_columns: Vec<String> = cfg
        .timestamp_columns
        .iter()
        .filter(|column| {
            let present = db_columns.contains(*column);
            if !present {
                tracing::warn!(
                    "Timestamp column '{}' does not exist in table '{}', ignoring",
                    column,
                    table
                );
            }
            present
        })
        .cloned()
        .collect();

    // Columns stamped with the run clock: timestamp columns the file does not provide.
    let stamp_columns: Vec<String> = timestamp_columns
        .iter()
        .filter(|column| !sync_columns.contains(*column))
        .cloned()
        .collect();

    let mut insert_columns = sync_columns.clone();
    insert_columns.extend(stamp_columns.iter().cloned());

    let set_columns: Vec<String> = insert_columns
        .iter()
        .filter(|column| column.as_str() != primary_key)
        .filter(|column| !cfg.immutable_columns.contains(*column))
        .cloned()
        .collect();

    let (db_rows, ops) = match mode {
        SyncMode::Overwrite => {
            let db_rows = count_rows(tx, table).await?;
            (
                db_rows,
                PendingOps::Overwrite {
                    rows: file.records.clone(),
                },
            )
        }
        SyncMode::Differential => {
            check_primary_keys(
                table,
                &file.records,
                primary_key,
                cfg.pk_max_length,
                ValidationMode::Strict,
            )?;

            let db_records = fetch_existing_rows(tx, table, primary_key, &sync_columns).await?;
            let db_rows = db_records.len();

            let spec = DiffSpec {
                primary_key,
                sync_columns: &sync_columns,
                immutable_columns: &cfg.immutable_columns,
                delete_not_in_file: cfg.delete_not_in_file,
            };
            let diff = compute_diff(&spec, &file.records, &db_records);
            tracing::info!(
                "Table '{}': {} to insert, {} to update, {} to delete",
                table,
                diff.to_insert.len(),
                diff.to_update.len(),
                diff.to_delete.len()
            );
            (db_rows, PendingOps::Differential { diff })
        }
    };

    Ok(PreparedTable {
        table: table.to_string(),
        mode,
        primary_key: primary_key.to_string(),
        sync_columns,
        insert_columns,
        stamp_columns,
        set_columns,
        timestamp_columns,
        immutable_columns: cfg.immutable_columns.clone(),
        column_types,
        source_rows: file.records.len(),
        db_rows,
        ops,
    })
}

/// Synchronize one table within the given transaction.
///
/// Overwrite clears the table before inserting; differential applies inserts,
/// then updates, then deletes, which keeps the row count monotone on average
/// and avoids transient primary-key gaps for concurrent readers.
pub async fn sync_table(
    tx: &Transaction<'_>,
    cfg: &SyncConfig,
    file: &LoadedFile,
    ctx: &SyncContext,
) -> Result<ExecutionPlan> {
    let prepared = prepare(tx, cfg, file).await?;

    match prepared.mode {
        SyncMode::Overwrite => {
            let deleted = prepared.apply_deletes(tx).await?;
            let (inserted, _) = prepared.apply_upserts(tx, ctx.sync_time).await?;
            tracing::info!(
                "Table '{}': overwrote {} row(s) with {} row(s)",
                prepared.table,
                deleted,
                inserted
            );
        }
        SyncMode::Differential => {
            let (inserted, updated) = prepared.apply_upserts(tx, ctx.sync_time).await?;
            let deleted = prepared.apply_deletes(tx).await?;
            tracing::info!(
                "Table '{}': {} inserted, {} updated, {} deleted",
                prepared.table,
                inserted,
                updated,
                deleted
            );
        }
    }

    Ok(prepared.into_plan())
}

/// Column names and data types of the target table, in ordinal order.
pub async fn fetch_table_columns(tx: &Transaction<'_>, table: &str) -> Result<Vec<ColumnInfo>> {
    let rows = tx
        .query(
            "SELECT column_name, data_type
             FROM information_schema.columns
             WHERE table_schema = current_schema() AND table_name = $1
             ORDER BY ordinal_position",
            &[&table],
        )
        .await
        .map_err(|e| SyncError::DbIntrospection {
            table: table.to_string(),
            source: e,
        })?;

    if rows.is_empty() {
        return Err(SyncError::TableNotFound {
            table: table.to_string(),
        });
    }

    Ok(rows
        .iter()
        .map(|row| ColumnInfo {
            name: row.get(0),
            data_type: row.get(1),
        })
        .collect())
}

/// Read the current rows into a map keyed by canonical primary-key value.
///
/// Every selected column is cast to text server-side, so DB values arrive in
/// their canonical form and compare directly against file values.
pub async fn fetch_existing_rows(
    tx: &Transaction<'_>,
    table: &str,
    primary_key: &str,
    sync_columns: &[String],
) -> Result<BTreeMap<String, Record>> {
    let select_list: Vec<String> = sync_columns
        .iter()
        .map(|column| format!("\"{}\"::text", column))
        .collect();
    let query = format!("SELECT {} FROM \"{}\"", select_list.join(", "), table);

    let rows = tx
        .query(&query, &[])
        .await
        .map_err(|e| SyncError::SelectFailed {
            table: table.to_string(),
            source: e,
        })?;

    let mut records = BTreeMap::new();
    for row in rows {
        let mut record = Record::new();
        for (idx, column) in sync_columns.iter().enumerate() {
            let value: Option<String> = row.get(idx);
            record.insert(column.clone(), value.map(Value::Text).unwrap_or(Value::Null));
        }
        let pk = record.canonical(primary_key);
        if pk.is_empty() {
            tracing::warn!("Ignoring row with null primary key in table '{}'", table);
            continue;
        }
        records.insert(pk, record);
    }

    Ok(records)
}

async fn count_rows(tx: &Transaction<'_>, table: &str) -> Result<usize> {
    let query = format!("SELECT COUNT(*) FROM \"{}\"", table);
    let row = tx
        .query_one(&query, &[])
        .await
        .map_err(|e| SyncError::SelectFailed {
            table: table.to_string(),
            source: e,
        })?;
    let count: i64 = row.get(0);
    Ok(count as usize)
}
