// ABOUTME: Multi-table orchestration under one shared transaction
// ABOUTME: Loads all files up front, orders tables by dependency and applies phases atomically

use std::time::Duration;
use tokio_postgres::Transaction;

use crate::config::{RootConfig, SyncConfig};
use crate::db;
use crate::error::{Result, SyncError};
use crate::graph::{self, SyncOrder};
use crate::loader::{self, LoadedFile};
use crate::sync::engine::{self, PreparedTable, SyncContext};
use crate::sync::plan::ExecutionPlan;

/// Run the configured sync, all-or-nothing.
///
/// Dependency resolution and file loading both happen before any database
/// connection is attempted, so configuration mistakes fail fast. The whole
/// run operates under the configured outer deadline; expiry drops the
/// transaction, which rolls back on the server.
pub async fn run(config: &RootConfig, ctx: &SyncContext) -> Result<Vec<ExecutionPlan>> {
    config.validate()?;

    let tables = config.table_configs();
    let order = graph::sync_order(&tables)?;

    let mut files: Vec<LoadedFile> = Vec::with_capacity(tables.len());
    for cfg in &tables {
        files.push(loader::load_file(&cfg.file)?);
    }

    let limit_secs = config.timeout_secs;
    match tokio::time::timeout(
        Duration::from_secs(limit_secs),
        run_transaction(config, &tables, &order, &files, ctx),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(SyncError::DeadlineExceeded { limit_secs }),
    }
}

async fn run_transaction(
    config: &RootConfig,
    tables: &[&SyncConfig],
    order: &SyncOrder,
    files: &[LoadedFile],
    ctx: &SyncContext,
) -> Result<Vec<ExecutionPlan>> {
    let mut client = db::connect(&config.db).await?;
    let tx = client
        .transaction()
        .await
        .map_err(|e| SyncError::TransactionBegin { source: e })?;

    let plans = if tables.len() == 1 {
        vec![engine::sync_table(&tx, tables[0], &files[0], ctx).await?]
    } else {
        run_phases(&tx, tables, order, files, ctx).await?
    };

    // The transaction rolls back on drop for every error path above.
    if ctx.dry_run {
        tracing::info!("Dry run: rolling back");
        tx.rollback()
            .await
            .map_err(|e| SyncError::Rollback { source: e })?;
    } else {
        tx.commit().await.map_err(|e| SyncError::Commit { source: e })?;
    }

    Ok(plans)
}

/// Multi-table discipline: prepare every table's change set in insert order,
/// run every table's delete phase in delete order (children before parents,
/// overwrite clears included), then every insert/update phase in insert order.
async fn run_phases(
    tx: &Transaction<'_>,
    tables: &[&SyncConfig],
    order: &SyncOrder,
    files: &[LoadedFile],
    ctx: &SyncContext,
) -> Result<Vec<ExecutionPlan>> {
    let mut prepared: Vec<Option<PreparedTable>> = (0..tables.len()).map(|_| None).collect();
    for &idx in &order.insert_order {
        prepared[idx] = Some(engine::prepare(tx, tables[idx], &files[idx]).await?);
    }

    for idx in order.delete_order() {
        let table = prepared[idx].as_ref().expect("every table is prepared");
        let deleted = table.apply_deletes(tx).await?;
        if deleted > 0 {
            tracing::info!("Table '{}': deleted {} row(s)", table.table(), deleted);
        }
    }

    for &idx in &order.insert_order {
        let table = prepared[idx].as_ref().expect("every table is prepared");
        let (inserted, updated) = table.apply_upserts(tx, ctx.sync_time).await?;
        tracing::info!(
            "Table '{}': {} inserted, {} updated",
            table.table(),
            inserted,
            updated
        );
    }

    let mut plans = Vec::with_capacity(tables.len());
    for &idx in &order.insert_order {
        let table = prepared[idx].take().expect("every table is prepared");
        plans.push(table.into_plan());
    }
    Ok(plans)
}
