// ABOUTME: Emits the bulk INSERT, prepared UPDATE and IN-list DELETE statements for one table
// ABOUTME: Binds canonical values natively according to the introspected column types

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use tokio_postgres::types::ToSql;
use tokio_postgres::Transaction;

use crate::error::{Result, SyncError};
use crate::record::Record;
use crate::sync::diff::UpdateOp;

/// PostgreSQL caps a statement at ~65535 bind parameters; leave some margin.
const MAX_QUERY_PARAMS: usize = 65_000;

/// Executes the DML for one table within the enclosing transaction.
///
/// Statements are built by the pure `build_*_query` functions below and bound
/// with values parsed from their canonical form into the native type of each
/// target column.
pub struct DmlExecutor<'a, 'b> {
    tx: &'a Transaction<'b>,
    table: &'a str,
    column_types: &'a HashMap<String, String>,
}

impl<'a, 'b> DmlExecutor<'a, 'b> {
    pub fn new(
        tx: &'a Transaction<'b>,
        table: &'a str,
        column_types: &'a HashMap<String, String>,
    ) -> Self {
        Self {
            tx,
            table,
            column_types,
        }
    }

    /// Insert `records` with one multi-row INSERT per parameter-limit chunk.
    ///
    /// Columns listed in `stamp_columns` are bound to the sync's wall-clock
    /// start time instead of a record value, so one run stamps uniformly.
    pub async fn insert_records(
        &self,
        columns: &[String],
        records: &[Record],
        stamp_columns: &[String],
        sync_time: DateTime<Utc>,
    ) -> Result<u64> {
        if records.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let params_per_row = columns.len();
        let batch_size = std::cmp::max(1, MAX_QUERY_PARAMS / params_per_row);

        let mut total_inserted = 0u64;
        for chunk in records.chunks(batch_size) {
            let query = build_insert_query(self.table, columns, chunk.len());

            let mut values: Vec<Box<dyn ToSql + Sync + Send>> =
                Vec::with_capacity(chunk.len() * params_per_row);
            for record in chunk {
                for column in columns {
                    values.push(self.bind_column(record, column, stamp_columns, sync_time)?);
                }
            }

            let params: Vec<&(dyn ToSql + Sync)> = values
                .iter()
                .map(|v| v.as_ref() as &(dyn ToSql + Sync))
                .collect();

            total_inserted += self.tx.execute(&query, &params).await.map_err(|e| {
                SyncError::InsertFailed {
                    table: self.table.to_string(),
                    source: e,
                }
            })?;
        }

        Ok(total_inserted)
    }

    /// Apply each update through one prepared statement, binding the SET
    /// columns in order and the primary-key value last. A failing row aborts
    /// with its primary key attached; the enclosing transaction rolls back.
    pub async fn update_records(
        &self,
        set_columns: &[String],
        primary_key: &str,
        ops: &[UpdateOp],
        stamp_columns: &[String],
        sync_time: DateTime<Utc>,
    ) -> Result<u64> {
        if ops.is_empty() {
            return Ok(0);
        }
        if set_columns.is_empty() {
            tracing::info!(
                "No updatable columns for table '{}', skipping {} updates",
                self.table,
                ops.len()
            );
            return Ok(0);
        }

        let query = build_update_query(self.table, set_columns, primary_key);
        let statement =
            self.tx
                .prepare(&query)
                .await
                .map_err(|e| SyncError::StatementPrepare {
                    table: self.table.to_string(),
                    source: e,
                })?;

        let mut total_updated = 0u64;
        for op in ops {
            let pk_value = op.after.canonical(primary_key);

            let mut values: Vec<Box<dyn ToSql + Sync + Send>> =
                Vec::with_capacity(set_columns.len() + 1);
            for column in set_columns {
                values.push(self.bind_column(&op.after, column, stamp_columns, sync_time)?);
            }
            values.push(self.bind_canonical(primary_key, &pk_value)?);

            let params: Vec<&(dyn ToSql + Sync)> = values
                .iter()
                .map(|v| v.as_ref() as &(dyn ToSql + Sync))
                .collect();

            total_updated += self.tx.execute(&statement, &params).await.map_err(|e| {
                SyncError::UpdateFailed {
                    table: self.table.to_string(),
                    pk: pk_value.clone(),
                    source: e,
                }
            })?;
        }

        Ok(total_updated)
    }

    /// Delete the given rows by primary key with one IN-list statement per
    /// parameter-limit chunk.
    pub async fn delete_records(&self, primary_key: &str, records: &[Record]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut total_deleted = 0u64;
        for chunk in records.chunks(MAX_QUERY_PARAMS) {
            let query = build_delete_query(self.table, primary_key, chunk.len());

            let mut values: Vec<Box<dyn ToSql + Sync + Send>> = Vec::with_capacity(chunk.len());
            for record in chunk {
                let pk_value = record.canonical(primary_key);
                values.push(self.bind_canonical(primary_key, &pk_value)?);
            }

            let params: Vec<&(dyn ToSql + Sync)> = values
                .iter()
                .map(|v| v.as_ref() as &(dyn ToSql + Sync))
                .collect();

            total_deleted += self.tx.execute(&query, &params).await.map_err(|e| {
                SyncError::DeleteFailed {
                    table: self.table.to_string(),
                    source: e,
                }
            })?;
        }

        Ok(total_deleted)
    }

    /// Clear the whole table. DELETE rather than TRUNCATE so the enclosing
    /// transaction can roll it back.
    pub async fn delete_all(&self) -> Result<u64> {
        let query = format!("DELETE FROM {}", quote_ident(self.table));
        self.tx
            .execute(&query, &[])
            .await
            .map_err(|e| SyncError::DeleteFailed {
                table: self.table.to_string(),
                source: e,
            })
    }

    fn bind_column(
        &self,
        record: &Record,
        column: &str,
        stamp_columns: &[String],
        sync_time: DateTime<Utc>,
    ) -> Result<Box<dyn ToSql + Sync + Send>> {
        if stamp_columns.iter().any(|c| c == column) {
            return Ok(self.bind_timestamp(column, sync_time));
        }
        let canonical = record.canonical(column);
        self.bind_canonical(column, &canonical)
    }

    fn bind_canonical(&self, column: &str, canonical: &str) -> Result<Box<dyn ToSql + Sync + Send>> {
        let data_type = self
            .column_types
            .get(column)
            .map(String::as_str)
            .unwrap_or("text");
        bind_value(self.table, column, canonical, data_type)
    }

    /// Bind the run's wall clock in the column's native temporal type.
    fn bind_timestamp(&self, column: &str, sync_time: DateTime<Utc>) -> Box<dyn ToSql + Sync + Send> {
        let data_type = self
            .column_types
            .get(column)
            .map(String::as_str)
            .unwrap_or("text");
        match data_type {
            "timestamp with time zone" | "timestamptz" => Box::new(sync_time),
            "timestamp without time zone" | "timestamp" => Box::new(sync_time.naive_utc()),
            "date" => Box::new(sync_time.date_naive()),
            _ => Box::new(sync_time.to_rfc3339()),
        }
    }
}

/// Parse a canonical value into the native binding for a PostgreSQL type.
///
/// The empty canonical form (null) binds as NULL for every non-text type.
/// Types without a native mapping fall back to a text binding.
fn bind_value(
    table: &str,
    column: &str,
    canonical: &str,
    data_type: &str,
) -> Result<Box<dyn ToSql + Sync + Send>> {
    fn parse<T>(
        table: &str,
        column: &str,
        canonical: &str,
        data_type: &str,
    ) -> Result<Option<T>>
    where
        T: FromStr,
    {
        if canonical.is_empty() {
            return Ok(None);
        }
        canonical
            .parse::<T>()
            .map(Some)
            .map_err(|_| SyncError::ValueBind {
                table: table.to_string(),
                column: column.to_string(),
                value: canonical.to_string(),
                data_type: data_type.to_string(),
            })
    }

    let bind_error = || SyncError::ValueBind {
        table: table.to_string(),
        column: column.to_string(),
        value: canonical.to_string(),
        data_type: data_type.to_string(),
    };

    match data_type {
        "smallint" | "int2" => Ok(Box::new(parse::<i16>(table, column, canonical, data_type)?)),
        "integer" | "int4" => Ok(Box::new(parse::<i32>(table, column, canonical, data_type)?)),
        "bigint" | "int8" => Ok(Box::new(parse::<i64>(table, column, canonical, data_type)?)),
        "real" | "float4" => Ok(Box::new(parse::<f32>(table, column, canonical, data_type)?)),
        "double precision" | "float8" => {
            Ok(Box::new(parse::<f64>(table, column, canonical, data_type)?))
        }
        "numeric" | "decimal" => Ok(Box::new(parse::<rust_decimal::Decimal>(
            table, column, canonical, data_type,
        )?)),
        "boolean" | "bool" => {
            if canonical.is_empty() {
                return Ok(Box::new(None::<bool>));
            }
            match canonical.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Box::new(Some(true))),
                "false" | "f" | "0" => Ok(Box::new(Some(false))),
                _ => Err(bind_error()),
            }
        }
        "uuid" => {
            if canonical.is_empty() {
                return Ok(Box::new(None::<uuid::Uuid>));
            }
            uuid::Uuid::parse_str(canonical)
                .map(|u| Box::new(Some(u)) as Box<dyn ToSql + Sync + Send>)
                .map_err(|_| bind_error())
        }
        "timestamp with time zone" | "timestamptz" => {
            if canonical.is_empty() {
                return Ok(Box::new(None::<DateTime<Utc>>));
            }
            parse_timestamptz(canonical)
                .map(|t| Box::new(Some(t)) as Box<dyn ToSql + Sync + Send>)
                .ok_or_else(bind_error)
        }
        "timestamp without time zone" | "timestamp" => {
            if canonical.is_empty() {
                return Ok(Box::new(None::<NaiveDateTime>));
            }
            parse_naive_datetime(canonical)
                .map(|t| Box::new(Some(t)) as Box<dyn ToSql + Sync + Send>)
                .ok_or_else(bind_error)
        }
        "date" => {
            if canonical.is_empty() {
                return Ok(Box::new(None::<NaiveDate>));
            }
            NaiveDate::parse_from_str(canonical, "%Y-%m-%d")
                .map(|d| Box::new(Some(d)) as Box<dyn ToSql + Sync + Send>)
                .map_err(|_| bind_error())
        }
        "json" | "jsonb" => {
            if canonical.is_empty() {
                return Ok(Box::new(None::<serde_json::Value>));
            }
            let value = serde_json::from_str::<serde_json::Value>(canonical)
                .unwrap_or_else(|_| serde_json::Value::String(canonical.to_string()));
            Ok(Box::new(Some(value)))
        }
        // text, varchar and anything without a native mapping bind as text
        _ => Ok(Box::new(Some(canonical.to_string()))),
    }
}

fn parse_timestamptz(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    parse_naive_datetime(value).map(|t| t.and_utc())
}

fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(value, format) {
            return Some(t);
        }
    }
    None
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Build a multi-row insert:
///
/// ```sql
/// INSERT INTO "table" ("col1", "col2") VALUES ($1, $2), ($3, $4), ...
/// ```
pub fn build_insert_query(table: &str, columns: &[String], num_rows: usize) -> String {
    let quoted_columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();

    let num_cols = columns.len();
    let value_rows: Vec<String> = (0..num_rows)
        .map(|row_idx| {
            let placeholders: Vec<String> = (0..num_cols)
                .map(|col_idx| format!("${}", row_idx * num_cols + col_idx + 1))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        quoted_columns.join(", "),
        value_rows.join(", ")
    )
}

/// Build a single-row update keyed on the primary key:
///
/// ```sql
/// UPDATE "table" SET "col1" = $1, "col2" = $2 WHERE "pk" = $3
/// ```
pub fn build_update_query(table: &str, set_columns: &[String], primary_key: &str) -> String {
    let assignments: Vec<String> = set_columns
        .iter()
        .enumerate()
        .map(|(idx, column)| format!("{} = ${}", quote_ident(column), idx + 1))
        .collect();

    format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        quote_ident(table),
        assignments.join(", "),
        quote_ident(primary_key),
        set_columns.len() + 1
    )
}

/// Build an IN-list delete by primary key:
///
/// ```sql
/// DELETE FROM "table" WHERE "pk" IN ($1, $2, $3)
/// ```
pub fn build_delete_query(table: &str, primary_key: &str, num_rows: usize) -> String {
    let placeholders: Vec<String> = (1..=num_rows).map(|i| format!("${}", i)).collect();

    format!(
        "DELETE FROM {} WHERE {} IN ({})",
        quote_ident(table),
        quote_ident(primary_key),
        placeholders.join(", ")
    )
}
