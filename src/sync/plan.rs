// ABOUTME: Execution plan describing the pending work of one table sync
// ABOUTME: Renders the dry-run report and doubles as the post-run summary

use std::fmt;

use crate::config::SyncMode;
use crate::record::Record;
use crate::sync::diff::UpdateOp;

/// Everything a sync would do to one table, captured before (or as) it runs.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub table: String,
    pub mode: SyncMode,
    pub primary_key: String,
    pub source_rows: usize,
    pub db_rows: usize,
    pub inserts: Vec<Record>,
    pub updates: Vec<UpdateOp>,
    pub deletes: Vec<Record>,
    pub sync_columns: Vec<String>,
    pub timestamp_columns: Vec<String>,
    pub immutable_columns: Vec<String>,
}

impl ExecutionPlan {
    pub fn insert_count(&self) -> usize {
        self.inserts.len()
    }

    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    /// Overwrite clears the whole table; differential deletes only the
    /// explicit list.
    pub fn delete_count(&self) -> usize {
        match self.mode {
            SyncMode::Overwrite => self.db_rows,
            SyncMode::Differential => self.deletes.len(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.insert_count() == 0 && self.update_count() == 0 && self.delete_count() == 0
    }

    fn render_record(&self, record: &Record) -> String {
        self.sync_columns
            .iter()
            .map(|column| format!("{}={}", column, record.canonical(column)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn render_update(&self, op: &UpdateOp) -> String {
        let changes: Vec<String> = self
            .sync_columns
            .iter()
            .filter(|column| column.as_str() != self.primary_key)
            .filter(|column| op.before.canonical(column) != op.after.canonical(column))
            .map(|column| {
                format!(
                    "{} {:?} -> {:?}",
                    column,
                    op.before.canonical(column),
                    op.after.canonical(column)
                )
            })
            .collect();
        format!(
            "{}={}: {}",
            self.primary_key,
            op.after.canonical(&self.primary_key),
            changes.join(", ")
        )
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========================================")?;
        writeln!(f, "Execution plan: table '{}' ({})", self.table, self.mode)?;
        writeln!(f, "========================================")?;
        writeln!(f, "  source rows: {}", self.source_rows)?;
        writeln!(f, "  db rows: {}", self.db_rows)?;
        writeln!(f, "  sync columns: {}", self.sync_columns.join(", "))?;
        if !self.timestamp_columns.is_empty() {
            writeln!(f, "  timestamp columns: {}", self.timestamp_columns.join(", "))?;
        }
        if !self.immutable_columns.is_empty() {
            writeln!(f, "  immutable columns: {}", self.immutable_columns.join(", "))?;
        }

        match self.mode {
            SyncMode::Overwrite => {
                writeln!(f, "  delete: all {} existing row(s)", self.db_rows)?;
                writeln!(f, "  insert: {} row(s)", self.inserts.len())?;
                for record in &self.inserts {
                    writeln!(f, "    {}", self.render_record(record))?;
                }
            }
            SyncMode::Differential => {
                writeln!(f, "  insert: {} row(s)", self.inserts.len())?;
                for record in &self.inserts {
                    writeln!(f, "    {}", self.render_record(record))?;
                }
                writeln!(f, "  update: {} row(s)", self.updates.len())?;
                for op in &self.updates {
                    writeln!(f, "    {}", self.render_update(op))?;
                }
                writeln!(f, "  delete: {} row(s)", self.deletes.len())?;
                for record in &self.deletes {
                    writeln!(f, "    {}", self.render_record(record))?;
                }
            }
        }

        Ok(())
    }
}
