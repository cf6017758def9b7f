// ABOUTME: Pure three-way diff between file records and existing DB rows
// ABOUTME: Produces disjoint insert, update and delete lists keyed on the primary key

use std::collections::{BTreeMap, HashSet};

use crate::record::Record;

/// A pending row change: the DB row as it is (`before`) and the file row that
/// replaces it (`after`). Both share a primary-key value.
#[derive(Debug, Clone)]
pub struct UpdateOp {
    pub before: Record,
    pub after: Record,
}

/// The computed change set for one table.
#[derive(Debug, Clone, Default)]
pub struct TableDiff {
    pub to_insert: Vec<Record>,
    pub to_update: Vec<UpdateOp>,
    pub to_delete: Vec<Record>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Inputs that shape the diff: key column, the effective sync columns, the
/// immutable set and whether missing rows are deleted.
#[derive(Debug, Clone, Copy)]
pub struct DiffSpec<'a> {
    pub primary_key: &'a str,
    pub sync_columns: &'a [String],
    pub immutable_columns: &'a [String],
    pub delete_not_in_file: bool,
}

/// Compute the three-way diff of `file_records` against the DB rows in
/// `db_records` (keyed by canonical primary-key value).
///
/// Comparison is on canonical forms over the sync columns, excluding the
/// primary key itself (its equality is the join condition). A row whose only
/// differences sit in immutable columns counts as unchanged, since the update
/// would not be allowed to touch those columns anyway. Inputs are never
/// mutated.
pub fn compute_diff(
    spec: &DiffSpec<'_>,
    file_records: &[Record],
    db_records: &BTreeMap<String, Record>,
) -> TableDiff {
    let mut diff = TableDiff::default();
    let mut file_keys: HashSet<String> = HashSet::with_capacity(file_records.len());

    for record in file_records {
        let pk = record.canonical(spec.primary_key);
        if pk.is_empty() {
            // Strict validation already rejects these; guard against lenient callers.
            tracing::warn!(
                "Skipping record with missing or empty primary key '{}'",
                spec.primary_key
            );
            continue;
        }
        file_keys.insert(pk.clone());

        match db_records.get(&pk) {
            None => diff.to_insert.push(record.clone()),
            Some(existing) => {
                if records_differ(spec, record, existing) {
                    diff.to_update.push(UpdateOp {
                        before: existing.clone(),
                        after: record.clone(),
                    });
                }
            }
        }
    }

    if spec.delete_not_in_file {
        for (pk, existing) in db_records {
            if !file_keys.contains(pk) {
                diff.to_delete.push(existing.clone());
            }
        }
    }

    diff
}

/// Whether any updatable sync column differs between the file and DB rows.
fn records_differ(spec: &DiffSpec<'_>, file_record: &Record, db_record: &Record) -> bool {
    spec.sync_columns
        .iter()
        .filter(|column| column.as_str() != spec.primary_key)
        .filter(|column| !spec.immutable_columns.contains(*column))
        .any(|column| file_record.canonical(column) != db_record.canonical(column))
}
