// ABOUTME: Pre-flight primary-key validation over the loaded file records
// ABOUTME: Rejects null-like, duplicate and malformed key values before any DML runs

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{Result, SyncError};
use crate::record::Record;

/// Values treated as null-like after trimming, compared case-insensitively.
const NULL_LIKE: &[&str] = &["null", "nil", "n/a", "na", "none", "undefined"];

/// How many offending records the report renders before truncating.
const MAX_REPORTED: usize = 10;

/// Why a record's primary key was rejected. Rules are applied in this order
/// and a record stops at the first rule it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ColumnMissing,
    NullOrEmpty,
    Duplicate,
    InvalidFormat,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectReason::ColumnMissing => "column-missing",
            RejectReason::NullOrEmpty => "null-or-empty",
            RejectReason::Duplicate => "duplicate",
            RejectReason::InvalidFormat => "invalid-format",
        };
        f.write_str(name)
    }
}

/// One rejected record: its position in the file, the canonical key value and
/// the first rule it failed.
#[derive(Debug, Clone)]
pub struct InvalidRecord {
    pub index: usize,
    pub value: String,
    pub reason: RejectReason,
}

/// Outcome of validating a record list against its primary-key column.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub column: String,
    pub total: usize,
    pub invalid_records: Vec<InvalidRecord>,
    /// Canonical key value to every index it appeared at, first occurrence included.
    pub duplicate_map: BTreeMap<String, Vec<usize>>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.invalid_records.is_empty()
    }

    /// Records not listed in `invalid_records`.
    pub fn valid_count(&self) -> usize {
        self.total - self.invalid_records.len()
    }

    fn reason_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.invalid_records {
            *counts.entry(record.reason.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {} of {} records invalid on primary-key column '{}' ({} valid)",
            self.invalid_records.len(),
            self.total,
            self.column,
            self.valid_count()
        )?;

        for (reason, count) in self.reason_counts() {
            writeln!(f, "    {}: {}", reason, count)?;
        }

        for record in self.invalid_records.iter().take(MAX_REPORTED) {
            writeln!(
                f,
                "    record {}: {} = {:?} ({})",
                record.index, self.column, record.value, record.reason
            )?;
        }
        if self.invalid_records.len() > MAX_REPORTED {
            writeln!(
                f,
                "    ... and {} more",
                self.invalid_records.len() - MAX_REPORTED
            )?;
        }

        if !self.duplicate_map.is_empty() {
            writeln!(f, "  duplicate primary keys:")?;
            for (value, indices) in &self.duplicate_map {
                writeln!(f, "    {:?} at records {:?}", value, indices)?;
            }
        }

        Ok(())
    }
}

/// Validate every record's primary key, collecting the full report.
///
/// Each record is checked against the rules in order (column present, not
/// null-like, not a duplicate, well-formed) and stops at the first failure, so
/// no record is listed twice. A key value enters the seen-set as soon as it
/// passes the null check, which means later repeats of a format-invalid value
/// still surface as duplicates.
pub fn validate_primary_keys(
    records: &[Record],
    primary_key: &str,
    max_length: usize,
) -> ValidationReport {
    let mut invalid_records = Vec::new();
    let mut duplicate_map: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        let value = match record.get(primary_key) {
            Some(value) => value,
            None => {
                invalid_records.push(InvalidRecord {
                    index,
                    value: String::new(),
                    reason: RejectReason::ColumnMissing,
                });
                continue;
            }
        };

        let canonical = value.canonical();
        let trimmed = canonical.trim();

        if trimmed.is_empty() || NULL_LIKE.iter().any(|n| trimmed.eq_ignore_ascii_case(n)) {
            invalid_records.push(InvalidRecord {
                index,
                value: canonical,
                reason: RejectReason::NullOrEmpty,
            });
            continue;
        }

        if let Some(&first) = seen.get(&canonical) {
            duplicate_map
                .entry(canonical.clone())
                .or_insert_with(|| vec![first])
                .push(index);
            invalid_records.push(InvalidRecord {
                index,
                value: canonical,
                reason: RejectReason::Duplicate,
            });
            continue;
        }
        seen.insert(canonical.clone(), index);

        let has_control = canonical.contains(['\n', '\r', '\t']);
        let has_outer_whitespace = trimmed.len() != canonical.len();
        let too_long = canonical.chars().count() > max_length;
        if has_control || has_outer_whitespace || too_long {
            invalid_records.push(InvalidRecord {
                index,
                value: canonical,
                reason: RejectReason::InvalidFormat,
            });
        }
    }

    ValidationReport {
        column: primary_key.to_string(),
        total: records.len(),
        invalid_records,
        duplicate_map,
    }
}

/// Whether invalid records abort the sync or only produce a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Any invalid record fails the run. Enforced for differential sync.
    Strict,
    /// Invalid records are reported as a warning and the run continues.
    Lenient,
}

/// Validate and apply the mode policy.
pub fn check_primary_keys(
    table: &str,
    records: &[Record],
    primary_key: &str,
    max_length: usize,
    mode: ValidationMode,
) -> Result<ValidationReport> {
    let report = validate_primary_keys(records, primary_key, max_length);
    if report.is_valid() {
        return Ok(report);
    }

    match mode {
        ValidationMode::Strict => Err(SyncError::PrimaryKeyValidationFailed {
            table: table.to_string(),
            report,
        }),
        ValidationMode::Lenient => {
            tracing::warn!(
                "Primary-key validation found {} invalid records in table '{}':\n{}",
                report.invalid_records.len(),
                table,
                report
            );
            Ok(report)
        }
    }
}
