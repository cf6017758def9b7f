// ABOUTME: Loads CSV and JSON source files into in-memory record lists
// ABOUTME: Dispatches on file extension and preserves the header column order

use std::fs;
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::record::{Record, Value};

/// Supported source file formats. File-format selection is a small closed set,
/// dispatched by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
}

/// A fully loaded source file: the ordered record list plus the header
/// columns in source order. Records are read-only for the rest of the sync.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub records: Vec<Record>,
    pub headers: Vec<String>,
}

/// Determine the file format from the path extension.
pub fn detect_format(path: &Path) -> Result<FileFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("csv") => Ok(FileFormat::Csv),
        Some("json") => Ok(FileFormat::Json),
        _ => Err(SyncError::FileFormatUnsupported {
            path: path.to_path_buf(),
        }),
    }
}

/// Load a source file into memory.
pub fn load_file(path: &Path) -> Result<LoadedFile> {
    let loaded = match detect_format(path)? {
        FileFormat::Csv => load_csv(path)?,
        FileFormat::Json => load_json(path)?,
    };
    tracing::debug!(
        "Loaded {} records ({} columns) from {:?}",
        loaded.records.len(),
        loaded.headers.len(),
        path
    );
    Ok(loaded)
}

fn load_csv(path: &Path) -> Result<LoadedFile> {
    let mut reader = csv::ReaderBuilder::new()
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| csv_error(path, e))?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(header, field)| (header.clone(), Value::Text(field.to_string())))
            .collect();
        records.push(record);
    }

    Ok(LoadedFile { records, headers })
}

fn load_json(path: &Path) -> Result<LoadedFile> {
    let contents = fs::read_to_string(path).map_err(|e| SyncError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let parsed: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| SyncError::FileParse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let elements = parsed.as_array().ok_or_else(|| SyncError::FileParse {
        path: path.to_path_buf(),
        detail: "expected a JSON array of objects".to_string(),
    })?;

    // Header order is the first-seen key order across all records.
    let mut headers: Vec<String> = Vec::new();
    let mut records = Vec::new();
    for (index, element) in elements.iter().enumerate() {
        let object = element.as_object().ok_or_else(|| SyncError::FileParse {
            path: path.to_path_buf(),
            detail: format!("element {} is not an object", index),
        })?;

        let mut record = Record::new();
        for (key, value) in object {
            if !headers.iter().any(|h| h == key) {
                headers.push(key.clone());
            }
            record.insert(key.clone(), Value::from_json(value));
        }
        records.push(record);
    }

    Ok(LoadedFile { records, headers })
}

fn csv_error(path: &Path, error: csv::Error) -> SyncError {
    let detail = error.to_string();
    match error.into_kind() {
        csv::ErrorKind::Io(source) => SyncError::FileRead {
            path: path.to_path_buf(),
            source,
        },
        _ => SyncError::FileParse {
            path: path.to_path_buf(),
            detail,
        },
    }
}
