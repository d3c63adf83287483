//! History sinks - append-only destinations for flat records
//!
//! Every sink exposes the same two operations:
//! - `create`  : establish the destination (schema from the record's keys) and write the first row
//! - `append`  : write one more row, refusing records whose keys differ from the stored schema
//!
//! The stored schema is re-read from disk on every append, so a shape change
//! in the API response surfaces as [`SinkError::SchemaMismatch`] instead of
//! misaligned columns.

mod csv_file;
mod sqlite;

pub use csv_file::CsvSink;
pub use sqlite::SqliteSink;

use crate::record::FlatRecord;
use serde_json::Value;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

/// Errors raised while writing history
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{sink} sink at {location} has not been created yet")]
    NotCreated { sink: &'static str, location: PathBuf },
    #[error("{sink} schema mismatch: stored columns {stored:?}, record columns {record:?}")]
    SchemaMismatch {
        sink: &'static str,
        stored: Vec<String>,
        record: Vec<String>,
    },
    #[error("refusing to write a record without fields")]
    EmptyRecord,
}

impl SinkError {
    /// Whether trying again later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Io(e) => io_is_transient(e),
            SinkError::Csv(e) => match e.kind() {
                csv::ErrorKind::Io(io) => io_is_transient(io),
                _ => false,
            },
            SinkError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy)
                    | Some(rusqlite::ErrorCode::DatabaseLocked)
                    | Some(rusqlite::ErrorCode::DiskFull)
            ),
            SinkError::NotCreated { .. } | SinkError::SchemaMismatch { .. } | SinkError::EmptyRecord => false,
        }
    }
}

/// A missing or forbidden path stays that way until someone intervenes.
fn io_is_transient(error: &io::Error) -> bool {
    !matches!(
        error.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound
    )
}

/// Common interface of every history destination
pub trait HistorySink {
    /// Short name used in logs ("sqlite", "csv")
    fn kind(&self) -> &'static str;

    /// Where the history lives on disk
    fn location(&self) -> &Path;

    /// Establish the destination and write `record` as its first row
    fn create(&mut self, record: &FlatRecord) -> Result<(), SinkError>;

    /// Write `record` as one additional row
    fn append(&mut self, record: &FlatRecord) -> Result<(), SinkError>;
}

/// Fail unless `record` carries exactly the `stored` columns (order may differ).
pub(crate) fn ensure_same_columns(
    sink: &'static str,
    stored: &[String],
    record: &FlatRecord,
) -> Result<(), SinkError> {
    let stored_set: HashSet<&str> = stored.iter().map(String::as_str).collect();
    let same = stored.len() == record.len()
        && stored_set.len() == stored.len()
        && record.keys().all(|k| stored_set.contains(k));

    if same {
        Ok(())
    } else {
        Err(SinkError::SchemaMismatch {
            sink,
            stored: stored.to_vec(),
            record: record.columns(),
        })
    }
}

/// Text form of a leaf for delimited output.
pub(crate) fn render_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
