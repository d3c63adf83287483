use super::{ensure_same_columns, render_text, HistorySink, SinkError};
use crate::record::FlatRecord;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Comma-delimited history file: one header line, then one line per tick.
///
/// The file is reopened for every write; nothing is buffered between ticks.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Header stored on disk.
    pub fn stored_columns(&self) -> Result<Vec<String>, SinkError> {
        if !self.path.exists() {
            return Err(SinkError::NotCreated {
                sink: "csv",
                location: self.path.clone(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)?;
        let headers = reader.headers()?;
        Ok(headers.iter().map(str::to_string).collect())
    }
}

impl HistorySink for CsvSink {
    fn kind(&self) -> &'static str {
        "csv"
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn create(&mut self, record: &FlatRecord) -> Result<(), SinkError> {
        if record.is_empty() {
            return Err(SinkError::EmptyRecord);
        }

        let file = File::create(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(record.keys())?;
        writer.write_record(record.iter().map(|(_, v)| render_text(v)))?;
        writer.flush()?;

        debug!(path = %self.path.display(), columns = record.len(), "csv history created");
        Ok(())
    }

    fn append(&mut self, record: &FlatRecord) -> Result<(), SinkError> {
        let stored = self.stored_columns()?;
        ensure_same_columns(self.kind(), &stored, record)?;

        // Values go out in header order, whatever order the record came in.
        let row: Vec<String> = stored
            .iter()
            .map(|column| record.get(column).map(render_text).unwrap_or_default())
            .collect();

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(&row)?;
        writer.flush()?;

        debug!(path = %self.path.display(), "csv row appended");
        Ok(())
    }
}
