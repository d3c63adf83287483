//! Recorder - writes each flat record to every enabled history sink
//!
//! `create_and_write` runs until every sink exists; `append_write` runs on
//! every later tick. A failure stops at the first sink that reports it and is
//! handed back to the caller untouched.
//!
//! Each sink remembers whether it already holds the record being written, so
//! writing the same record again after a failure only reaches the sinks that
//! missed it. A sink never gets the same reading twice.

use crate::record::FlatRecord;
use crate::sinks::{CsvSink, HistorySink, SinkError, SqliteSink};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Where and how one run records its history, built once at startup.
#[derive(Debug, Clone)]
pub struct RecorderContext {
    /// Directory holding this run's history files
    pub run_dir: PathBuf,
    /// Sensor the history belongs to
    pub sensor_id: String,
    /// Keep a SQLite table
    pub sqlite: bool,
    /// Keep a CSV file
    pub csv: bool,
}

impl RecorderContext {
    pub fn table_name(&self) -> String {
        format!("purpleair_{}", self.sensor_id)
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.run_dir.join(format!("purpleair_{}.sqlite", self.sensor_id))
    }

    pub fn csv_path(&self) -> PathBuf {
        self.run_dir.join(format!("sensor_index_{}.csv", self.sensor_id))
    }
}

struct Slot {
    sink: Box<dyn HistorySink + Send>,
    created: bool,
    /// Already wrote the record currently in flight
    holds_current: bool,
}

pub struct Recorder {
    slots: Vec<Slot>,
}

impl Recorder {
    /// Open the sinks enabled in `ctx`.
    pub fn open(ctx: &RecorderContext) -> Result<Self, SinkError> {
        let mut sinks: Vec<Box<dyn HistorySink + Send>> = Vec::new();

        if ctx.sqlite {
            let path = ctx.sqlite_path();
            info!("SQLite history: {} (table {})", path.display(), ctx.table_name());
            sinks.push(Box::new(SqliteSink::open(path, ctx.table_name())?));
        }
        if ctx.csv {
            let path = ctx.csv_path();
            info!("CSV history: {}", path.display());
            sinks.push(Box::new(CsvSink::new(path)));
        }

        Ok(Self::with_sinks(sinks))
    }

    pub fn with_sinks(sinks: Vec<Box<dyn HistorySink + Send>>) -> Self {
        if sinks.is_empty() {
            warn!("No history sink enabled, readings will not be saved");
        }
        let slots = sinks
            .into_iter()
            .map(|sink| Slot {
                sink,
                created: false,
                holds_current: false,
            })
            .collect();
        Self { slots }
    }

    pub fn sink_kinds(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.sink.kind()).collect()
    }

    /// True while a record is written to some sinks but not all of them.
    pub fn has_partial_record(&self) -> bool {
        self.slots.iter().any(|s| s.holds_current)
    }

    /// Establish every sink not created yet and write `record` as its first
    /// row. Sinks created by an earlier, partly failed call get `record`
    /// appended instead.
    pub fn create_and_write(&mut self, record: &FlatRecord) -> Result<(), SinkError> {
        for slot in self.slots.iter_mut().filter(|s| !s.holds_current) {
            if slot.created {
                slot.sink.append(record)?;
            } else {
                slot.sink.create(record)?;
                slot.created = true;
                debug!("{} created at {}", slot.sink.kind(), slot.sink.location().display());
            }
            slot.holds_current = true;
        }
        self.finish_record();
        Ok(())
    }

    /// Write `record` as one more row of every sink that does not hold it yet.
    pub fn append_write(&mut self, record: &FlatRecord) -> Result<(), SinkError> {
        for slot in self.slots.iter_mut().filter(|s| !s.holds_current) {
            slot.sink.append(record)?;
            slot.holds_current = true;
        }
        self.finish_record();
        Ok(())
    }

    /// Give up on the record in flight. Returns the sinks that kept it.
    pub fn abandon_record(&mut self) -> Vec<&'static str> {
        let kept = self
            .slots
            .iter()
            .filter(|s| s.holds_current)
            .map(|s| s.sink.kind())
            .collect();
        self.finish_record();
        kept
    }

    fn finish_record(&mut self) {
        for slot in &mut self.slots {
            slot.holds_current = false;
        }
    }
}
