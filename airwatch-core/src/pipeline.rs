//! One tick of the recorder: fetch -> flatten -> create/append
//!
//! `Pipeline::run_tick` is the only entry point; whatever drives the cadence
//! (interval timer, cron, a test) just calls it.
//!
//! A reading whose write failed transiently is held: the next `run_tick`
//! writes it to the sinks that missed it instead of fetching a new one.
//! The driver drops it with `abandon_pending` when it gives up on the tick.

use crate::flatten::{Dropped, Flattener};
use crate::record::FlatRecord;
use crate::recorder::Recorder;
use crate::sinks::SinkError;
use crate::source::{SensorSource, SourceError};
use tracing::{debug, info, warn};

/// Process-level lifecycle: history is created by the first successful tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Running,
}

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] SourceError),
    #[error("write failed: {0}")]
    Write(#[from] SinkError),
}

impl TickError {
    pub fn is_transient(&self) -> bool {
        match self {
            TickError::Fetch(e) => e.is_transient(),
            TickError::Write(e) => e.is_transient(),
        }
    }
}

/// Outcome of a successful tick
#[derive(Debug, Clone)]
pub struct TickReport {
    /// 1-based count of successful ticks
    pub tick: u64,
    /// True when this tick created the history
    pub created: bool,
    pub columns: usize,
    pub dropped: Vec<Dropped>,
}

pub struct Pipeline<S> {
    source: S,
    flattener: Flattener,
    recorder: Recorder,
    sensor_id: String,
    phase: Phase,
    ticks: u64,
    pending: Option<(FlatRecord, Vec<Dropped>)>,
}

impl<S: SensorSource> Pipeline<S> {
    pub fn new(source: S, flattener: Flattener, recorder: Recorder, sensor_id: impl Into<String>) -> Self {
        Self {
            source,
            flattener,
            recorder,
            sensor_id: sensor_id.into(),
            phase: Phase::Init,
            ticks: 0,
            pending: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// True when a reading is waiting to be written to the remaining sinks.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the held reading. Sinks that already took it keep their row.
    pub fn abandon_pending(&mut self) {
        if self.pending.take().is_some() {
            let kept = self.recorder.abandon_record();
            warn!(sensor = %self.sensor_id, ?kept, "reading abandoned");
        }
    }

    /// Fetch one reading (or take the held one) and record it.
    ///
    /// The first successful tick creates the history; a failed creation
    /// leaves the pipeline in [`Phase::Init`] so the next tick tries again.
    pub async fn run_tick(&mut self) -> Result<TickReport, TickError> {
        let (record, dropped) = match self.pending.take() {
            Some(held) => {
                debug!(sensor = %self.sensor_id, "writing held reading");
                held
            }
            None => {
                let nested = self.source.fetch_reading(&self.sensor_id).await?;
                let (record, dropped) = self.flattener.flatten_report(&nested);
                debug!(sensor = %self.sensor_id, fields = record.len(), "reading flattened");
                (record, dropped)
            }
        };

        let written = match self.phase {
            Phase::Init => self.recorder.create_and_write(&record),
            Phase::Running => self.recorder.append_write(&record),
        };
        if let Err(err) = written {
            if err.is_transient() {
                self.pending = Some((record, dropped));
            } else {
                self.recorder.abandon_record();
            }
            return Err(err.into());
        }

        let created = self.phase == Phase::Init;
        if created {
            self.phase = Phase::Running;
            info!(
                sensor = %self.sensor_id,
                columns = record.len(),
                "history created with {} columns",
                record.len()
            );
        }

        self.ticks += 1;
        debug!(sensor = %self.sensor_id, tick = self.ticks, "tick recorded");

        Ok(TickReport {
            tick: self.ticks,
            created,
            columns: record.len(),
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NestedRecord;
    use crate::recorder::RecorderContext;
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    struct Queue(RefCell<VecDeque<Result<Value, SourceError>>>);

    impl SensorSource for Queue {
        async fn fetch_reading(&self, _sensor_id: &str) -> Result<NestedRecord, SourceError> {
            match self.0.borrow_mut().pop_front() {
                Some(Ok(Value::Object(map))) => Ok(map),
                Some(Ok(other)) => Err(SourceError::Malformed(other.to_string())),
                Some(Err(e)) => Err(e),
                None => Err(SourceError::Transport("queue exhausted".into())),
            }
        }
    }

    fn reading(pm: f64) -> Result<Value, SourceError> {
        Ok(json!({"sensor": {"id": 1, "stats": {"pm25": pm}, "stats_a": {"pm25": 0}}, "name": "X"}))
    }

    fn pipeline(dir: &TempDir, script: Vec<Result<Value, SourceError>>) -> (Pipeline<Queue>, RecorderContext) {
        pipeline_with_sinks(dir, script, false)
    }

    fn pipeline_with_sinks(
        dir: &TempDir,
        script: Vec<Result<Value, SourceError>>,
        sqlite: bool,
    ) -> (Pipeline<Queue>, RecorderContext) {
        let ctx = RecorderContext {
            run_dir: dir.path().to_path_buf(),
            sensor_id: "1".into(),
            sqlite,
            csv: true,
        };
        let recorder = Recorder::open(&ctx).unwrap();
        let source = Queue(RefCell::new(script.into()));
        (Pipeline::new(source, Flattener::default(), recorder, "1"), ctx)
    }

    #[tokio::test]
    async fn test_first_tick_creates_then_appends() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, ctx) = pipeline(&dir, vec![reading(1.0), reading(2.0)]);
        assert_eq!(pipeline.phase(), Phase::Init);

        let first = pipeline.run_tick().await.unwrap();
        assert!(first.created);
        assert_eq!(first.columns, 3);
        assert_eq!(first.dropped.len(), 1);
        assert_eq!(pipeline.phase(), Phase::Running);

        let second = pipeline.run_tick().await.unwrap();
        assert!(!second.created);
        assert_eq!(second.tick, 2);

        let csv = std::fs::read_to_string(ctx.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["sensor_id,sensor_stats_pm25,name", "1,1.0,X", "1,2.0,X"]);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_phase() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, ctx) = pipeline(
            &dir,
            vec![Err(SourceError::Auth { status: 403 }), reading(1.0)],
        );

        let err = pipeline.run_tick().await.unwrap_err();
        assert!(matches!(err, TickError::Fetch(SourceError::Auth { .. })));
        assert!(!err.is_transient());
        assert_eq!(pipeline.phase(), Phase::Init);
        assert!(!ctx.csv_path().exists());

        let report = pipeline.run_tick().await.unwrap();
        assert!(report.created);
        assert_eq!(report.tick, 1);
    }

    #[tokio::test]
    async fn test_shape_drift_surfaces_as_write_error() {
        let dir = TempDir::new().unwrap();
        let drifted = Ok(json!({"sensor": {"id": 1, "stats": {"pm25": 3.0, "pm10": 4.0}}, "name": "X"}));
        let (mut pipeline, _ctx) = pipeline(&dir, vec![reading(1.0), drifted]);

        pipeline.run_tick().await.unwrap();
        let err = pipeline.run_tick().await.unwrap_err();
        assert!(matches!(err, TickError::Write(SinkError::SchemaMismatch { .. })));
        assert_eq!(pipeline.phase(), Phase::Running);
    }

    fn sqlite_rows(ctx: &RecorderContext) -> u64 {
        crate::sinks::SqliteSink::open(ctx.sqlite_path(), ctx.table_name())
            .unwrap()
            .row_count()
            .unwrap()
    }

    #[tokio::test]
    async fn test_transient_write_failure_holds_reading() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, ctx) = pipeline_with_sinks(&dir, vec![reading(1.0), reading(2.0), reading(3.0)], true);
        pipeline.run_tick().await.unwrap();

        std::fs::remove_file(ctx.csv_path()).unwrap();
        std::fs::create_dir(ctx.csv_path()).unwrap();
        for _ in 0..2 {
            let err = pipeline.run_tick().await.unwrap_err();
            assert!(err.is_transient());
            assert!(pipeline.has_pending());
        }
        // the held reading is not fetched again
        assert_eq!(pipeline.source().0.borrow().len(), 1);
        assert_eq!(sqlite_rows(&ctx), 2);

        std::fs::remove_dir(ctx.csv_path()).unwrap();
        std::fs::write(ctx.csv_path(), "sensor_id,sensor_stats_pm25,name\n1,1.0,X\n").unwrap();
        let report = pipeline.run_tick().await.unwrap();
        assert_eq!(report.tick, 2);
        assert!(!pipeline.has_pending());

        let csv = std::fs::read_to_string(ctx.csv_path()).unwrap();
        assert_eq!(csv.lines().last(), Some("1,2.0,X"));
        assert_eq!(sqlite_rows(&ctx), 2);
    }

    #[tokio::test]
    async fn test_abandoned_reading_is_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, ctx) = pipeline_with_sinks(&dir, vec![reading(1.0), reading(2.0), reading(3.0)], true);
        pipeline.run_tick().await.unwrap();

        std::fs::remove_file(ctx.csv_path()).unwrap();
        std::fs::create_dir(ctx.csv_path()).unwrap();
        assert!(pipeline.run_tick().await.is_err());
        pipeline.abandon_pending();
        assert!(!pipeline.has_pending());

        std::fs::remove_dir(ctx.csv_path()).unwrap();
        std::fs::write(ctx.csv_path(), "sensor_id,sensor_stats_pm25,name\n1,1.0,X\n").unwrap();
        pipeline.run_tick().await.unwrap();

        // sqlite kept reading 2, both got reading 3, neither got anything twice
        assert_eq!(sqlite_rows(&ctx), 3);
        let csv = std::fs::read_to_string(ctx.csv_path()).unwrap();
        let rows: Vec<&str> = csv.lines().skip(1).collect();
        assert_eq!(rows, vec!["1,1.0,X", "1,3.0,X"]);
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_not_held() {
        let dir = TempDir::new().unwrap();
        let drifted = Ok(json!({"sensor": {"id": 1, "stats": {"pm25": 3.0, "pm10": 4.0}}, "name": "X"}));
        let (mut pipeline, _ctx) = pipeline(&dir, vec![reading(1.0), drifted, reading(2.0)]);

        pipeline.run_tick().await.unwrap();
        assert!(pipeline.run_tick().await.is_err());
        assert!(!pipeline.has_pending());
        assert_eq!(pipeline.run_tick().await.unwrap().tick, 2);
    }
}
