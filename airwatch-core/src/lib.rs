//! Airwatch core - turns one nested sensor reading into one history row
//!
//! Pipeline per tick:
//! - `source`   : fetch the nested reading (trait, implemented by the agent)
//! - `flatten`  : nested mapping -> flat `key_path` record
//! - `recorder` : write the flat record to every enabled sink
//! - `sinks`    : append-only SQLite table and CSV file
//! - `pipeline` : one well-defined `run_tick` entry point
//! - `policy`   : what to do when a tick fails

pub mod flatten;
pub mod pipeline;
pub mod policy;
pub mod record;
pub mod recorder;
pub mod sinks;
pub mod source;

pub use flatten::{flatten, Depth3Keys, DropReason, Dropped, Flattener, EXCLUDED_MARKER};
pub use pipeline::{Phase, Pipeline, TickError, TickReport};
pub use policy::{AbortPolicy, Decision, FailurePolicy, RetryPolicy, SkipPolicy};
pub use record::{FlatRecord, NestedRecord};
pub use recorder::{Recorder, RecorderContext};
pub use sinks::{HistorySink, SinkError};
pub use source::{SensorSource, SourceError};
