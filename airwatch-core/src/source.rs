//! Sensor data source seam
//!
//! The agent implements this over the PurpleAir HTTP API; tests use scripted
//! stubs from the devkit.

use crate::record::NestedRecord;
use std::future::Future;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("API key rejected (HTTP {status})")]
    Auth { status: u16 },
    #[error("sensor API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed reading: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Network hiccups, throttling and server-side errors may clear up on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Transport(_) => true,
            SourceError::Status { status, .. } => *status == 429 || *status >= 500,
            SourceError::Auth { .. } | SourceError::Malformed(_) => false,
        }
    }
}

/// Anything that can produce the current reading of a sensor.
pub trait SensorSource {
    fn fetch_reading(
        &self,
        sensor_id: &str,
    ) -> impl Future<Output = Result<NestedRecord, SourceError>>;
}
