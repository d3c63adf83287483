//! Fixed-cadence driver for the recording pipeline
//!
//! - first tick runs immediately and creates the history
//! - later ticks run every `interval`, never overlapping: a slow tick
//!   pushes the next one back instead of queueing it
//! - failed ticks go through the failure policy (retry / skip / abort)
//! - a shutdown signal interrupts a tick, even one waiting to retry

use airwatch_core::{Decision, FailurePolicy, Phase, Pipeline, SensorSource, TickError};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown signal received
    Interrupted,
    /// `max_ticks` reached
    TickLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Scheduled ticks handled, recorded or skipped
    pub ticks: u64,
    pub recorded: u64,
    pub skipped: u64,
    pub stop: StopReason,
}

#[derive(Debug, PartialEq, Eq)]
enum TickOutcome {
    Done,
    Interrupted,
}

pub struct Scheduler {
    interval: Duration,
    policy: Box<dyn FailurePolicy>,
    max_ticks: Option<u64>,
}

impl Scheduler {
    pub fn new(interval: Duration, policy: Box<dyn FailurePolicy>) -> Self {
        Self {
            interval,
            policy,
            max_ticks: None,
        }
    }

    /// Stop after `ticks` scheduled ticks (the startup tick included).
    pub fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Drive `pipeline` until `shutdown` resolves, the tick limit is hit,
    /// or the policy aborts (the failing tick's error is returned).
    ///
    /// `shutdown` is also watched during a tick and its retry backoff.
    pub async fn run_until<S, F>(
        &self,
        pipeline: &mut Pipeline<S>,
        shutdown: F,
    ) -> Result<RunSummary, TickError>
    where
        S: SensorSource,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary {
            ticks: 0,
            recorded: 0,
            skipped: 0,
            stop: StopReason::TickLimit,
        };

        info!(
            "Recording sensor {} every {}",
            pipeline.sensor_id(),
            humantime::format_duration(self.interval)
        );

        // Startup tick: creates the history.
        if self.handle_tick(pipeline, &mut summary, &mut shutdown).await? == TickOutcome::Interrupted {
            return Ok(self.interrupted(summary));
        }
        if self.limit_reached(&summary) {
            return Ok(summary);
        }

        let mut timer = interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if self.handle_tick(pipeline, &mut summary, &mut shutdown).await? == TickOutcome::Interrupted {
                        return Ok(self.interrupted(summary));
                    }
                    if self.limit_reached(&summary) {
                        summary.stop = StopReason::TickLimit;
                        break;
                    }
                }
                _ = shutdown.as_mut() => {
                    return Ok(self.interrupted(summary));
                }
            }
        }

        Ok(summary)
    }

    fn limit_reached(&self, summary: &RunSummary) -> bool {
        self.max_ticks.is_some_and(|max| summary.ticks >= max)
    }

    fn interrupted(&self, mut summary: RunSummary) -> RunSummary {
        info!("Shutdown requested, stopping after {} ticks", summary.ticks);
        summary.stop = StopReason::Interrupted;
        summary
    }

    async fn handle_tick<S, F>(
        &self,
        pipeline: &mut Pipeline<S>,
        summary: &mut RunSummary,
        shutdown: &mut Pin<&mut F>,
    ) -> Result<TickOutcome, TickError>
    where
        S: SensorSource,
        F: Future<Output = ()>,
    {
        summary.ticks += 1;
        let mut attempt = 0u32;

        loop {
            let startup = pipeline.phase() == Phase::Init;

            let result = tokio::select! {
                result = pipeline.run_tick() => result,
                _ = shutdown.as_mut() => return Ok(TickOutcome::Interrupted),
            };
            let err = match result {
                Ok(report) => {
                    summary.recorded += 1;
                    if report.created {
                        info!("History created ({} columns)", report.columns);
                    } else {
                        info!("Reading #{} recorded", report.tick);
                    }
                    return Ok(TickOutcome::Done);
                }
                Err(err) => err,
            };

            attempt += 1;
            // Nothing to come back to if the very first write can never succeed.
            let decision = if startup && !err.is_transient() {
                Decision::Abort
            } else {
                self.policy.decide(&err, attempt)
            };

            match decision {
                Decision::Retry(delay) => {
                    warn!(
                        "Tick failed (attempt {}): {}, retrying in {}",
                        attempt,
                        err,
                        humantime::format_duration(delay)
                    );
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = shutdown.as_mut() => return Ok(TickOutcome::Interrupted),
                    }
                }
                Decision::Skip => {
                    warn!("Tick failed: {}, skipping this reading", err);
                    pipeline.abandon_pending();
                    summary.skipped += 1;
                    return Ok(TickOutcome::Done);
                }
                Decision::Abort => {
                    error!("Tick failed: {}, stopping", err);
                    return Err(err);
                }
            }
        }
    }
}
