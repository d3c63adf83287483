//! What happens when a tick fails
//!
//! The recorder never recovers locally; the driver asks a [`FailurePolicy`]
//! after each failed attempt and follows its [`Decision`].

use crate::pipeline::TickError;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Run the same tick again after the given delay
    Retry(Duration),
    /// Give up on this tick, wait for the next one
    Skip,
    /// Stop the run loop and report the error
    Abort,
}

pub trait FailurePolicy {
    /// `attempt` counts failed attempts of the current tick, starting at 1.
    fn decide(&self, error: &TickError, attempt: u32) -> Decision;
}

/// Any failure stops the recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortPolicy;

impl FailurePolicy for AbortPolicy {
    fn decide(&self, _error: &TickError, _attempt: u32) -> Decision {
        Decision::Abort
    }
}

/// Transient failures lose one reading; anything else stops the recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipPolicy;

impl FailurePolicy for SkipPolicy {
    fn decide(&self, error: &TickError, _attempt: u32) -> Decision {
        if error.is_transient() {
            Decision::Skip
        } else {
            Decision::Abort
        }
    }
}

/// Retry transient failures with linearly growing delay, then skip the tick.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts, backoff }
    }
}

impl FailurePolicy for RetryPolicy {
    fn decide(&self, error: &TickError, attempt: u32) -> Decision {
        if !error.is_transient() {
            return Decision::Abort;
        }
        if attempt < self.max_attempts {
            Decision::Retry(self.backoff.saturating_mul(attempt))
        } else {
            Decision::Skip
        }
    }
}

impl<P: FailurePolicy + ?Sized> FailurePolicy for Box<P> {
    fn decide(&self, error: &TickError, attempt: u32) -> Decision {
        (**self).decide(error, attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::SinkError;
    use crate::source::SourceError;

    fn transient() -> TickError {
        TickError::Fetch(SourceError::Transport("timed out".into()))
    }

    fn fatal() -> TickError {
        TickError::Write(SinkError::SchemaMismatch {
            sink: "csv",
            stored: vec!["a".into()],
            record: vec!["b".into()],
        })
    }

    #[test]
    fn test_abort_policy_always_aborts() {
        assert_eq!(AbortPolicy.decide(&transient(), 1), Decision::Abort);
        assert_eq!(AbortPolicy.decide(&fatal(), 1), Decision::Abort);
    }

    #[test]
    fn test_skip_policy() {
        assert_eq!(SkipPolicy.decide(&transient(), 1), Decision::Skip);
        assert_eq!(SkipPolicy.decide(&fatal(), 1), Decision::Abort);
    }

    #[test]
    fn test_retry_policy_backs_off_then_skips() {
        let policy = RetryPolicy::new(3, Duration::from_secs(10));

        assert_eq!(policy.decide(&transient(), 1), Decision::Retry(Duration::from_secs(10)));
        assert_eq!(policy.decide(&transient(), 2), Decision::Retry(Duration::from_secs(20)));
        assert_eq!(policy.decide(&transient(), 3), Decision::Skip);
        assert_eq!(policy.decide(&fatal(), 1), Decision::Abort);
    }

    #[test]
    fn test_boxed_policy_delegates() {
        let policy: Box<dyn FailurePolicy> = Box::new(SkipPolicy);
        assert_eq!(policy.decide(&transient(), 1), Decision::Skip);
    }
}
