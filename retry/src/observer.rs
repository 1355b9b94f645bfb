//! Per-attempt reporting.
//!
//! The executor never formats text. Each failed attempt is described by an
//! [`AttemptRecord`] and handed to a [`RetryObserver`]; the default
//! [`TracingObserver`] turns it into structured `tracing` fields.

use std::time::Duration;

use gws_api_errors::{ErrorKind, TerminalState};

use crate::backoff::DelaySource;
use crate::eligibility::Eligibility;

/// What the executor does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { delay: Duration, source: DelaySource },
    GiveUp(TerminalState),
}

/// Structured description of one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// 1-indexed attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Time since the first attempt started.
    pub elapsed: Duration,
    pub http_status: u16,
    pub error_kind: ErrorKind,
    pub eligibility: Eligibility,
    pub decision: Decision,
}

impl AttemptRecord {
    /// Delay before the next attempt, if one will be made.
    pub fn delay(&self) -> Option<Duration> {
        match self.decision {
            Decision::Retry { delay, .. } => Some(delay),
            Decision::GiveUp(_) => None,
        }
    }
}

/// Observability collaborator notified after every failed attempt.
pub trait RetryObserver: Send + Sync {
    fn on_attempt(&self, record: &AttemptRecord);
}

impl<F> RetryObserver for F
where
    F: Fn(&AttemptRecord) + Send + Sync,
{
    fn on_attempt(&self, record: &AttemptRecord) {
        self(record)
    }
}

/// Emits each record as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_attempt(&self, record: &AttemptRecord) {
        match record.decision {
            Decision::Retry { delay, source } => tracing::info!(
                attempt = record.attempt,
                max_attempts = record.max_attempts,
                elapsed_ms = record.elapsed.as_millis() as u64,
                http_status = record.http_status,
                error_kind = record.error_kind.as_str(),
                rationale = record.eligibility.rationale(),
                delay_ms = delay.as_millis() as u64,
                delay_source = source.as_str(),
                "retrying remote call"
            ),
            Decision::GiveUp(terminal) => tracing::warn!(
                attempt = record.attempt,
                max_attempts = record.max_attempts,
                elapsed_ms = record.elapsed.as_millis() as u64,
                http_status = record.http_status,
                error_kind = record.error_kind.as_str(),
                rationale = record.eligibility.rationale(),
                eligible = record.eligibility.is_eligible(),
                terminal = %terminal,
                "giving up on remote call"
            ),
        }
    }
}
