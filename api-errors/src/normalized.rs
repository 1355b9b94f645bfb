//! Canonical error report produced by the normalizer.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::kind::{ErrorKind, classify};

/// Where the HTTP status of a [`NormalizedError`] was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    /// `response.data.error.code` or a top-level `error.code` envelope.
    Envelope,
    /// Transport response status (`response.status`).
    Response,
    /// Numeric `code` field on the failure itself.
    Code,
    /// Generic `status` field on the failure itself.
    Status,
    /// Parsed out of the message text.
    Message,
    /// Nothing matched; the status is the 500 fallback.
    Default,
}

impl StatusSource {
    /// True when the status came from the failure rather than the fallback.
    pub fn is_discovered(self) -> bool {
        self != StatusSource::Default
    }
}

/// One entry of a structured error-detail list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub message: String,
    pub domain: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
}

/// How a retry loop ended when it gave up on an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// Every attempt failed with an eligible error.
    Exhausted,
    /// A failure was not eligible for another attempt.
    Rejected,
    /// The overall deadline expired.
    DeadlineExceeded,
    /// The caller cancelled the loop.
    Cancelled,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TerminalState::Exhausted => "exhausted",
            TerminalState::Rejected => "rejected",
            TerminalState::DeadlineExceeded => "deadline exceeded",
            TerminalState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Attempt bookkeeping attached by the retry executor to the error it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySummary {
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub terminal: TerminalState,
}

impl RetrySummary {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// Canonical error report.
///
/// `http_status` is always populated (500 when nothing was discovered) and
/// `details` is always present, possibly empty.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message} (HTTP {http_status})")]
pub struct NormalizedError {
    pub http_status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grpc_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
    pub details: Vec<ErrorDetail>,
    pub is_retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    pub status_source: StatusSource,
    /// The raw failure this report was built from. Never serialized: it may
    /// carry request payloads.
    #[serde(skip)]
    pub original: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySummary>,
}

impl NormalizedError {
    /// Builds a report for a failure synthesized locally rather than parsed.
    ///
    /// The status is treated as discovered, so the default retry policy
    /// applies to it like any other known status.
    pub fn synthesized(http_status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            http_status,
            is_retryable: crate::normalize::is_retryable_by_default(
                http_status,
                StatusSource::Response,
                None,
            ),
            original: Value::String(message.clone()),
            message,
            grpc_status: None,
            reason: None,
            domain: None,
            location: None,
            location_type: None,
            details: Vec::new(),
            retry_after_ms: None,
            status_source: StatusSource::Response,
            retry: None,
        }
    }

    /// Server- or message-supplied wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }

    /// True when the status came from the failure rather than the fallback.
    pub fn has_discovered_status(&self) -> bool {
        self.status_source.is_discovered()
    }

    /// Attaches the retry executor's bookkeeping.
    pub fn with_retry_summary(mut self, summary: RetrySummary) -> Self {
        self.retry = Some(summary);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        classify(self)
    }
}
