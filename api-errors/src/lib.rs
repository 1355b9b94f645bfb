//! Normalization and classification of remote API failures.
//!
//! Remote clients fail with errors of many shapes: structured Google-style
//! envelopes, bare transport responses, OAuth error bodies, plain messages.
//! This crate turns any of them into a single [`NormalizedError`] and answers
//! classification questions about it.
//!
//! - [`normalize`]: total parser from an arbitrary failure to a canonical report
//! - [`detect`]: declarative detection configs (authentication, rate limit, not found)
//! - [`kind`]: the unified error taxonomy used by callers
//! - [`ApiFailure`]: the seam through which operation error types are inspected

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod detect;
mod failure;
pub mod kind;
pub mod normalize;
mod normalized;

pub use detect::{
    AUTH_ERROR_CONFIG, DetectionMatch, ErrorDetectionConfig, NOT_FOUND_ERROR_CONFIG,
    RATE_LIMIT_ERROR_CONFIG, detect_error_type, is_authentication_error, is_not_found_error,
    is_rate_limit_error,
};
pub use failure::ApiFailure;
pub use kind::{ErrorKind, classify};
pub use normalize::{
    DEFAULT_HTTP_STATUS, discover_http_status, extract_http_status, extract_message,
    extract_retry_after, is_retryable_by_default, normalize,
};
pub use normalized::{ErrorDetail, NormalizedError, RetrySummary, StatusSource, TerminalState};
