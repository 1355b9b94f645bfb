//! Retry execution for remote API calls.
//!
//! This crate provides:
//! - Validated retry policy ([`RetryConfig`]) and a layered loader for it
//! - Exponential backoff with jitter, honoring server retry-after hints
//! - Eligibility decisions driven by normalized failures
//! - Overall deadlines and cancellation
//! - Per-attempt observer callbacks, logged through `tracing` by default

pub mod backoff;
pub mod eligibility;
mod executor;
pub mod loader;
pub mod observer;
mod policy;

pub use backoff::{DelaySource, apply_jitter, compute_backoff, next_delay};
pub use eligibility::{Eligibility, evaluate};
pub use executor::{RetryExecutor, execute_with_backoff};
pub use loader::{ConfigError, RetryConfigLoader, RetrySettings};
pub use observer::{AttemptRecord, Decision, RetryObserver, TracingObserver};
pub use policy::{
    DEFAULT_RETRIABLE_CODES, RetryConfig, RetryConfigBuilder, RetryConfigError,
};

pub use gws_api_errors::{NormalizedError, RetrySummary, TerminalState};
pub use tokio_util::sync::CancellationToken;
