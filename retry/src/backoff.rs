//! Backoff delay computation.

use std::time::Duration;

use rand::Rng;

use crate::policy::RetryConfig;

/// Which rule produced the delay before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelaySource {
    /// Exponential schedule, optionally jittered.
    Backoff,
    /// Server- or message-supplied retry-after hint.
    RetryAfter,
}

impl DelaySource {
    pub fn as_str(self) -> &'static str {
        match self {
            DelaySource::Backoff => "backoff",
            DelaySource::RetryAfter => "retry_after",
        }
    }
}

/// Unjittered delay after failed `attempt` (1-indexed):
/// `min(max_delay, initial_delay * multiplier^(attempt - 1))`.
pub fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw_ms = config.initial_delay().as_millis() as f64 * config.backoff_multiplier().powi(exponent);
    let capped_ms = raw_ms.min(config.max_delay().as_millis() as f64);
    Duration::from_millis(capped_ms as u64)
}

/// Apply jitter to a duration
///
/// Multiplies by a uniform factor in `[1 - jitter_factor, 1 + jitter_factor]`.
/// Example: 100ms with 0.5 jitter → 50ms to 150ms
pub fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }
    let factor = rand::rng().random_range((1.0 - jitter_factor)..=(1.0 + jitter_factor));
    let jittered_ms = (duration.as_millis() as f64 * factor).max(0.0).round() as u64;
    Duration::from_millis(jittered_ms)
}

/// Delay to wait after failed `attempt`.
///
/// A retry-after hint replaces the schedule. Either way the delay is kept
/// within `[initial_delay, max_delay]`; scheduled delays are jittered first.
pub fn next_delay(
    config: &RetryConfig,
    attempt: u32,
    retry_after: Option<Duration>,
) -> (Duration, DelaySource) {
    if let Some(hint) = retry_after {
        return (
            hint.clamp(config.initial_delay(), config.max_delay()),
            DelaySource::RetryAfter,
        );
    }

    let jittered = apply_jitter(compute_backoff(config, attempt), config.jitter_factor());
    (
        jittered.clamp(config.initial_delay(), config.max_delay()),
        DelaySource::Backoff,
    )
}
