//! Validated retry configuration.
//!
//! A [`RetryConfig`] can only be obtained through [`RetryConfigBuilder::build`]
//! (or `Default`), so every instance in the process already satisfies the
//! field constraints and the executor never re-checks them.

use std::collections::BTreeSet;
use std::time::Duration;

use gws_api_errors::ErrorKind;

/// HTTP statuses retried by default.
pub const DEFAULT_RETRIABLE_CODES: [u16; 5] = [429, 500, 502, 503, 504];

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Invalid retry configuration, rejected at construction time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("{field} must be greater than zero")]
    NonPositive { field: &'static str },

    #[error("max_delay_ms ({max_delay_ms}) must not be below initial_delay_ms ({initial_delay_ms})")]
    MaxDelayBelowInitial {
        initial_delay_ms: u64,
        max_delay_ms: u64,
    },

    #[error("backoff_multiplier must be a positive finite number, got {0}")]
    InvalidMultiplier(f64),

    #[error("jitter_factor must be within [0, 1], got {0}")]
    InvalidJitter(f64),

    #[error("retriable code {0} is not an HTTP status")]
    InvalidStatusCode(u16),
}

impl RetryConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Immutable retry policy shared read-only by concurrent executors.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    max_attempts: u32,
    initial_delay_ms: u64,
    max_delay_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
    retriable_codes: BTreeSet<u16>,
    /// Total elapsed budget across all attempts and sleeps.
    max_elapsed_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            retriable_codes: DEFAULT_RETRIABLE_CODES.into_iter().collect(),
            max_elapsed_ms: None,
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    pub fn retriable_codes(&self) -> &BTreeSet<u16> {
        &self.retriable_codes
    }

    pub fn is_retriable_code(&self, status: u16) -> bool {
        self.retriable_codes.contains(&status)
    }

    pub fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed_ms.map(Duration::from_millis)
    }
}

/// Builder for [`RetryConfig`]; starts from the defaults.
#[derive(Debug, Clone)]
pub struct RetryConfigBuilder {
    inner: RetryConfig,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self {
            inner: RetryConfig::default(),
        }
    }
}

impl RetryConfigBuilder {
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.inner.max_attempts = max_attempts;
        self
    }

    pub fn initial_delay_ms(mut self, initial_delay_ms: u64) -> Self {
        self.inner.initial_delay_ms = initial_delay_ms;
        self
    }

    pub fn max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.inner.max_delay_ms = max_delay_ms;
        self
    }

    pub fn backoff_multiplier(mut self, backoff_multiplier: f64) -> Self {
        self.inner.backoff_multiplier = backoff_multiplier;
        self
    }

    pub fn jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.inner.jitter_factor = jitter_factor;
        self
    }

    pub fn retriable_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.inner.retriable_codes = codes.into_iter().collect();
        self
    }

    pub fn max_elapsed_ms(mut self, max_elapsed_ms: Option<u64>) -> Self {
        self.inner.max_elapsed_ms = max_elapsed_ms;
        self
    }

    pub fn build(self) -> Result<RetryConfig, RetryConfigError> {
        let config = self.inner;

        if config.max_attempts == 0 {
            return Err(RetryConfigError::ZeroAttempts);
        }
        if config.initial_delay_ms == 0 {
            return Err(RetryConfigError::NonPositive {
                field: "initial_delay_ms",
            });
        }
        if config.max_delay_ms < config.initial_delay_ms {
            return Err(RetryConfigError::MaxDelayBelowInitial {
                initial_delay_ms: config.initial_delay_ms,
                max_delay_ms: config.max_delay_ms,
            });
        }
        if !config.backoff_multiplier.is_finite() || config.backoff_multiplier <= 0.0 {
            return Err(RetryConfigError::InvalidMultiplier(config.backoff_multiplier));
        }
        if !(0.0..=1.0).contains(&config.jitter_factor) {
            return Err(RetryConfigError::InvalidJitter(config.jitter_factor));
        }
        if config.max_elapsed_ms == Some(0) {
            return Err(RetryConfigError::NonPositive {
                field: "max_elapsed_ms",
            });
        }
        if let Some(code) = config
            .retriable_codes
            .iter()
            .find(|code| !(100..600).contains(*code))
        {
            return Err(RetryConfigError::InvalidStatusCode(*code));
        }

        Ok(config)
    }
}
