use std::fmt;

use gws_api_errors::NormalizedError;

use crate::policy::RetryConfig;

/// Why a failure was, or was not, eligible for another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// The status is one of the configured retriable codes. Overrides any
    /// non-retryable claim made by the failure itself.
    RetriableStatus(u16),
    /// The failure's own retryability claim.
    SelfReported(bool),
    /// The normalizer's default policy.
    DefaultPolicy(bool),
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        match self {
            Eligibility::RetriableStatus(_) => true,
            Eligibility::SelfReported(eligible) | Eligibility::DefaultPolicy(eligible) => eligible,
        }
    }

    pub fn rationale(self) -> &'static str {
        match self {
            Eligibility::RetriableStatus(_) => "retriable_status",
            Eligibility::SelfReported(_) => "self_reported",
            Eligibility::DefaultPolicy(_) => "default_policy",
        }
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eligibility::RetriableStatus(status) => write!(f, "status {status} is retriable"),
            Eligibility::SelfReported(eligible) => write!(f, "failure reports retryable={eligible}"),
            Eligibility::DefaultPolicy(eligible) => write!(f, "default policy retryable={eligible}"),
        }
    }
}

/// Decides whether `error` justifies another attempt under `config`.
///
/// The status is matched against the retriable codes as reported, including
/// the 500 fallback of a failure that carried no status at all. The default
/// policy alone would not retry such a failure.
pub fn evaluate(
    config: &RetryConfig,
    error: &NormalizedError,
    self_reported: Option<bool>,
) -> Eligibility {
    if config.is_retriable_code(error.http_status) {
        return Eligibility::RetriableStatus(error.http_status);
    }
    match self_reported {
        Some(retryable) => Eligibility::SelfReported(retryable),
        None => Eligibility::DefaultPolicy(error.is_retryable),
    }
}
