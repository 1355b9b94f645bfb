//! Declarative error detection.
//!
//! An [`ErrorDetectionConfig`] lists independent criteria; a failure matches
//! when any single criterion does. Criteria are evaluated in a fixed order
//! and the first hit is reported as a [`DetectionMatch`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use serde_json::Value;

use crate::normalize::normalize;
use crate::normalized::NormalizedError;

/// Predicate over a reason string.
pub type ReasonPattern = fn(&str) -> bool;

/// Criteria describing one class of failure.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetectionConfig {
    pub http_status_codes: BTreeSet<u16>,
    pub grpc_status_codes: BTreeSet<String>,
    pub reasons: BTreeSet<String>,
    /// Matched case-insensitively against the message.
    pub message_keywords: Vec<String>,
    pub reason_pattern: Option<ReasonPattern>,
}

/// The criterion that made a failure match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionMatch {
    HttpStatus(u16),
    GrpcStatus(String),
    Reason(String),
    ReasonPattern(String),
    Keyword(String),
}

impl fmt::Display for DetectionMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMatch::HttpStatus(status) => write!(f, "http status {status}"),
            DetectionMatch::GrpcStatus(status) => write!(f, "grpc status {status}"),
            DetectionMatch::Reason(reason) => write!(f, "reason {reason}"),
            DetectionMatch::ReasonPattern(reason) => write!(f, "reason pattern on {reason}"),
            DetectionMatch::Keyword(keyword) => write!(f, "message keyword '{keyword}'"),
        }
    }
}

impl ErrorDetectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.http_status_codes.extend(codes);
        self
    }

    pub fn with_grpc_status_codes<S: Into<String>>(
        mut self,
        codes: impl IntoIterator<Item = S>,
    ) -> Self {
        self.grpc_status_codes.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn with_reasons<S: Into<String>>(mut self, reasons: impl IntoIterator<Item = S>) -> Self {
        self.reasons.extend(reasons.into_iter().map(Into::into));
        self
    }

    pub fn with_message_keywords<S: Into<String>>(
        mut self,
        keywords: impl IntoIterator<Item = S>,
    ) -> Self {
        self.message_keywords
            .extend(keywords.into_iter().map(|k| k.into().to_lowercase()));
        self
    }

    pub fn with_reason_pattern(mut self, pattern: ReasonPattern) -> Self {
        self.reason_pattern = Some(pattern);
        self
    }

    pub fn matches(&self, error: &NormalizedError) -> bool {
        self.first_match(error).is_some()
    }

    /// First criterion that matches, in evaluation order.
    ///
    /// The HTTP criterion uses the reported status, including the 500
    /// fallback, so a shapeless failure can still match a status list.
    pub fn first_match(&self, error: &NormalizedError) -> Option<DetectionMatch> {
        if self.http_status_codes.contains(&error.http_status) {
            return Some(DetectionMatch::HttpStatus(error.http_status));
        }

        if let Some(grpc) = error
            .grpc_status
            .as_deref()
            .filter(|g| self.grpc_status_codes.contains(*g))
        {
            return Some(DetectionMatch::GrpcStatus(grpc.to_string()));
        }

        if let Some(reason) = error.reason.as_deref() {
            if self.reasons.contains(reason) {
                return Some(DetectionMatch::Reason(reason.to_string()));
            }
            if self.reason_pattern.is_some_and(|pattern| pattern(reason)) {
                return Some(DetectionMatch::ReasonPattern(reason.to_string()));
            }
        }

        let message = error.message.to_lowercase();
        self.message_keywords
            .iter()
            .find(|keyword| !keyword.is_empty() && message.contains(&keyword.to_lowercase()))
            .map(|keyword| DetectionMatch::Keyword(keyword.clone()))
    }
}

/// Normalizes `failure` and evaluates it against `config`.
pub fn detect_error_type(failure: &Value, config: &ErrorDetectionConfig) -> bool {
    config.matches(&normalize(failure))
}

pub fn is_authentication_error(error: &NormalizedError) -> bool {
    AUTH_ERROR_CONFIG.matches(error)
}

pub fn is_rate_limit_error(error: &NormalizedError) -> bool {
    RATE_LIMIT_ERROR_CONFIG.matches(error)
}

pub fn is_not_found_error(error: &NormalizedError) -> bool {
    NOT_FOUND_ERROR_CONFIG.matches(error)
}

fn reason_mentions_auth(reason: &str) -> bool {
    reason.to_lowercase().contains("auth")
}

/// Authentication and authorization failures.
pub static AUTH_ERROR_CONFIG: LazyLock<ErrorDetectionConfig> = LazyLock::new(|| {
    ErrorDetectionConfig::new()
        .with_http_status_codes([401, 403])
        .with_grpc_status_codes(["PERMISSION_DENIED", "UNAUTHENTICATED"])
        .with_reasons(["forbidden", "unauthorized", "authError"])
        .with_message_keywords([
            "authentication",
            "unauthorized",
            "credential",
            "invalid_grant",
            "token",
            "permission",
        ])
        .with_reason_pattern(reason_mentions_auth)
});

/// Rate limiting and quota exhaustion.
pub static RATE_LIMIT_ERROR_CONFIG: LazyLock<ErrorDetectionConfig> = LazyLock::new(|| {
    ErrorDetectionConfig::new()
        .with_http_status_codes([429])
        .with_grpc_status_codes(["RESOURCE_EXHAUSTED"])
        .with_reasons([
            "rateLimitExceeded",
            "userRateLimitExceeded",
            "quotaExceeded",
            "dailyLimitExceeded",
        ])
        .with_message_keywords(["rate limit", "quota", "too many requests"])
});

/// Missing resources.
pub static NOT_FOUND_ERROR_CONFIG: LazyLock<ErrorDetectionConfig> = LazyLock::new(|| {
    ErrorDetectionConfig::new()
        .with_http_status_codes([404])
        .with_grpc_status_codes(["NOT_FOUND"])
        .with_reasons(["notFound"])
        .with_message_keywords(["not found"])
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::DEFAULT_HTTP_STATUS;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn empty_config_never_matches() {
        let config = ErrorDetectionConfig::new();
        for failure in [
            Value::Null,
            json!(""),
            json!(7),
            json!({}),
            json!({ "response": { "status": 401 } }),
            json!({ "message": "permission denied" }),
        ] {
            assert!(!detect_error_type(&failure, &config), "{failure}");
        }
    }

    #[test]
    fn keyword_alone_detects_auth() {
        let failure = json!({ "message": "Permission denied" });
        assert!(detect_error_type(&failure, &AUTH_ERROR_CONFIG));
        assert_eq!(
            AUTH_ERROR_CONFIG.first_match(&normalize(&failure)),
            Some(DetectionMatch::Keyword("permission".to_string()))
        );
    }

    #[test]
    fn status_is_checked_first() {
        let failure = json!({
            "message": "token expired",
            "response": { "status": 401 }
        });
        assert_eq!(
            AUTH_ERROR_CONFIG.first_match(&normalize(&failure)),
            Some(DetectionMatch::HttpStatus(401))
        );
    }

    #[test]
    fn grpc_status_matches_without_http_membership() {
        let failure = json!({
            "error": { "code": 400, "status": "UNAUTHENTICATED", "message": "bad request" }
        });
        assert_eq!(
            AUTH_ERROR_CONFIG.first_match(&normalize(&failure)),
            Some(DetectionMatch::GrpcStatus("UNAUTHENTICATED".to_string()))
        );
    }

    #[test]
    fn reason_pattern_applies_after_exact_reasons() {
        let failure = json!({
            "error": { "code": 400, "message": "bad request",
                       "errors": [{ "reason": "invalidAuthScope" }] }
        });
        assert_eq!(
            AUTH_ERROR_CONFIG.first_match(&normalize(&failure)),
            Some(DetectionMatch::ReasonPattern("invalidAuthScope".to_string()))
        );
    }

    #[test]
    fn defaulted_status_matches_status_list() {
        let config = ErrorDetectionConfig::new().with_http_status_codes([500]);
        for failure in [Value::Null, json!({}), json!("socket hang up")] {
            assert_eq!(normalize(&failure).http_status, DEFAULT_HTTP_STATUS);
            assert_eq!(
                config.first_match(&normalize(&failure)),
                Some(DetectionMatch::HttpStatus(500)),
                "{failure}"
            );
        }
        assert!(detect_error_type(&json!({ "code": 500 }), &config));
        assert!(!detect_error_type(&Value::Null, &NOT_FOUND_ERROR_CONFIG));
    }

    #[test]
    fn rate_limit_and_not_found() {
        let throttled = normalize(&json!({ "response": { "status": 429 } }));
        assert!(is_rate_limit_error(&throttled));
        assert!(!is_not_found_error(&throttled));

        let quota = normalize(&json!({ "message": "Quota exceeded for project" }));
        assert!(is_rate_limit_error(&quota));

        let missing = normalize(&json!({
            "error": { "code": 404, "status": "NOT_FOUND", "message": "Requested entity was not found." }
        }));
        assert!(is_not_found_error(&missing));
        assert!(!is_authentication_error(&missing));
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let config = ErrorDetectionConfig::new().with_message_keywords(["Not Found"]);
        assert!(detect_error_type(&json!("FILE NOT FOUND"), &config));
    }
}
