//! Unified error taxonomy.

use std::fmt;

use serde::Serialize;

use crate::detect::{AUTH_ERROR_CONFIG, NOT_FOUND_ERROR_CONFIG, RATE_LIMIT_ERROR_CONFIG};
use crate::normalized::NormalizedError;

/// Category a failure belongs to, and therefore how callers should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed configuration or credentials. Fatal, never retried.
    Validation,
    /// 401/403, PERMISSION_DENIED, UNAUTHENTICATED. Needs re-authentication.
    Authentication,
    /// 429, RESOURCE_EXHAUSTED. Retried, honoring retry-after.
    RateLimit,
    /// 404, NOT_FOUND. Surfaced as is.
    NotFound,
    /// 5xx. Retried up to the attempt limit.
    TransientServer,
    /// Every persistence tier failed.
    Storage,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TransientServer => "transient_server",
            ErrorKind::Storage => "storage",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a normalized remote failure onto the taxonomy.
///
/// Rate limiting is checked before authentication: Google reports some
/// quota failures as 403 with a `rateLimitExceeded` reason.
pub fn classify(error: &NormalizedError) -> ErrorKind {
    if RATE_LIMIT_ERROR_CONFIG.matches(error) {
        ErrorKind::RateLimit
    } else if AUTH_ERROR_CONFIG.matches(error) {
        ErrorKind::Authentication
    } else if NOT_FOUND_ERROR_CONFIG.matches(error) {
        ErrorKind::NotFound
    } else if error.has_discovered_status() && error.http_status >= 500 {
        ErrorKind::TransientServer
    } else {
        ErrorKind::Unknown
    }
}
