//! Tolerant parsing of arbitrary failure shapes.
//!
//! Every reader here type-checks the field it touches and falls through to
//! the next source when the shape does not match. Nothing in this module
//! panics or returns an error.

use std::sync::LazyLock;
use std::time::Duration;

use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::normalized::{ErrorDetail, NormalizedError, StatusSource};

/// Status used when no source yields one.
pub const DEFAULT_HTTP_STATUS: u16 = 500;

const UNKNOWN_MESSAGE: &str = "Unknown error";

/// Reasons that are retryable regardless of status.
const RETRYABLE_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "quotaExceeded",
    "backendError",
    "internalServerError",
];

#[allow(clippy::expect_used)] // Static pattern; failure is a programming error
static CONTEXTUAL_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:status|code)\b[\s:=]*(\d{3})\b").expect("valid status regex")
});

#[allow(clippy::expect_used)] // Static pattern; failure is a programming error
static BARE_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{3})\b").expect("valid bare status regex"));

#[allow(clippy::expect_used)] // Static pattern; failure is a programming error
static RETRY_AFTER_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bretry[\s-]+(?:after|in)\s*:?\s*(\d+)").expect("valid retry-after regex")
});

/// Parses any failure into a fully populated [`NormalizedError`].
pub fn normalize(failure: &Value) -> NormalizedError {
    let envelope = structured_envelope(failure);
    let details = envelope.map(envelope_details).unwrap_or_default();
    let first = details.first();

    let (http_status, status_source) =
        discover_http_status(failure).unwrap_or((DEFAULT_HTTP_STATUS, StatusSource::Default));

    let reason = first.and_then(|d| non_empty(&d.reason)).or_else(|| {
        envelope
            .and_then(error_info)
            .and_then(|info| string_field(info, "reason"))
    });
    let domain = first.and_then(|d| non_empty(&d.domain)).or_else(|| {
        envelope
            .and_then(error_info)
            .and_then(|info| string_field(info, "domain"))
    });

    let is_retryable = is_retryable_by_default(http_status, status_source, reason.as_deref());

    NormalizedError {
        http_status,
        message: extract_message(failure),
        grpc_status: envelope.and_then(|e| string_field(e, "status")),
        domain,
        location: first.and_then(|d| d.location.clone()),
        location_type: first.and_then(|d| d.location_type.clone()),
        reason,
        is_retryable,
        retry_after_ms: extract_retry_after(failure)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        status_source,
        original: failure.clone(),
        retry: None,
        details,
    }
}

/// HTTP status of a failure, 500 when none is discoverable.
pub fn extract_http_status(failure: &Value) -> u16 {
    discover_http_status(failure)
        .map(|(status, _)| status)
        .unwrap_or(DEFAULT_HTTP_STATUS)
}

/// Walks the status sources in priority order and reports the first hit.
pub fn discover_http_status(failure: &Value) -> Option<(u16, StatusSource)> {
    if let Some(status) = structured_envelope(failure)
        .and_then(|e| e.get("code"))
        .and_then(coerce_status)
    {
        return Some((status, StatusSource::Envelope));
    }

    if let Some(status) = failure.pointer("/response/status").and_then(coerce_status) {
        return Some((status, StatusSource::Response));
    }

    if let Some(status) = failure.get("code").and_then(coerce_status) {
        return Some((status, StatusSource::Code));
    }

    if let Some(status) = failure.get("status").and_then(coerce_status) {
        return Some((status, StatusSource::Status));
    }

    status_from_message(&extract_message(failure)).map(|status| (status, StatusSource::Message))
}

/// Retry-after hint: the `retry-after` response header, else a
/// `retry after N` / `retry in N` phrase in the message. Both are seconds.
pub fn extract_retry_after(failure: &Value) -> Option<Duration> {
    let header = failure
        .pointer("/response/headers")
        .and_then(Value::as_object)
        .and_then(|headers| {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
                .map(|(_, value)| value)
        })
        .and_then(seconds_value);

    if let Some(secs) = header {
        return Some(Duration::from_secs(secs));
    }

    let message = extract_message(failure);
    RETRY_AFTER_TEXT
        .captures(&message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Human-readable message of a failure, `"Unknown error"` when absent.
pub fn extract_message(failure: &Value) -> String {
    if let Value::String(text) = failure {
        return non_empty(text).unwrap_or_else(|| UNKNOWN_MESSAGE.to_string());
    }

    structured_envelope(failure)
        .and_then(|e| string_field(e, "message"))
        .or_else(|| failure.get("message").and_then(Value::as_str).and_then(non_empty))
        .or_else(|| {
            failure
                .get("error_description")
                .and_then(Value::as_str)
                .and_then(non_empty)
        })
        .or_else(|| failure.get("error").and_then(Value::as_str).and_then(non_empty))
        .or_else(|| {
            failure
                .pointer("/response/statusText")
                .and_then(Value::as_str)
                .and_then(non_empty)
        })
        .unwrap_or_else(|| UNKNOWN_MESSAGE.to_string())
}

/// Default retry policy.
///
/// A discovered 5xx or 429 is retryable, as is any status paired with an
/// allow-listed reason. The 500 fallback alone never makes a failure
/// retryable.
pub fn is_retryable_by_default(status: u16, source: StatusSource, reason: Option<&str>) -> bool {
    if source.is_discovered() && (status >= 500 || status == 429) {
        return true;
    }
    reason.is_some_and(|r| RETRYABLE_REASONS.contains(&r))
}

fn structured_envelope(failure: &Value) -> Option<&Map<String, Value>> {
    if let Some(envelope) = failure
        .pointer("/response/data/error")
        .and_then(Value::as_object)
    {
        return Some(envelope);
    }

    // Raw API bodies carry the envelope at the top level.
    failure
        .get("error")
        .and_then(Value::as_object)
        .filter(|e| e.contains_key("code") || e.contains_key("errors"))
}

fn envelope_details(envelope: &Map<String, Value>) -> Vec<ErrorDetail> {
    let Some(entries) = envelope.get("errors").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(Value::as_object)
        .map(|entry| ErrorDetail {
            message: string_field(entry, "message").unwrap_or_default(),
            domain: string_field(entry, "domain").unwrap_or_default(),
            reason: string_field(entry, "reason").unwrap_or_default(),
            location: string_field(entry, "location"),
            location_type: string_field(entry, "locationType"),
        })
        .collect()
}

/// First `google.rpc.ErrorInfo`-style entry of `envelope.details`.
fn error_info(envelope: &Map<String, Value>) -> Option<&Map<String, Value>> {
    envelope
        .get("details")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(Value::as_object)
        .find(|d| d.contains_key("reason"))
}

fn status_from_message(message: &str) -> Option<u16> {
    if let Some(status) = CONTEXTUAL_STATUS
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .filter(|s| (100..600).contains(s))
    {
        return Some(status);
    }

    BARE_STATUS
        .captures_iter(message)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<u16>().ok())
        .find(|s| (100..600).contains(s) && !(200..300).contains(s))
}

fn coerce_status(value: &Value) -> Option<u16> {
    let raw = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    if (100..600).contains(&raw) {
        Some(raw as u16)
    } else {
        None
    }
}

fn seconds_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        // Some clients expose multi-valued headers as arrays.
        Value::Array(values) => values.first().and_then(seconds_value),
        _ => None,
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).and_then(non_empty)
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
