#![allow(clippy::expect_used, clippy::unwrap_used)]

//! End-to-end normalization scenarios against realistic client failures.

use gws_api_errors::{
    AUTH_ERROR_CONFIG, ErrorDetectionConfig, ErrorKind, StatusSource, detect_error_type,
    extract_http_status, normalize,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

#[test]
fn response_status_is_deterministic_regardless_of_message_digits() {
    for message in ["", "status 500", "code 503 from upstream", "error 418 then 502"] {
        let failure = json!({ "message": message, "response": { "status": 404 } });
        assert_eq!(extract_http_status(&failure), 404, "message: {message}");
    }
}

#[test]
fn empty_detection_config_rejects_everything() {
    let config = ErrorDetectionConfig::default();
    let inputs = [
        Value::Null,
        json!(false),
        json!("Permission denied"),
        json!({ "code": 401, "message": "unauthorized" }),
        json!({ "error": { "code": 403, "status": "PERMISSION_DENIED",
                           "errors": [{ "reason": "forbidden" }] } }),
    ];
    for input in inputs {
        assert!(!detect_error_type(&input, &config), "{input}");
    }
}

#[test]
fn permission_denied_message_is_an_auth_error() {
    assert!(detect_error_type(
        &json!({ "message": "Permission denied" }),
        &AUTH_ERROR_CONFIG
    ));
}

#[test]
fn failure_without_message_can_match_on_status() {
    assert!(detect_error_type(
        &json!({ "response": { "status": 403 } }),
        &AUTH_ERROR_CONFIG
    ));
}

#[test]
fn serialized_report_uses_camel_case_and_hides_original() {
    let err = normalize(&json!({
        "response": {
            "status": 429,
            "headers": { "retry-after": "2" },
            "data": { "error": {
                "code": 429,
                "message": "Rate Limit Exceeded",
                "status": "RESOURCE_EXHAUSTED",
                "errors": [{ "message": "Rate Limit Exceeded", "domain": "usageLimits",
                             "reason": "rateLimitExceeded" }]
            } }
        },
        "config": { "headers": { "Authorization": "Bearer secret" } }
    }));

    assert_eq!(err.kind(), ErrorKind::RateLimit);
    assert_eq!(err.status_source, StatusSource::Envelope);

    let serialized = serde_json::to_value(&err).expect("serialize");
    assert_eq!(serialized["httpStatus"], json!(429));
    assert_eq!(serialized["grpcStatus"], json!("RESOURCE_EXHAUSTED"));
    assert_eq!(serialized["retryAfterMs"], json!(2000));
    assert_eq!(serialized["isRetryable"], json!(true));
    assert_eq!(serialized["details"][0]["reason"], json!("rateLimitExceeded"));
    assert!(serialized.get("original").is_none());
    assert!(!serialized.to_string().contains("Bearer secret"));
}

#[test]
fn bare_error_without_status_is_not_retryable() {
    let err = normalize(&json!({ "name": "Error", "message": "Something broke" }));
    assert_eq!(err.http_status, 500);
    assert!(!err.has_discovered_status());
    assert!(!err.is_retryable);
    assert_eq!(err.kind(), ErrorKind::Unknown);
}
