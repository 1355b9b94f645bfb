use serde_json::{Value, json};

use crate::normalize::normalize;
use crate::normalized::NormalizedError;

/// Seam through which an operation's error type is inspected.
///
/// Remote clients expose failures in whatever shape they like. Implementors
/// describe theirs as a JSON value the normalizer understands, and may
/// report their own opinion on retryability.
pub trait ApiFailure {
    /// Duck-typed shape of this failure (`response`, `code`, `message`, ...).
    fn failure_value(&self) -> Value;

    fn normalized(&self) -> NormalizedError {
        normalize(&self.failure_value())
    }

    /// The failure's own retryability claim, if it makes one.
    fn self_reported_retryable(&self) -> Option<bool> {
        None
    }
}

impl ApiFailure for Value {
    fn failure_value(&self) -> Value {
        self.clone()
    }

    fn normalized(&self) -> NormalizedError {
        normalize(self)
    }

    fn self_reported_retryable(&self) -> Option<bool> {
        ["retryable", "isRetryable"]
            .iter()
            .find_map(|key| self.get(*key).and_then(Value::as_bool))
    }
}

impl ApiFailure for NormalizedError {
    fn failure_value(&self) -> Value {
        self.original.clone()
    }

    fn normalized(&self) -> NormalizedError {
        self.clone()
    }

    fn self_reported_retryable(&self) -> Option<bool> {
        Some(self.is_retryable)
    }
}

impl ApiFailure for anyhow::Error {
    fn failure_value(&self) -> Value {
        match self.downcast_ref::<NormalizedError>() {
            Some(inner) => inner.failure_value(),
            None => json!({ "message": format!("{self:#}") }),
        }
    }

    fn normalized(&self) -> NormalizedError {
        match self.downcast_ref::<NormalizedError>() {
            Some(inner) => inner.clone(),
            None => normalize(&self.failure_value()),
        }
    }

    fn self_reported_retryable(&self) -> Option<bool> {
        self.downcast_ref::<NormalizedError>()
            .and_then(NormalizedError::self_reported_retryable)
    }
}

impl ApiFailure for std::io::Error {
    fn failure_value(&self) -> Value {
        json!({ "message": self.to_string() })
    }
}

impl ApiFailure for String {
    fn failure_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl ApiFailure for &str {
    fn failure_value(&self) -> Value {
        Value::String((*self).to_string())
    }
}
