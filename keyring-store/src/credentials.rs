//! The persisted OAuth credential record.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zeroize::{Zeroize, Zeroizing};

use crate::secret::SecretBuffer;

/// Structural problems that make a record unfit to persist or return.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("credential record is not a JSON object")]
    NotAnObject,

    #[error("tokens.access_token must be a non-empty string")]
    MissingAccessToken,

    #[error("clientConfig.clientId must be a non-empty string")]
    MissingClientId,

    #[error("storedAt must be a number")]
    InvalidStoredAt,
}

/// OAuth token set as issued by the authorization server.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Fields this crate does not interpret, carried through unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenSet {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expiry_date: None,
            token_type: None,
            scope: None,
            id_token: None,
            extra: Map::new(),
        }
    }
}

impl Drop for TokenSet {
    fn drop(&mut self) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
        self.id_token.zeroize();
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expiry_date", &self.expiry_date)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// OAuth client registration used to obtain the tokens.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            extra: Map::new(),
        }
    }
}

impl Drop for ClientConfig {
    fn drop(&mut self) {
        self.client_secret.zeroize();
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

/// One persisted credential record. Saving replaces the previous record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    pub tokens: TokenSet,
    pub client_config: ClientConfig,
    /// Epoch milliseconds at which the record was written.
    pub stored_at: i64,
}

impl StoredCredentials {
    pub fn new(tokens: TokenSet, client_config: ClientConfig, stored_at: i64) -> Self {
        Self {
            tokens,
            client_config,
            stored_at,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tokens.access_token.is_empty() {
            return Err(ValidationError::MissingAccessToken);
        }
        if self.client_config.client_id.is_empty() {
            return Err(ValidationError::MissingClientId);
        }
        Ok(())
    }

    /// Serializes into a buffer that is zeroed on drop.
    ///
    /// The length is measured first so the buffer is allocated exactly once;
    /// a growing `Vec` would free earlier plaintext copies unzeroed.
    pub(crate) fn to_secret_json(&self) -> serde_json::Result<SecretBuffer> {
        let mut counter = ByteCounter::default();
        serde_json::to_writer(&mut counter, self)?;

        let mut buffer = Zeroizing::new(Vec::with_capacity(counter.0));
        serde_json::to_writer(&mut *buffer, self)?;
        Ok(SecretBuffer::from_zeroizing(buffer))
    }

    /// Parses and validates a persisted record. Anything unusable is `None`.
    pub(crate) fn from_secret_json(plaintext: &SecretBuffer) -> Option<Self> {
        let credentials: Self = serde_json::from_slice(plaintext.as_bytes()).ok()?;
        credentials.validate().ok()?;
        Some(credentials)
    }
}

/// Sink that only counts serialized bytes.
#[derive(Default)]
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Structural check on an untyped record, for callers holding raw JSON.
pub fn validate_value(value: &Value) -> Result<(), ValidationError> {
    let record = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let access_token = record
        .get("tokens")
        .and_then(|tokens| tokens.get("access_token"))
        .and_then(Value::as_str);
    if access_token.is_none_or(str::is_empty) {
        return Err(ValidationError::MissingAccessToken);
    }

    let client_id = record
        .get("clientConfig")
        .and_then(|config| config.get("clientId"))
        .and_then(Value::as_str);
    if client_id.is_none_or(str::is_empty) {
        return Err(ValidationError::MissingClientId);
    }

    if !record.get("storedAt").is_some_and(Value::is_number) {
        return Err(ValidationError::InvalidStoredAt);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> StoredCredentials {
        let mut tokens = TokenSet::new("ya29.access");
        tokens.refresh_token = Some("1//refresh".to_string());
        tokens.expiry_date = Some(1_700_000_000_000);
        tokens.scope = Some("https://www.googleapis.com/auth/drive".to_string());
        let mut client = ClientConfig::new("client-123.apps.googleusercontent.com");
        client.client_secret = Some("shh".to_string());
        StoredCredentials::new(tokens, client, 1_700_000_000_000)
    }

    #[test]
    fn wire_shape() {
        let value = serde_json::to_value(sample()).expect("serialize");
        assert_eq!(
            value,
            json!({
                "tokens": {
                    "access_token": "ya29.access",
                    "refresh_token": "1//refresh",
                    "expiry_date": 1_700_000_000_000i64,
                    "scope": "https://www.googleapis.com/auth/drive"
                },
                "clientConfig": {
                    "clientId": "client-123.apps.googleusercontent.com",
                    "clientSecret": "shh"
                },
                "storedAt": 1_700_000_000_000i64
            })
        );
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let value = json!({
            "tokens": { "access_token": "a", "refresh_token_expires_in": 3600 },
            "clientConfig": { "clientId": "c", "projectId": "demo" },
            "storedAt": 1
        });
        let parsed: StoredCredentials = serde_json::from_value(value.clone()).expect("parse");
        assert_eq!(parsed.tokens.extra.get("refresh_token_expires_in"), Some(&json!(3600)));
        assert_eq!(serde_json::to_value(&parsed).expect("serialize"), value);
    }

    #[test]
    fn typed_validation() {
        assert_eq!(sample().validate(), Ok(()));

        let mut missing_token = sample();
        missing_token.tokens.access_token.clear();
        assert_eq!(missing_token.validate(), Err(ValidationError::MissingAccessToken));

        let mut missing_client = sample();
        missing_client.client_config.client_id.clear();
        assert_eq!(missing_client.validate(), Err(ValidationError::MissingClientId));
    }

    #[test]
    fn untyped_validation() {
        let valid = json!({
            "tokens": { "access_token": "a" },
            "clientConfig": { "clientId": "c" },
            "storedAt": 1.5
        });
        assert_eq!(validate_value(&valid), Ok(()));

        assert_eq!(validate_value(&json!("nope")), Err(ValidationError::NotAnObject));
        assert_eq!(
            validate_value(&json!({ "tokens": { "access_token": 7 }, "clientConfig": { "clientId": "c" }, "storedAt": 1 })),
            Err(ValidationError::MissingAccessToken)
        );
        assert_eq!(
            validate_value(&json!({ "tokens": { "access_token": "a" }, "clientConfig": {}, "storedAt": 1 })),
            Err(ValidationError::MissingClientId)
        );
        assert_eq!(
            validate_value(&json!({ "tokens": { "access_token": "a" }, "clientConfig": { "clientId": "c" }, "storedAt": "yesterday" })),
            Err(ValidationError::InvalidStoredAt)
        );
    }

    #[test]
    fn secret_json_round_trip_rejects_invalid_records() {
        let buffer = sample().to_secret_json().expect("serialize");
        assert_eq!(StoredCredentials::from_secret_json(&buffer), Some(sample()));

        let garbage = SecretBuffer::from("{not json".to_string());
        assert_eq!(StoredCredentials::from_secret_json(&garbage), None);

        let empty_token = SecretBuffer::from(
            json!({ "tokens": { "access_token": "" }, "clientConfig": { "clientId": "c" }, "storedAt": 1 })
                .to_string(),
        );
        assert_eq!(StoredCredentials::from_secret_json(&empty_token), None);
    }

    #[test]
    fn large_records_serialize_without_reallocating() {
        let mut credentials = sample();
        credentials.tokens.id_token = Some(format!("eyJhbGciOiJSUzI1NiJ9.{}", "x".repeat(1_200)));
        credentials.tokens.scope = Some(
            [
                "https://www.googleapis.com/auth/drive",
                "https://www.googleapis.com/auth/gmail.modify",
                "https://www.googleapis.com/auth/calendar",
            ]
            .join(" "),
        );

        let buffer = credentials.to_secret_json().expect("serialize");
        assert!(buffer.len() > 1024, "record is only {} bytes", buffer.len());
        assert_eq!(buffer.capacity(), buffer.len());
        assert_eq!(StoredCredentials::from_secret_json(&buffer), Some(credentials));
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("ya29.access"));
        assert!(!rendered.contains("1//refresh"));
        assert!(!rendered.contains("shh"));
    }
}
