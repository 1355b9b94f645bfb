//! Two-tier credential persistence.
//!
//! Tier 1 is the OS keyring. Tier 2 is an encrypted file, used whenever the
//! keyring cannot produce a usable record. Blocking keyring and filesystem
//! work runs on the blocking thread pool.

use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use crate::credentials::StoredCredentials;
use crate::error::Result;
use crate::error::StorageError;
use crate::file_store::EncryptedFileStore;
use crate::os_keyring::DefaultKeyringStore;
use crate::os_keyring::KeyringStore;
use crate::secret::SecretBuffer;

/// Keyring service name of the credential entry.
pub const SERVICE_NAME: &str = "google-workspace-mcp";

/// Keyring account name of the credential entry.
pub const ACCOUNT_NAME: &str = "oauth-credentials";

/// Which tier produced or accepted a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Keyring,
    EncryptedFile,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Keyring => "keyring",
            Tier::EncryptedFile => "encrypted_file",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecureTokenStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    keyring: Arc<dyn KeyringStore>,
    file: EncryptedFileStore,
    service: String,
    account: String,
}

impl SecureTokenStore {
    pub fn new(keyring: Arc<dyn KeyringStore>, file: EncryptedFileStore) -> Self {
        Self::with_entry(keyring, file, SERVICE_NAME, ACCOUNT_NAME)
    }

    /// Uses a keyring entry other than the default one.
    pub fn with_entry(
        keyring: Arc<dyn KeyringStore>,
        file: EncryptedFileStore,
        service: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                keyring,
                file,
                service: service.into(),
                account: account.into(),
            }),
        }
    }

    /// Platform keyring plus the file under the per-user config directory.
    pub fn with_defaults() -> Result<Self> {
        let file = EncryptedFileStore::with_defaults(SERVICE_NAME, ACCOUNT_NAME)
            .map_err(StorageError::FileTierUnavailable)?;
        Ok(Self::new(Arc::new(DefaultKeyringStore), file))
    }

    /// Validates and persists `credentials`, replacing any previous record.
    /// Returns the tier that accepted it.
    pub async fn save(&self, credentials: &StoredCredentials) -> Result<Tier> {
        credentials.validate()?;
        let plaintext = credentials.to_secret_json()?;

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.save_blocking(plaintext)).await?
    }

    /// The stored record, or `None` when no tier holds a usable one.
    pub async fn load(&self) -> Option<StoredCredentials> {
        let inner = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || inner.load_blocking()).await {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(error = %err, "credential load task failed");
                None
            }
        }
    }

    /// Removes the record from both tiers. Never fails.
    pub async fn delete(&self) {
        let inner = Arc::clone(&self.inner);
        if let Err(err) = tokio::task::spawn_blocking(move || inner.delete_blocking()).await {
            warn!(error = %err, "credential delete task failed");
        }
    }

    /// Whether the keyring holds an entry or the encrypted file is present.
    pub async fn exists(&self) -> bool {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.exists_blocking())
            .await
            .unwrap_or(false)
    }
}

impl Inner {
    fn save_blocking(&self, plaintext: SecretBuffer) -> Result<Tier> {
        let keyring_err = match plaintext.as_str() {
            Some(text) => match self.keyring.save(&self.service, &self.account, text) {
                Ok(()) => {
                    debug!(tier = Tier::Keyring.as_str(), "stored credentials");
                    return Ok(Tier::Keyring);
                }
                Err(err) => err,
            },
            None => keyring::Error::BadEncoding(Vec::new()).into(),
        };
        warn!(error = %keyring_err, "keyring unavailable, falling back to encrypted file");

        match self.file.save(plaintext.as_bytes()) {
            Ok(()) => {
                debug!(
                    tier = Tier::EncryptedFile.as_str(),
                    path = %self.file.path().display(),
                    "stored credentials"
                );
                Ok(Tier::EncryptedFile)
            }
            Err(file_err) => Err(StorageError::AllTiersFailed {
                keyring: keyring_err,
                file: file_err,
            }),
        }
    }

    fn load_blocking(&self) -> Option<StoredCredentials> {
        if let Some(credentials) = self.load_keyring() {
            return Some(credentials);
        }
        self.load_file()
    }

    fn load_keyring(&self) -> Option<StoredCredentials> {
        debug!(tier = Tier::Keyring.as_str(), "loading credentials");
        match self.keyring.load(&self.service, &self.account) {
            Ok(Some(raw)) => {
                let plaintext = SecretBuffer::from(raw);
                let credentials = StoredCredentials::from_secret_json(&plaintext);
                if credentials.is_none() {
                    warn!(
                        tier = Tier::Keyring.as_str(),
                        "stored credentials are unreadable, trying next tier"
                    );
                }
                credentials
            }
            Ok(None) => {
                debug!(tier = Tier::Keyring.as_str(), "no stored credentials");
                None
            }
            Err(err) => {
                warn!(
                    tier = Tier::Keyring.as_str(),
                    error = %err,
                    "keyring read failed, trying next tier"
                );
                None
            }
        }
    }

    fn load_file(&self) -> Option<StoredCredentials> {
        debug!(tier = Tier::EncryptedFile.as_str(), "loading credentials");
        match self.file.load() {
            Ok(Some(plaintext)) => {
                let credentials = StoredCredentials::from_secret_json(&plaintext);
                if credentials.is_none() {
                    warn!(
                        tier = Tier::EncryptedFile.as_str(),
                        "stored credentials are unreadable"
                    );
                }
                credentials
            }
            Ok(None) => {
                debug!(tier = Tier::EncryptedFile.as_str(), "no stored credentials");
                None
            }
            Err(err) => {
                warn!(
                    tier = Tier::EncryptedFile.as_str(),
                    error = %err,
                    "encrypted file read failed"
                );
                None
            }
        }
    }

    fn delete_blocking(&self) {
        if let Err(err) = self.keyring.delete(&self.service, &self.account) {
            debug!(tier = Tier::Keyring.as_str(), error = %err, "ignoring delete failure");
        }
        if let Err(err) = self.file.delete() {
            debug!(tier = Tier::EncryptedFile.as_str(), error = %err, "ignoring delete failure");
        }
    }

    fn exists_blocking(&self) -> bool {
        match self.keyring.load(&self.service, &self.account) {
            Ok(Some(raw)) => {
                drop(SecretBuffer::from(raw));
                true
            }
            Ok(None) | Err(_) => self.file.exists(),
        }
    }
}
