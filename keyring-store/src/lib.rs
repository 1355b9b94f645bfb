//! Persistent storage for OAuth2 credentials.
//!
//! [`SecureTokenStore`] keeps one credential record in the OS keyring and
//! falls back to an AES-256-GCM encrypted file when the keyring is
//! unavailable. Plaintext buffers and derived keys are zeroed when the scope
//! that created them exits.

#![deny(clippy::print_stdout, clippy::print_stderr)]

mod cipher;
mod credentials;
mod error;
mod file_store;
mod os_keyring;
mod secret;
mod store;

pub use cipher::{CipherError, KeySeed};
pub use credentials::{ClientConfig, StoredCredentials, TokenSet, ValidationError, validate_value};
pub use error::{Result, StorageError};
pub use file_store::{
    CONFIG_DIR_NAME, CREDENTIALS_FILE_NAME, EncryptedFileStore, FileStoreError, default_path,
};
pub use os_keyring::{DefaultKeyringStore, KeyringError, KeyringStore, mock};
pub use secret::SecretBuffer;
pub use store::{ACCOUNT_NAME, SERVICE_NAME, SecureTokenStore, Tier};
