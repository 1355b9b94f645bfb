use gws_api_errors::ErrorKind;

use crate::credentials::ValidationError;
use crate::file_store::FileStoreError;
use crate::os_keyring::KeyringError;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Write-path failures of the token store. The read path never errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid credentials: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to serialize credentials: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to store credentials in any tier (keyring: {keyring}; file: {file})")]
    AllTiersFailed {
        keyring: KeyringError,
        file: FileStoreError,
    },

    #[error("encrypted file tier is unavailable: {0}")]
    FileTierUnavailable(#[source] FileStoreError),

    #[error("credential storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Validation(_) => ErrorKind::Validation,
            _ => ErrorKind::Storage,
        }
    }
}
