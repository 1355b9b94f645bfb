//! Tier 2: an AES-256-GCM encrypted file under the per-user config directory.

use std::fs;
#[cfg(unix)]
use std::fs::Permissions;
use std::io::ErrorKind;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cipher::{self, CipherError, KeySeed};
use crate::secret::SecretBuffer;

/// Directory name under the per-user config directory.
pub const CONFIG_DIR_NAME: &str = "google-workspace-mcp";

/// File name of the encrypted credential record.
pub const CREDENTIALS_FILE_NAME: &str = "credentials.enc";

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("no per-user config directory is available")]
    NoConfigDir,

    #[error("no home directory is available to derive the file key")]
    NoHomeDir,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

impl FileStoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        FileStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Encrypted credential file, written atomically with owner-only permissions.
#[derive(Debug, Clone)]
pub struct EncryptedFileStore {
    path: PathBuf,
    seed: KeySeed,
}

impl EncryptedFileStore {
    pub fn new(path: impl Into<PathBuf>, seed: KeySeed) -> Self {
        Self {
            path: path.into(),
            seed,
        }
    }

    /// `<config_dir>/google-workspace-mcp/credentials.enc`, keyed from the
    /// home directory and the given service/account labels.
    pub fn with_defaults(service: &str, account: &str) -> Result<Self, FileStoreError> {
        let path = default_path().ok_or(FileStoreError::NoConfigDir)?;
        let home = dirs::home_dir().ok_or(FileStoreError::NoHomeDir)?;
        Ok(Self::new(
            path,
            KeySeed::new(home.to_string_lossy(), service, account),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encrypts and writes `plaintext`, replacing any previous record.
    ///
    /// The ciphertext goes to a temporary file in the target directory which
    /// is then renamed over the target, so readers never observe a partial
    /// write.
    pub fn save(&self, plaintext: &[u8]) -> Result<(), FileStoreError> {
        let sealed = cipher::seal(&self.seed, plaintext)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|err| FileStoreError::io(parent, err))?;

        let mut builder = tempfile::Builder::new();
        builder.prefix(".credentials").suffix(".tmp");
        #[cfg(unix)]
        builder.permissions(Permissions::from_mode(0o600));

        let mut temp = builder
            .tempfile_in(parent)
            .map_err(|err| FileStoreError::io(parent, err))?;
        temp.write_all(sealed.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|err| FileStoreError::io(temp.path(), err))?;
        temp.persist(&self.path)
            .map_err(|err| FileStoreError::io(&self.path, err.error))?;

        debug!(path = %self.path.display(), "wrote encrypted credential file");
        Ok(())
    }

    /// Reads and decrypts the record. `Ok(None)` when the file is absent.
    pub fn load(&self) -> Result<Option<SecretBuffer>, FileStoreError> {
        let encoded = match fs::read_to_string(&self.path) {
            Ok(encoded) => encoded,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(FileStoreError::io(&self.path, err)),
        };
        Ok(Some(cipher::open(&self.seed, &encoded)?))
    }

    /// Removes the file. `Ok(false)` when it did not exist.
    pub fn delete(&self) -> Result<bool, FileStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(FileStoreError::io(&self.path, err)),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// `<config_dir>/google-workspace-mcp/credentials.enc`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CREDENTIALS_FILE_NAME))
}
