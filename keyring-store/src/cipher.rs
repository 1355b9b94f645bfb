//! AES-256-GCM sealing of the fallback credential file.
//!
//! The on-disk format is `hex(nonce || ciphertext)`, where the ciphertext
//! carries the GCM tag. The key is derived from stable per-installation
//! identifiers, so it is reproduced on every start without any external key
//! management. This protects against other local users and processes, not
//! against a compromise of this process.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::digest::generic_array::GenericArray;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::secret::SecretBuffer;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("failed to encrypt credentials")]
    Encrypt,

    #[error("failed to decrypt credentials: wrong key or tampered data")]
    Decrypt,

    #[error("encrypted payload is not valid hex: {0}")]
    Encoding(#[from] hex::FromHexError),

    #[error("encrypted payload is too short ({0} bytes)")]
    Truncated(usize),
}

/// Stable identifiers the file key is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySeed {
    pub home: String,
    pub service: String,
    pub account: String,
}

impl KeySeed {
    pub fn new(
        home: impl Into<String>,
        service: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            home: home.into(),
            service: service.into(),
            account: account.into(),
        }
    }

    /// SHA-256 over `home:service:account`.
    pub fn derive_key(&self) -> Zeroizing<[u8; 32]> {
        let mut hasher = Sha256::new();
        hasher.update(self.home.as_bytes());
        hasher.update(b":");
        hasher.update(self.service.as_bytes());
        hasher.update(b":");
        hasher.update(self.account.as_bytes());

        let mut key = Zeroizing::new([0u8; 32]);
        hasher.finalize_into(GenericArray::from_mut_slice(key.as_mut_slice()));
        key
    }
}

/// Encrypts `plaintext` under a fresh random nonce and hex-encodes the result.
pub fn seal(seed: &KeySeed, plaintext: &[u8]) -> Result<String, CipherError> {
    let key = seed.derive_key();
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));

    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CipherError::Encrypt)?;

    let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    Ok(hex::encode(payload))
}

/// Reverses [`seal`]. The returned plaintext is zeroed when dropped.
pub fn open(seed: &KeySeed, encoded: &str) -> Result<SecretBuffer, CipherError> {
    let payload = hex::decode(encoded.trim())?;
    if payload.len() < NONCE_LEN + TAG_LEN {
        return Err(CipherError::Truncated(payload.len()));
    }
    let (nonce, ciphertext) = payload.split_at(NONCE_LEN);

    let key = seed.derive_key();
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::Decrypt)?;
    Ok(SecretBuffer::new(plaintext))
}
