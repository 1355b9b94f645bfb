//! Tier 1: the OS-native credential store.

use std::fmt::Debug;

use keyring::Entry;
use tracing::trace;

/// Failure reported by a keyring backend.
#[derive(Debug, thiserror::Error)]
#[error("keyring error: {0}")]
pub struct KeyringError(#[from] keyring::Error);

impl KeyringError {
    pub fn message(&self) -> String {
        self.0.to_string()
    }

    pub fn into_error(self) -> keyring::Error {
        self.0
    }
}

/// Secret storage addressed by `(service, account)`.
pub trait KeyringStore: Debug + Send + Sync {
    /// `Ok(None)` when no entry exists.
    fn load(&self, service: &str, account: &str) -> Result<Option<String>, KeyringError>;

    fn save(&self, service: &str, account: &str, value: &str) -> Result<(), KeyringError>;

    /// `Ok(false)` when there was nothing to delete.
    fn delete(&self, service: &str, account: &str) -> Result<bool, KeyringError>;
}

/// Backed by the platform keyring (Secret Service, macOS Keychain).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultKeyringStore;

impl KeyringStore for DefaultKeyringStore {
    fn load(&self, service: &str, account: &str) -> Result<Option<String>, KeyringError> {
        trace!("keyring.load start, service={service}, account={account}");
        let entry = Entry::new(service, account)?;
        match entry.get_password() {
            Ok(password) => {
                trace!("keyring.load success, service={service}, account={account}");
                Ok(Some(password))
            }
            Err(keyring::Error::NoEntry) => {
                trace!("keyring.load no entry, service={service}, account={account}");
                Ok(None)
            }
            Err(error) => {
                trace!("keyring.load error, service={service}, account={account}, error={error}");
                Err(error.into())
            }
        }
    }

    fn save(&self, service: &str, account: &str, value: &str) -> Result<(), KeyringError> {
        trace!(
            "keyring.save start, service={service}, account={account}, value_len={}",
            value.len()
        );
        let entry = Entry::new(service, account)?;
        match entry.set_password(value) {
            Ok(()) => {
                trace!("keyring.save success, service={service}, account={account}");
                Ok(())
            }
            Err(error) => {
                trace!("keyring.save error, service={service}, account={account}, error={error}");
                Err(error.into())
            }
        }
    }

    fn delete(&self, service: &str, account: &str) -> Result<bool, KeyringError> {
        trace!("keyring.delete start, service={service}, account={account}");
        let entry = Entry::new(service, account)?;
        match entry.delete_credential() {
            Ok(()) => {
                trace!("keyring.delete success, service={service}, account={account}");
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => {
                trace!("keyring.delete no entry, service={service}, account={account}");
                Ok(false)
            }
            Err(error) => {
                trace!("keyring.delete error, service={service}, account={account}, error={error}");
                Err(error.into())
            }
        }
    }
}

pub mod mock {
    //! In-memory keyring for tests, with injectable failures.

    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::PoisonError;

    use super::KeyringError;
    use super::KeyringStore;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockFailure {
        /// Every operation fails as if the keyring were locked.
        Unavailable,
        /// Loads fail; saves and deletes work.
        LoadOnly,
    }

    #[derive(Default, Clone, Debug)]
    pub struct MockKeyringStore {
        entries: Arc<Mutex<HashMap<(String, String), String>>>,
        failure: Arc<Mutex<Option<MockFailure>>>,
    }

    impl MockKeyringStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// A keyring that rejects every operation.
        pub fn unavailable() -> Self {
            let store = Self::default();
            store.set_failure(Some(MockFailure::Unavailable));
            store
        }

        pub fn set_failure(&self, failure: Option<MockFailure>) {
            *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = failure;
        }

        /// Raw stored value, bypassing failure injection.
        pub fn saved_value(&self, service: &str, account: &str) -> Option<String> {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&(service.to_string(), account.to_string()))
                .cloned()
        }

        /// Stores a raw value, bypassing failure injection.
        pub fn insert_raw(&self, service: &str, account: &str, value: impl Into<String>) {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((service.to_string(), account.to_string()), value.into());
        }

        fn check(&self, loading: bool) -> Result<(), KeyringError> {
            let failure = *self.failure.lock().unwrap_or_else(PoisonError::into_inner);
            match failure {
                Some(MockFailure::Unavailable) => Err(locked()),
                Some(MockFailure::LoadOnly) if loading => Err(locked()),
                _ => Ok(()),
            }
        }
    }

    fn locked() -> KeyringError {
        KeyringError::from(keyring::Error::NoStorageAccess(Box::new(
            std::io::Error::other("mock keyring is locked"),
        )))
    }

    impl KeyringStore for MockKeyringStore {
        fn load(&self, service: &str, account: &str) -> Result<Option<String>, KeyringError> {
            self.check(true)?;
            Ok(self.saved_value(service, account))
        }

        fn save(&self, service: &str, account: &str, value: &str) -> Result<(), KeyringError> {
            self.check(false)?;
            self.insert_raw(service, account, value);
            Ok(())
        }

        fn delete(&self, service: &str, account: &str) -> Result<bool, KeyringError> {
            self.check(false)?;
            let removed = self
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&(service.to_string(), account.to_string()));
            Ok(removed.is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockFailure, MockKeyringStore};
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mock_round_trip() {
        let store = MockKeyringStore::new();
        assert_eq!(store.load("svc", "acct").unwrap(), None);

        store.save("svc", "acct", "value").unwrap();
        assert_eq!(store.load("svc", "acct").unwrap(), Some("value".to_string()));

        assert!(store.delete("svc", "acct").unwrap());
        assert!(!store.delete("svc", "acct").unwrap());
    }

    #[test]
    fn mock_failure_injection() {
        let store = MockKeyringStore::unavailable();
        let err = store.save("svc", "acct", "value").unwrap_err();
        assert!(err.message().contains("mock keyring is locked"));
        assert_eq!(store.saved_value("svc", "acct"), None);

        store.set_failure(Some(MockFailure::LoadOnly));
        store.save("svc", "acct", "value").unwrap();
        assert!(store.load("svc", "acct").is_err());
    }
}
