use keyring::credential::{CredentialBuilderApi, CredentialPersistence};
use keyring::Entry;
use tracing::warn;

use super::KeyValueStore;
use crate::error::{IdentityError, Result};

pub const KEYRING_SERVICE: &str = "cudi-messenger";

/// Store entries in the OS keyring (Windows Credential Manager, macOS
/// Keychain, Linux kernel keyring), one credential per key.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Open the keyring under `service`.
    ///
    /// Fails with [`IdentityError::StorageUnavailable`] when the platform has
    /// no credential store that outlives the process.
    pub fn open(service: impl Into<String>) -> Result<Self> {
        check_persistence(keyring::default::default_credential_builder().persistence())?;
        Ok(Self {
            service: service.into(),
        })
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key)
            .map_err(|e| IdentityError::storage(format!("Failed to access keyring: {}", e)))
    }
}

fn check_persistence(persistence: CredentialPersistence) -> Result<()> {
    match persistence {
        CredentialPersistence::EntryOnly | CredentialPersistence::ProcessOnly => Err(
            IdentityError::storage("no persistent OS keyring is available on this platform"),
        ),
        CredentialPersistence::UntilReboot => {
            warn!("OS keyring only keeps entries until reboot; export a backup");
            Ok(())
        }
        _ => Ok(()),
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(IdentityError::storage(format!(
                "Failed to read from keyring: {}",
                e
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| IdentityError::storage(format!("Failed to write to keyring: {}", e)))
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
            Err(e) => Err(IdentityError::storage(format!(
                "Failed to delete from keyring: {}",
                e
            ))),
        }
    }
}
