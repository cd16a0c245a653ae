//! Local persistence of the plaintext exported identity.
//!
//! The identity lives under a single well-known key of a [`KeyValueStore`].
//! It is not password-protected at rest; only backups are.

mod os_keyring;
mod memory;
mod sqlite;

pub use os_keyring::{KeyringStore, KEYRING_SERVICE};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use tracing::{debug, warn};

use crate::crypto::Identity;
use crate::error::{IdentityError, Result};

pub const IDENTITY_STORAGE_KEY: &str = "cudi_messenger_identity";

/// Minimal get/set/delete persistence primitive.
///
/// Backend failures are reported as [`IdentityError::StorageUnavailable`].
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Persists the exported [`Identity`] between sessions.
pub struct IdentityStore {
    backend: Box<dyn KeyValueStore>,
}

impl IdentityStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn save(&self, identity: &Identity) -> Result<()> {
        let record = serde_json::to_string(identity)
            .map_err(|e| IdentityError::storage(format!("Failed to serialize identity: {e}")))?;
        self.backend.set(IDENTITY_STORAGE_KEY, &record)?;
        debug!("Identity saved");
        Ok(())
    }

    /// Load the stored identity.
    ///
    /// Returns `None` when nothing is stored or the record cannot be parsed;
    /// an unparsable record is removed so a later save is not blocked.
    pub fn load(&self) -> Result<Option<Identity>> {
        let Some(record) = self.backend.get(IDENTITY_STORAGE_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str::<Identity>(&record) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                warn!(error = %e, "Discarding unparsable stored identity");
                if let Err(e) = self.backend.delete(IDENTITY_STORAGE_KEY) {
                    warn!(error = %e, "Failed to remove unparsable stored identity");
                }
                Ok(None)
            }
        }
    }

    pub fn delete(&self) -> Result<()> {
        self.backend.delete(IDENTITY_STORAGE_KEY)?;
        debug!("Stored identity deleted");
        Ok(())
    }
}
