use tokio::sync::broadcast;
use tokio::task::spawn_blocking;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::crypto::{vault, EncryptedEnvelope, Identity, IdentityInfo, KeyPair, PeerId};
use crate::error::{IdentityError, Result};
use crate::session::{IdentityEvent, Session};
use crate::storage::IdentityStore;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Drives the identity lifecycle: load at startup, create, export, restore
/// and reset.
///
/// Mutating operations take `&mut self`, so a single manager never runs two
/// of them at once. Key generation and password stretching run on tokio's
/// blocking pool.
pub struct IdentityManager {
    store: IdentityStore,
    session: Option<Session>,
    events: broadcast::Sender<IdentityEvent>,
    kdf_iterations: u32,
}

impl IdentityManager {
    pub fn new(store: IdentityStore, kdf_iterations: u32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            session: None,
            events,
            kdf_iterations: kdf_iterations.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.open_store()?, config.kdf_iterations))
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn peer_id(&self) -> Option<&PeerId> {
        self.session.as_ref().map(Session::peer_id)
    }

    /// Load the stored identity into a session.
    ///
    /// Returns `None` when the user has to go through onboarding: nothing is
    /// stored, or the stored keys no longer import (the record is removed).
    pub async fn init(&mut self) -> Result<Option<IdentityInfo>> {
        let Some(identity) = self.store.load()? else {
            info!("No stored identity");
            return Ok(None);
        };

        let keypair = match spawn_blocking(move || KeyPair::from_identity(&identity)).await? {
            Ok(keypair) => keypair,
            Err(e) => {
                warn!(error = %e, "Stored identity does not import, discarding it");
                self.store.delete()?;
                return Ok(None);
            }
        };

        let session = Session::new(keypair)?;
        let info = session.info(false);
        info!(peer_id = %info.peer_id, "Identity loaded");
        self.activate(
            session,
            IdentityEvent::Loaded {
                peer_id: info.peer_id.clone(),
            },
        );
        Ok(Some(info))
    }

    /// Generate a new identity, persist it and make it current.
    ///
    /// If persisting fails the new identity still becomes current for this
    /// process and [`IdentityError::StorageUnavailable`] is returned.
    pub async fn create(&mut self) -> Result<IdentityInfo> {
        let keypair = spawn_blocking(KeyPair::generate).await??;
        let session = Session::new(keypair)?;
        let identity = session.identity()?;
        let info = session.info(true);

        info!(peer_id = %info.peer_id, "New identity created");
        self.activate(
            session,
            IdentityEvent::Created {
                peer_id: info.peer_id.clone(),
            },
        );
        self.persist(&identity)?;
        Ok(info)
    }

    /// Encrypt the current identity under `password` for a backup file.
    pub async fn export_backup(&self, password: &str) -> Result<EncryptedEnvelope> {
        let session = self.session.as_ref().ok_or(IdentityError::NoIdentity)?;
        if password.is_empty() {
            return Err(IdentityError::EmptyPassword);
        }

        let identity = session.identity()?;
        let password = Zeroizing::new(password.to_string());
        let iterations = self.kdf_iterations;
        let envelope = spawn_blocking(move || {
            vault::encrypt_with_iterations(&identity, &password, iterations)
        })
        .await??;

        info!(peer_id = %session.peer_id(), iterations, "Identity exported");
        Ok(envelope)
    }

    /// Restore an identity from the contents of a backup file.
    ///
    /// On success the restored identity replaces any current one and is
    /// persisted; a persistence failure leaves it current and returns
    /// [`IdentityError::StorageUnavailable`].
    pub async fn restore_backup(&mut self, contents: &str, password: &str) -> Result<IdentityInfo> {
        let envelope = vault::parse_backup(contents)?;
        if password.is_empty() {
            return Err(IdentityError::EmptyPassword);
        }

        let password = Zeroizing::new(password.to_string());
        let keypair = spawn_blocking(move || {
            let identity: Identity = vault::decrypt(&envelope, &password)?;
            KeyPair::from_identity(&identity)
        })
        .await?
        .map_err(|e| {
            warn!(error = %e, "Failed to restore identity from backup");
            e
        })?;

        let session = Session::new(keypair)?;
        let identity = session.identity()?;
        let info = session.info(false);

        info!(peer_id = %info.peer_id, "Identity restored from backup");
        self.activate(
            session,
            IdentityEvent::Restored {
                peer_id: info.peer_id.clone(),
            },
        );
        self.persist(&identity)?;
        Ok(info)
    }

    /// Delete the stored identity and drop the current session.
    pub fn reset(&mut self) -> Result<()> {
        self.store.delete()?;
        if let Some(session) = self.session.take() {
            info!(peer_id = %session.peer_id(), "Identity reset");
        }
        let _ = self.events.send(IdentityEvent::Reset);
        Ok(())
    }

    fn activate(&mut self, session: Session, event: IdentityEvent) {
        self.session = Some(session);
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn persist(&self, identity: &Identity) -> Result<()> {
        self.store.save(identity).map_err(|e| {
            warn!(error = %e, "Identity is active but was not saved");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore, IDENTITY_STORAGE_KEY};

    const TEST_ITERATIONS: u32 = 1_000;

    fn manager_with(backend: MemoryStore) -> IdentityManager {
        IdentityManager::new(IdentityStore::new(backend), TEST_ITERATIONS)
    }

    /// Accepts reads, refuses writes.
    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(IdentityError::StorageUnavailable("quota exceeded".to_string()))
        }

        fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn init_without_identity_requires_onboarding() {
        let mut manager = manager_with(MemoryStore::new());
        assert!(manager.init().await.unwrap().is_none());
        assert!(manager.session().is_none());
    }

    #[tokio::test]
    async fn created_identity_survives_restart() {
        let backend = MemoryStore::new();
        let mut first = manager_with(backend.clone());
        let created = first.create().await.unwrap();
        assert!(created.is_new);
        assert_eq!(created.peer_id.as_str(), &created.public_key[..36]);

        let signature = first.session().unwrap().sign(b"hello").unwrap();

        let mut second = manager_with(backend);
        let loaded = second.init().await.unwrap().unwrap();
        assert!(!loaded.is_new);
        assert_eq!(loaded.peer_id, created.peer_id);
        assert_eq!(loaded.public_key, created.public_key);

        let session = second.session().unwrap();
        assert!(session.verify(b"hello", &signature));
        let resigned = session.sign(b"again").unwrap();
        assert!(first.session().unwrap().verify(b"again", &resigned));
    }

    #[tokio::test]
    async fn export_then_restore_on_another_device() {
        let mut original = manager_with(MemoryStore::new());
        let created = original.create().await.unwrap();
        let envelope = original.export_backup("hunter2").await.unwrap();
        assert_eq!(envelope.iterations, TEST_ITERATIONS);
        let backup = vault::to_backup_json(&envelope).unwrap();

        let device = MemoryStore::new();
        let mut restored = manager_with(device.clone());
        let mut events = restored.subscribe();
        let info = restored.restore_backup(&backup, "hunter2").await.unwrap();

        assert_eq!(info.peer_id, created.peer_id);
        assert!(!info.is_new);
        assert!(device.get(IDENTITY_STORAGE_KEY).unwrap().is_some());
        assert_eq!(
            events.recv().await.unwrap(),
            IdentityEvent::Restored {
                peer_id: created.peer_id.clone()
            }
        );

        let signature = restored.session().unwrap().sign(b"m").unwrap();
        assert!(original.session().unwrap().verify(b"m", &signature));
    }

    #[tokio::test]
    async fn restore_with_wrong_password_keeps_state() {
        let mut original = manager_with(MemoryStore::new());
        original.create().await.unwrap();
        let backup = vault::to_backup_json(&original.export_backup("correct").await.unwrap()).unwrap();

        let device = MemoryStore::new();
        let mut other = manager_with(device.clone());
        let result = other.restore_backup(&backup, "wrong").await;

        assert!(matches!(result, Err(IdentityError::AuthenticationFailure)));
        assert!(other.session().is_none());
        assert!(device.get(IDENTITY_STORAGE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_rejects_unsupported_files() {
        let mut manager = manager_with(MemoryStore::new());

        let result = manager
            .restore_backup(r#"{"publicKey":"abc","privateKey":"def"}"#, "pw")
            .await;
        assert!(matches!(result, Err(IdentityError::UnsupportedBackupFormat { .. })));

        let result = manager.restore_backup("eyJuIjoi", "pw").await;
        assert!(matches!(result, Err(IdentityError::UnsupportedBackupFormat { .. })));
    }

    #[tokio::test]
    async fn restore_rejects_backup_without_valid_keys() {
        let fake = Identity {
            public_key: "abc".to_string(),
            private_key: "def".to_string(),
        };
        let envelope = vault::encrypt_with_iterations(&fake, "pw", TEST_ITERATIONS).unwrap();
        let backup = vault::to_backup_json(&envelope).unwrap();

        let mut manager = manager_with(MemoryStore::new());
        let result = manager.restore_backup(&backup, "pw").await;
        assert!(matches!(result, Err(IdentityError::InvalidKeyFormat { .. })));
    }

    #[tokio::test]
    async fn export_requires_identity_and_password() {
        let mut manager = manager_with(MemoryStore::new());
        assert!(matches!(
            manager.export_backup("pw").await,
            Err(IdentityError::NoIdentity)
        ));

        manager.create().await.unwrap();
        assert!(matches!(
            manager.export_backup("").await,
            Err(IdentityError::EmptyPassword)
        ));
    }

    #[tokio::test]
    async fn reset_forgets_identity() {
        let backend = MemoryStore::new();
        let mut manager = manager_with(backend.clone());
        manager.create().await.unwrap();
        let mut events = manager.subscribe();

        manager.reset().unwrap();
        assert!(manager.session().is_none());
        assert!(backend.get(IDENTITY_STORAGE_KEY).unwrap().is_none());
        assert_eq!(events.recv().await.unwrap(), IdentityEvent::Reset);

        let mut restarted = manager_with(backend);
        assert!(restarted.init().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_identity_that_does_not_import_is_discarded() {
        let backend = MemoryStore::new();
        backend
            .set(
                IDENTITY_STORAGE_KEY,
                r#"{"publicKey":"abc","privateKey":"def"}"#,
            )
            .unwrap();

        let mut manager = manager_with(backend.clone());
        assert!(manager.init().await.unwrap().is_none());
        assert!(backend.get(IDENTITY_STORAGE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn storage_failure_keeps_identity_in_memory() {
        let mut manager = IdentityManager::new(IdentityStore::new(ReadOnlyStore), TEST_ITERATIONS);
        let mut events = manager.subscribe();

        let result = manager.create().await;
        assert!(matches!(result, Err(IdentityError::StorageUnavailable(_))));

        let session = manager.session().expect("identity stays live");
        assert!(matches!(events.recv().await.unwrap(), IdentityEvent::Created { .. }));
        assert!(manager.export_backup("pw").await.is_ok());
        assert_eq!(manager.peer_id(), Some(session.peer_id()));
    }
}
