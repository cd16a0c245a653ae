use serde::Serialize;

use crate::crypto::{export_public_key, Identity, IdentityInfo, KeyPair, PeerId};
use crate::error::Result;

/// The identity in use by the running process.
///
/// Owned by [`crate::IdentityManager`] and lent to transport or UI code that
/// needs to address or sign as this peer.
#[derive(Debug)]
pub struct Session {
    keypair: KeyPair,
    public_key: String,
    peer_id: PeerId,
}

impl Session {
    pub fn new(keypair: KeyPair) -> Result<Self> {
        let public_key = export_public_key(&keypair.public_key)?;
        let peer_id = PeerId::derive(&public_key);
        Ok(Self {
            keypair,
            public_key,
            peer_id,
        })
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Exported public key text, safe to share with peers.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.keypair.sign(message)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        self.keypair.verify(message, signature)
    }

    pub fn identity(&self) -> Result<Identity> {
        self.keypair.to_identity()
    }

    pub fn info(&self, is_new: bool) -> IdentityInfo {
        IdentityInfo {
            peer_id: self.peer_id.clone(),
            public_key: self.public_key.clone(),
            is_new,
        }
    }
}

/// Identity lifecycle notifications for transport and UI consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityEvent {
    /// A stored identity was loaded at startup.
    Loaded { peer_id: PeerId },
    Created { peer_id: PeerId },
    Restored { peer_id: PeerId },
    /// The identity and its stored copy were deleted.
    Reset,
}
