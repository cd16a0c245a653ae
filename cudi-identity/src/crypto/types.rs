use serde::{Deserialize, Serialize};
use std::fmt;

use super::keys::{PrivateKey, PublicKey};

/// Length of the peer identifier, in characters of exported public key text.
pub const PEER_ID_LEN: usize = 36;

/// Exported identity: the unit of local persistence and of encrypted backups.
///
/// Serializes as `{ "publicKey": ..., "privateKey": ... }`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Password-locked identity as written to a backup file.
///
/// Every byte field holds codec-encoded text; `iterations` travels with the
/// ciphertext so decryption needs nothing but the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(rename = "encryptedData")]
    pub ciphertext: String,
    pub salt: String,
    pub iv: String,
    pub iterations: u32,
}

/// Live signing key pair, owned by the running session.
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

/// Public address of an identity: a fixed-length prefix of the exported
/// public key.
///
/// Truncation is not a cryptographic commitment; two keys sharing the first
/// 36 characters of their export would collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn derive(exported_public_key: &str) -> Self {
        Self(exported_public_key.chars().take(PEER_ID_LEN).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of loading, creating or restoring an identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityInfo {
    pub peer_id: PeerId,
    pub public_key: String,
    pub is_new: bool,
}
