//! Password-based encryption of identities for backup files.
//!
//! The key is derived with PBKDF2-HMAC-SHA256 from the password and a random
//! 16-byte salt, then used for AES-256-GCM with a random 12-byte nonce. Salt,
//! nonce and iteration count are stored next to the ciphertext.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use tracing::warn;
use zeroize::Zeroizing;

use super::codec;
use super::types::EncryptedEnvelope;
use crate::error::{IdentityError, Result};

pub const DEFAULT_ITERATIONS: u32 = 100_000;
/// Upper bound accepted from backup files, so a hostile file cannot pin the
/// CPU for hours.
pub const MAX_ITERATIONS: u32 = 10_000_000;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// 256-bit key derived from a password. Zeroized when dropped.
pub struct SymmetricKey(Zeroizing<[u8; KEY_LEN]>);

impl SymmetricKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Stretch `password` with PBKDF2-HMAC-SHA256.
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> SymmetricKey {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key[..]);
    SymmetricKey(key)
}

/// Encrypt `payload` under `password` with the default iteration count.
pub fn encrypt<T: Serialize>(payload: &T, password: &str) -> Result<EncryptedEnvelope> {
    encrypt_with_iterations(payload, password, DEFAULT_ITERATIONS)
}

pub fn encrypt_with_iterations<T: Serialize>(
    payload: &T,
    password: &str,
    iterations: u32,
) -> Result<EncryptedEnvelope> {
    if iterations == 0 {
        return Err(IdentityError::Config("iterations must be positive".to_string()));
    }

    let plaintext = Zeroizing::new(
        serde_json::to_vec(payload).map_err(|e| IdentityError::Crypto(e.to_string()))?,
    );

    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt, iterations);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| IdentityError::Crypto("Failed to create cipher".to_string()))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
        .map_err(|_| IdentityError::Crypto("Encryption failed".to_string()))?;

    Ok(EncryptedEnvelope {
        ciphertext: codec::encode(ciphertext),
        salt: codec::encode(salt),
        iv: codec::encode(nonce_bytes),
        iterations,
    })
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// Any fault in the envelope itself (wrong password, flipped bits, damaged
/// salt or nonce) is reported as [`IdentityError::AuthenticationFailure`].
pub fn decrypt<T: DeserializeOwned>(envelope: &EncryptedEnvelope, password: &str) -> Result<T> {
    let plaintext = open(envelope, password)?;
    serde_json::from_slice(&plaintext).map_err(|e| {
        IdentityError::unsupported(format!("decrypted content has an unexpected shape: {e}"))
    })
}

fn open(envelope: &EncryptedEnvelope, password: &str) -> Result<Zeroizing<Vec<u8>>> {
    if envelope.iterations == 0 {
        return Err(IdentityError::AuthenticationFailure);
    }
    let salt = codec::decode(&envelope.salt).map_err(|_| IdentityError::AuthenticationFailure)?;
    let nonce_bytes =
        codec::decode(&envelope.iv).map_err(|_| IdentityError::AuthenticationFailure)?;
    let ciphertext =
        codec::decode(&envelope.ciphertext).map_err(|_| IdentityError::AuthenticationFailure)?;
    if salt.len() != SALT_LEN || nonce_bytes.len() != NONCE_LEN {
        return Err(IdentityError::AuthenticationFailure);
    }

    let key = derive_key(password, &salt, envelope.iterations);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| IdentityError::Crypto("Failed to create cipher".to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| IdentityError::AuthenticationFailure)
}

/// Parse the contents of a backup file into an envelope.
///
/// Only the encrypted JSON format is supported. A file holding a bare
/// exported private key is rejected rather than imported unprotected.
pub fn parse_backup(contents: &str) -> Result<EncryptedEnvelope> {
    let value: serde_json::Value = match serde_json::from_str(contents) {
        Ok(value) => value,
        Err(_) => {
            warn!("Backup is not JSON; unencrypted key files are not supported");
            return Err(IdentityError::unsupported(
                "expected an encrypted JSON backup",
            ));
        }
    };

    let Some(object) = value.as_object() else {
        return Err(IdentityError::unsupported("backup is not a JSON object"));
    };

    for field in ["encryptedData", "salt", "iv"] {
        match object.get(field).and_then(|v| v.as_str()) {
            Some(text) if !text.is_empty() => {}
            _ => {
                return Err(IdentityError::unsupported(format!(
                    "missing or empty field {field:?}"
                )))
            }
        }
    }

    let envelope: EncryptedEnvelope = serde_json::from_value(value)
        .map_err(|e| IdentityError::unsupported(format!("malformed backup: {e}")))?;

    if envelope.iterations == 0 || envelope.iterations > MAX_ITERATIONS {
        return Err(IdentityError::unsupported(format!(
            "iteration count {} outside 1..={MAX_ITERATIONS}",
            envelope.iterations
        )));
    }

    Ok(envelope)
}

/// Render an envelope the way backup files are written.
pub fn to_backup_json(envelope: &EncryptedEnvelope) -> Result<String> {
    serde_json::to_string_pretty(envelope).map_err(|e| IdentityError::Crypto(e.to_string()))
}
