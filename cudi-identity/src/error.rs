//! Error types for the identity lifecycle.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

/// Everything that can go wrong while creating, persisting, exporting or
/// restoring an identity.
///
/// All variants are recoverable by the user (re-enter a password, pick another
/// file, retry later); none of them should bring the process down.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("malformed encoded text: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("invalid key format: {reason}")]
    InvalidKeyFormat { reason: String },

    /// Wrong password and tampered ciphertext are deliberately not told apart.
    #[error("wrong password or corrupted backup")]
    AuthenticationFailure,

    #[error("unsupported backup format: {reason}")]
    UnsupportedBackupFormat { reason: String },

    #[error("identity storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("no identity loaded; create or restore one first")]
    NoIdentity,

    #[error("password must not be empty")]
    EmptyPassword,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IdentityError {
    pub(crate) fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKeyFormat {
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedBackupFormat {
            reason: reason.into(),
        }
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}
