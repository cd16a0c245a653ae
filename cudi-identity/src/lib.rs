//! Identity management for the Cudi peer-to-peer messenger.
//!
//! An identity is an RSA signing key pair whose exported public key doubles
//! as the peer's address. It is kept in a local store between sessions and
//! can be exported to, and restored from, a password-encrypted backup file.

pub mod config;
pub mod crypto;
mod error;
mod manager;
mod session;
pub mod storage;

pub use config::{Config, StoreBackend};
pub use crypto::{EncryptedEnvelope, Identity, IdentityInfo, KeyPair, PeerId};
pub use error::{IdentityError, Result};
pub use manager::IdentityManager;
pub use session::{IdentityEvent, Session};
pub use storage::{IdentityStore, KeyValueStore};
