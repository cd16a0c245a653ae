pub mod codec;
mod keys;
mod types;
pub mod vault;

pub use keys::{
    derive_peer_identifier, export_private_key, export_public_key, generate_keypair,
    import_private_key, import_public_key, PrivateKey, PublicKey, MODULUS_BITS,
};
pub use types::{EncryptedEnvelope, Identity, IdentityInfo, KeyPair, PeerId, PEER_ID_LEN};
