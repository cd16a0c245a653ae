//! Signing key pair: generation, export/import and the derived peer id.
//!
//! Keys are RSA 2048-bit with public exponent 65537, used with
//! RSASSA-PKCS1-v1_5 over SHA-256 ("RS256"). Exported keys are JSON Web Keys,
//! serialized to JSON and codec-encoded, so the text alone is enough to import
//! them again.

use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

use super::codec;
use super::types::{Identity, KeyPair, PeerId};
use crate::error::{IdentityError, Result};

pub const MODULUS_BITS: usize = 2048;
const KEY_TYPE: &str = "RSA";
const ALGORITHM: &str = "RS256";
const OP_SIGN: &str = "sign";
const OP_VERIFY: &str = "verify";

/// Verification half of an identity.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

/// Signing half of an identity. Key material is zeroized on drop.
pub struct PrivateKey(RsaPrivateKey);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &(self.0.size() * 8))
            .finish()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// JSON Web Key for an RSA key. `n` comes first so the start of the exported
/// text (and therefore the peer id) is drawn from the modulus.
#[derive(Serialize, Deserialize)]
struct Jwk {
    n: String,
    e: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qi: Option<String>,
    kty: String,
    alg: String,
    #[serde(default)]
    key_ops: Vec<String>,
    #[serde(default)]
    ext: bool,
}

impl Jwk {
    fn public(key: &RsaPublicKey) -> Self {
        Self {
            n: encode_uint(key.n()),
            e: encode_uint(key.e()),
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
            kty: KEY_TYPE.to_string(),
            alg: ALGORITHM.to_string(),
            key_ops: vec![OP_VERIFY.to_string()],
            ext: true,
        }
    }

    fn private(key: &RsaPrivateKey) -> Result<Self> {
        let [p, q] = key.primes() else {
            return Err(IdentityError::Crypto(format!(
                "expected a two-prime key, found {} primes",
                key.primes().len()
            )));
        };

        Ok(Self {
            n: encode_uint(key.n()),
            e: encode_uint(key.e()),
            d: Some(encode_uint(key.d())),
            p: Some(encode_uint(p)),
            q: Some(encode_uint(q)),
            dp: key.dp().map(encode_uint),
            dq: key.dq().map(encode_uint),
            qi: key.qinv().map(|qi| codec::encode(qi.to_bytes_be().1)),
            kty: KEY_TYPE.to_string(),
            alg: ALGORITHM.to_string(),
            key_ops: vec![OP_SIGN.to_string()],
            ext: true,
        })
    }

    fn to_text(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| IdentityError::Crypto(e.to_string()))?;
        Ok(codec::encode(json))
    }

    fn from_text(text: &str, expected_op: &str) -> Result<Self> {
        let bytes = codec::decode(text.trim())
            .map_err(|_| IdentityError::invalid_key("key text is not base64url"))?;
        let jwk: Jwk = serde_json::from_slice(&bytes)
            .map_err(|e| IdentityError::invalid_key(format!("not a JSON Web Key: {e}")))?;

        if jwk.kty != KEY_TYPE {
            return Err(IdentityError::invalid_key(format!(
                "unsupported key type {:?}",
                jwk.kty
            )));
        }
        if jwk.alg != ALGORITHM {
            return Err(IdentityError::invalid_key(format!(
                "unsupported algorithm {:?}",
                jwk.alg
            )));
        }
        if !jwk.key_ops.is_empty() && !jwk.key_ops.iter().any(|op| op == expected_op) {
            return Err(IdentityError::invalid_key(format!(
                "key is not usable for {expected_op}"
            )));
        }

        Ok(jwk)
    }
}

fn encode_uint(value: &BigUint) -> String {
    codec::encode(value.to_bytes_be())
}

fn decode_uint(value: &str, name: &str) -> Result<BigUint> {
    let bytes = codec::decode(value)
        .map_err(|_| IdentityError::invalid_key(format!("parameter {name} is not base64url")))?;
    if bytes.is_empty() {
        return Err(IdentityError::invalid_key(format!("parameter {name} is empty")));
    }
    Ok(BigUint::from_bytes_be(&bytes))
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| IdentityError::invalid_key(format!("missing private parameter {name}")))
}

fn check_modulus(key: &impl PublicKeyParts) -> Result<()> {
    if key.size() * 8 < MODULUS_BITS {
        return Err(IdentityError::invalid_key(format!(
            "modulus shorter than {MODULUS_BITS} bits"
        )));
    }
    Ok(())
}

/// Generate a fresh key pair from the operating system's random source.
///
/// This is CPU-bound and can take a noticeable fraction of a second; async
/// callers should run it on a blocking thread.
pub fn generate_keypair() -> Result<KeyPair> {
    let private_key = RsaPrivateKey::new(&mut OsRng, MODULUS_BITS)
        .map_err(|e| IdentityError::Crypto(format!("key generation failed: {e}")))?;
    let public_key = private_key.to_public_key();

    Ok(KeyPair {
        public_key: PublicKey(public_key),
        private_key: PrivateKey(private_key),
    })
}

pub fn export_public_key(key: &PublicKey) -> Result<String> {
    Jwk::public(&key.0).to_text()
}

pub fn export_private_key(key: &PrivateKey) -> Result<String> {
    Jwk::private(&key.0)?.to_text()
}

pub fn import_public_key(text: &str) -> Result<PublicKey> {
    let jwk = Jwk::from_text(text, OP_VERIFY)?;
    if jwk.d.is_some() {
        return Err(IdentityError::invalid_key("expected a public key, found a private key"));
    }

    let n = decode_uint(&jwk.n, "n")?;
    let e = decode_uint(&jwk.e, "e")?;
    let key = RsaPublicKey::new(n, e).map_err(|e| IdentityError::invalid_key(e.to_string()))?;
    check_modulus(&key)?;

    Ok(PublicKey(key))
}

pub fn import_private_key(text: &str) -> Result<PrivateKey> {
    let jwk = Jwk::from_text(text, OP_SIGN)?;

    let n = decode_uint(&jwk.n, "n")?;
    let e = decode_uint(&jwk.e, "e")?;
    let d = decode_uint(required(&jwk.d, "d")?, "d")?;
    let p = decode_uint(required(&jwk.p, "p")?, "p")?;
    let q = decode_uint(required(&jwk.q, "q")?, "q")?;

    let key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
        .map_err(|e| IdentityError::invalid_key(e.to_string()))?;
    key.validate()
        .map_err(|e| IdentityError::invalid_key(e.to_string()))?;
    check_modulus(&key)?;

    Ok(PrivateKey(key))
}

/// The public address of an identity: the first 36 characters of its
/// exported public key.
pub fn derive_peer_identifier(exported_public_key: &str) -> PeerId {
    PeerId::derive(exported_public_key)
}

impl PublicKey {
    /// Check an RS256 signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::try_from(signature) else {
            return false;
        };
        VerifyingKey::<Sha256>::new(self.0.clone())
            .verify(message, &signature)
            .is_ok()
    }
}

impl PrivateKey {
    /// Produce an RS256 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signing_key = SigningKey::<Sha256>::new(self.0.clone());
        let signature = signing_key
            .try_sign(message)
            .map_err(|e| IdentityError::Crypto(format!("signing failed: {e}")))?;
        Ok(signature.to_vec())
    }

    fn matches(&self, public_key: &PublicKey) -> bool {
        self.0.n() == public_key.0.n() && self.0.e() == public_key.0.e()
    }
}

impl KeyPair {
    pub fn generate() -> Result<Self> {
        generate_keypair()
    }

    /// Import both halves of an exported identity.
    ///
    /// Fails if either half is malformed or if they belong to different keys.
    pub fn from_identity(identity: &Identity) -> Result<Self> {
        let public_key = import_public_key(&identity.public_key)?;
        let private_key = import_private_key(&identity.private_key)?;
        if !private_key.matches(&public_key) {
            return Err(IdentityError::invalid_key(
                "public and private keys belong to different key pairs",
            ));
        }

        Ok(Self {
            public_key,
            private_key,
        })
    }

    pub fn to_identity(&self) -> Result<Identity> {
        Ok(Identity {
            public_key: export_public_key(&self.public_key)?,
            private_key: export_private_key(&self.private_key)?,
        })
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.private_key.sign(message)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        self.public_key.verify(message, signature)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key)
            .finish()
    }
}
