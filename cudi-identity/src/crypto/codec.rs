//! URL-safe text encoding used for every exported key and envelope field.
//!
//! Output uses the base64url alphabet without padding. Decoding tolerates
//! trailing `=` padding so hand-edited or re-padded files still load.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::error::Result;

const URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode raw bytes as unpadded base64url text.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE.encode(bytes)
}

/// Decode base64url text produced by [`encode`].
pub fn decode(text: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE.decode(text)?)
}
