use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::PopError;

pub fn encode_b64(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes)
}

pub fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>, PopError> {
    URL_SAFE
        .decode(value)
        .map_err(|e| PopError::invalid_message_field(format_args!("{field} is not base64url: {e}")))
}

// SHA-256 over the length-prefixed concatenation of the parts, base64url encoded.
// Each part contributes "<len><part>", so ("ab", "c") and ("a", "bc") differ.
pub fn hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.len().to_string().as_bytes());
        hasher.update(part.as_bytes());
    }
    encode_b64(&hasher.finalize())
}

/// Verify an Ed25519 signature given base64url public key and signature.
///
/// Malformed keys or signatures simply fail verification.
pub fn verify(public_key: &str, data: &[u8], signature: &str) -> bool {
    let Ok(key_bytes) = URL_SAFE.decode(public_key) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = URL_SAFE.decode(signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };

    verifying_key.verify(data, &signature).is_ok()
}
