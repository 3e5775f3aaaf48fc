use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;

use crate::crypto::encode_b64;

/// The server's Ed25519 identity.
/// Its base64url public key is the server's id in rumor timestamps.
#[derive(Clone)]
pub struct ServerIdentity {
    signing_key: SigningKey,
}

impl ServerIdentity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Restore identity from secret key bytes
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        Self { signing_key }
    }

    /// Base64url-encoded public key
    pub fn public_key(&self) -> String {
        encode_b64(&self.signing_key.verifying_key().to_bytes())
    }

    /// Sign raw bytes, returning the base64url signature
    pub fn sign(&self, data: &[u8]) -> String {
        encode_b64(&self.signing_key.sign(data).to_bytes())
    }
}

impl std::fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("public_key", &self.public_key())
            .finish()
    }
}
