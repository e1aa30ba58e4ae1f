//! X25519 identity keypair with base64 text encoding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use hitl_types::errors::ProxyError;

/// The agent's identity keypair.
///
/// Invariant: the public key is always the one derived from the secret.
/// [`AgentKeypair::from_encoded`] enforces this when loading persisted keys.
#[derive(Clone)]
pub struct AgentKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl std::fmt::Debug for AgentKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret.
        f.debug_struct("AgentKeypair")
            .field("public", &self.public_key_b64())
            .finish_non_exhaustive()
    }
}

impl AgentKeypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Reconstruct a keypair from its base64-encoded halves.
    ///
    /// Validates encoding, key length, and that the stored public key
    /// matches the one derived from the secret.
    pub fn from_encoded(public_b64: &str, private_b64: &str) -> Result<Self, ProxyError> {
        let mut secret_bytes = decode_key_bytes(private_b64)?;
        let secret = StaticSecret::from(secret_bytes);
        secret_bytes.zeroize();

        let stored_public = PublicKey::from(decode_key_bytes(public_b64)?);
        let derived_public = PublicKey::from(&secret);
        if stored_public != derived_public {
            return Err(ProxyError::KeypairCorrupt(
                "stored public key does not match the private key".to_string(),
            ));
        }

        Ok(Self {
            secret,
            public: derived_public,
        })
    }

    /// Base64-encoded public key.
    pub fn public_key_b64(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }

    /// Base64-encoded private key. Only the keystore should call this.
    pub fn private_key_b64(&self) -> String {
        BASE64.encode(self.secret.to_bytes())
    }

    /// The raw public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// X25519 shared secret with a counterpart public key.
    pub(crate) fn shared_secret(&self, counterpart: &PublicKey) -> x25519_dalek::SharedSecret {
        self.secret.diffie_hellman(counterpart)
    }
}

/// Decode a base64-encoded 32-byte public key, e.g. a device key fetched
/// from the directory.
pub fn decode_public_key(encoded: &str) -> Result<PublicKey, ProxyError> {
    Ok(PublicKey::from(decode_key_bytes(encoded)?))
}

fn decode_key_bytes(encoded: &str) -> Result<[u8; 32], ProxyError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| ProxyError::KeypairCorrupt(format!("invalid base64 key encoding: {e}")))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        ProxyError::KeypairCorrupt(format!("key must be 32 bytes, got {len}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_distinct_keys() {
        let a = AgentKeypair::generate();
        let b = AgentKeypair::generate();
        assert_ne!(a.public_key_b64(), b.public_key_b64());
        assert_ne!(a.private_key_b64(), b.private_key_b64());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let original = AgentKeypair::generate();
        let restored =
            AgentKeypair::from_encoded(&original.public_key_b64(), &original.private_key_b64())
                .unwrap();
        assert_eq!(original.public_key_b64(), restored.public_key_b64());
        assert_eq!(original.private_key_b64(), restored.private_key_b64());
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let a = AgentKeypair::generate();
        let b = AgentKeypair::generate();
        let err =
            AgentKeypair::from_encoded(&b.public_key_b64(), &a.private_key_b64()).unwrap_err();
        assert!(matches!(err, ProxyError::KeypairCorrupt(_)));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let err = decode_public_key("not base64!!!").unwrap_err();
        assert!(matches!(err, ProxyError::KeypairCorrupt(_)));
    }

    #[test]
    fn wrong_length_is_rejected() {
        let short = BASE64.encode([0u8; 16]);
        let err = decode_public_key(&short).unwrap_err();
        assert!(matches!(err, ProxyError::KeypairCorrupt(_)));
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn debug_does_not_leak_private_key() {
        let keypair = AgentKeypair::generate();
        let rendered = format!("{keypair:?}");
        assert!(!rendered.contains(&keypair.private_key_b64()));
    }
}
