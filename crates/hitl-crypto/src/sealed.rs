//! Sealed-box codec for tool arguments and human responses.
//!
//! Wire format: base64(nonce ‖ ciphertext) where the ciphertext is
//! XChaCha20-Poly1305 over the JSON-serialized payload, keyed by
//! HKDF-SHA256 of the X25519 static-static shared secret between the local
//! private key and the counterpart public key.
//!
//! Because the shared secret is symmetric, the device holding the
//! counterpart private key derives the identical AEAD key from the agent's
//! public key: this is a mutual-authentication sealed channel, not an
//! anonymous sealed box. Whoever lacks either private key cannot open the
//! payload, and the relay in the middle never can.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::PublicKey;
use zeroize::Zeroize;

use hitl_types::errors::ProxyError;

use crate::keypair::{decode_public_key, AgentKeypair};

/// Domain-separation context for the derived AEAD key.
const KDF_CONTEXT: &[u8] = b"hitl-e2ee-v1";
/// XChaCha20-Poly1305 nonce length.
const NONCE_LEN: usize = 24;

/// Seals payloads for one counterpart key and opens payloads sealed by it.
#[derive(Clone)]
pub struct SealedBox {
    keypair: AgentKeypair,
}

impl SealedBox {
    /// A codec bound to the local identity keypair.
    pub fn new(keypair: AgentKeypair) -> Self {
        Self { keypair }
    }

    /// The local identity's public key, base64-encoded.
    pub fn local_public_key_b64(&self) -> String {
        self.keypair.public_key_b64()
    }

    /// Seal a structured payload for the recipient.
    ///
    /// Rejects an absent recipient key before touching any cryptography.
    pub fn seal(
        &self,
        payload: &serde_json::Value,
        recipient_public_key_b64: &str,
    ) -> Result<String, ProxyError> {
        if recipient_public_key_b64.trim().is_empty() {
            return Err(ProxyError::NoRecipientKey);
        }
        let recipient = decode_public_key(recipient_public_key_b64)
            .map_err(|e| ProxyError::Encryption(e.to_string()))?;

        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| ProxyError::Encryption(format!("payload serialization: {e}")))?;

        let cipher = self.cipher_for(&recipient)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| ProxyError::Encryption("AEAD seal failed".to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Open a sealed payload produced by the counterpart.
    ///
    /// Returns the deserialized JSON value, or a plain string value when the
    /// plaintext is not JSON. Malformed encoding, tampered ciphertext, and
    /// wrong-key mismatches all collapse into [`ProxyError::Decryption`];
    /// unauthenticated bytes are never returned.
    pub fn open(
        &self,
        sealed_b64: &str,
        counterpart_public_key_b64: &str,
    ) -> Result<serde_json::Value, ProxyError> {
        if counterpart_public_key_b64.trim().is_empty() {
            return Err(ProxyError::NoRecipientKey);
        }
        let counterpart =
            decode_public_key(counterpart_public_key_b64).map_err(|_| ProxyError::Decryption)?;

        let combined = BASE64
            .decode(sealed_b64.trim())
            .map_err(|_| ProxyError::Decryption)?;
        if combined.len() <= NONCE_LEN {
            return Err(ProxyError::Decryption);
        }
        let nonce = XNonce::from_slice(&combined[..NONCE_LEN]);
        let ciphertext = &combined[NONCE_LEN..];

        let cipher = self
            .cipher_for(&counterpart)
            .map_err(|_| ProxyError::Decryption)?;
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| ProxyError::Decryption)?;

        match serde_json::from_slice(&plaintext) {
            Ok(value) => Ok(value),
            // A counterpart may seal raw reply text rather than JSON.
            Err(_) => String::from_utf8(plaintext)
                .map(serde_json::Value::String)
                .map_err(|_| ProxyError::Decryption),
        }
    }

    fn cipher_for(&self, counterpart: &PublicKey) -> Result<XChaCha20Poly1305, ProxyError> {
        let shared = self.keypair.shared_secret(counterpart);
        let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut key = [0u8; 32];
        hkdf.expand(KDF_CONTEXT, &mut key)
            .map_err(|_| ProxyError::Encryption("key derivation failed".to_string()))?;
        let cipher = XChaCha20Poly1305::new_from_slice(&key)
            .map_err(|_| ProxyError::Encryption("cipher init failed".to_string()))?;
        key.zeroize();
        Ok(cipher)
    }
}
