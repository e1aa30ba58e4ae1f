//! Cryptographic identity and sealed-channel primitives for the HITL proxy.
//!
//! The agent holds a durable X25519 keypair (the identity). Sensitive tool
//! arguments are sealed for one device public key using a mutual channel:
//! X25519 static-static Diffie-Hellman, HKDF-SHA256 key derivation, and
//! XChaCha20-Poly1305 AEAD. The sealed payload is base64(nonce ‖ ciphertext),
//! so the relay in the middle sees only opaque text.

pub mod keypair;
pub mod keystore;
pub mod sealed;

pub use keypair::{decode_public_key, AgentKeypair};
pub use keystore::Keystore;
pub use sealed::SealedBox;
