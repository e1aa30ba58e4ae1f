/// Unified error type for the HITL E2EE proxy.
///
/// All crates use this error type for propagation across crate boundaries.
/// Internal failures are converted into the appropriate named variant so
/// callers can match on *which* kind of failure occurred; the single
/// conversion to a JSON-RPC protocol error happens only at the stdio front.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No identity keypair file exists at the configured path.
    #[error("identity keypair not found: {0}")]
    KeypairNotFound(String),

    /// The keypair file exists but cannot be parsed or fails validation.
    #[error("identity keypair is corrupt: {0}")]
    KeypairCorrupt(String),

    /// No bearer credential is available for an authenticated operation.
    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    /// The device key directory returned a non-success HTTP status.
    #[error("device key fetch failed: HTTP {status}: {body}")]
    DeviceKeyFetch {
        /// HTTP status code returned by the backend.
        status: u16,
        /// Snippet of the response body for diagnostics.
        body: String,
    },

    /// A sensitive-tool call was attempted with no recipient device key.
    #[error("no recipient device key available: register a device before using encrypted tools")]
    NoRecipientKey,

    /// Sealing a payload for the recipient failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Opening a sealed payload failed. Malformed encoding, tampered
    /// ciphertext, and wrong-key mismatches all collapse into this variant
    /// so no key material or tamper detail leaks through the message.
    #[error("decryption failed: sealed payload could not be opened")]
    Decryption,

    /// Transport or protocol failure talking to the backend tool server.
    #[error("backend gateway error: {0}")]
    Gateway(String),

    /// The backend tool call exceeded its timeout budget. Kept distinct
    /// from [`ProxyError::Gateway`] so the caller can tell a slow human
    /// apart from a broken transport.
    #[error("backend call timed out: {0}")]
    Timeout(String),

    /// Malformed request on the local channel.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration loading or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem I/O error (keystore, credential file).
    #[error("io error: {0}")]
    Io(String),
}

impl ProxyError {
    /// JSON-RPC error code for this error kind.
    ///
    /// Application errors use the implementation-defined -32000..-32099
    /// range; protocol-shaped errors use the standard JSON-RPC codes.
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            ProxyError::AuthenticationRequired(_) => -32001,
            ProxyError::NoRecipientKey => -32002,
            ProxyError::DeviceKeyFetch { .. } => -32003,
            ProxyError::Encryption(_) | ProxyError::Decryption => -32004,
            ProxyError::Timeout(_) => -32005,
            ProxyError::Gateway(_) => -32006,
            ProxyError::KeypairNotFound(_) | ProxyError::KeypairCorrupt(_) => -32007,
            ProxyError::Protocol(_) => -32600,
            ProxyError::Serialization(_) | ProxyError::Config(_) | ProxyError::Io(_) => -32603,
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_message_is_fixed() {
        // The Display output must never vary with the underlying cause.
        let msg = ProxyError::Decryption.to_string();
        assert_eq!(msg, "decryption failed: sealed payload could not be opened");
    }

    #[test]
    fn timeout_is_distinguishable_from_gateway() {
        let timeout = ProxyError::Timeout("15m elapsed".to_string());
        let gateway = ProxyError::Gateway("connection refused".to_string());
        assert_ne!(timeout.jsonrpc_code(), gateway.jsonrpc_code());
    }

    #[test]
    fn device_key_fetch_carries_status_and_body() {
        let err = ProxyError::DeviceKeyFetch {
            status: 503,
            body: "upstream unavailable".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("upstream unavailable"));
    }
}
