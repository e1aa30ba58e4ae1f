//! Trait contracts for the proxy's subsystems.
//!
//! The proxy engine codes against these interfaces, not against concrete
//! HTTP clients, so test doubles can substitute cleanly and no subsystem
//! reaches through ambient global state.

use async_trait::async_trait;

use crate::errors::ProxyError;
use crate::protocol::{McpToolDef, ToolOutput};

/// Source of the bearer credential used for all backend calls.
///
/// The login flow that produces the credential is an external collaborator;
/// the proxy only consumes the resulting token string.
pub trait CredentialProvider: Send + Sync {
    /// The current bearer token.
    ///
    /// Fails with [`ProxyError::AuthenticationRequired`] when no credential
    /// is available.
    fn bearer_token(&self) -> Result<String, ProxyError>;
}

/// Directory of the human's registered device public keys.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Fetch the text-encoded public keys of the account's devices.
    ///
    /// An empty list is a valid result (the account has no registered
    /// devices) and is distinct from an error; callers must handle it.
    async fn fetch_device_public_keys(&self) -> Result<Vec<String>, ProxyError>;
}

/// Gateway to the remote tool-serving backend.
///
/// Forwards named-tool invocations over an authenticated transport and
/// returns the protocol-level result unprocessed. Does not retry: a
/// sensitive-tool call that double-fires could duplicate a human
/// notification.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// List the backend's tool catalog.
    async fn list_remote_tools(&self) -> Result<Vec<McpToolDef>, ProxyError>;

    /// Invoke a named tool with the given arguments.
    ///
    /// The implementation carries a minutes-scale timeout because this flow
    /// waits on a human; timeouts surface as [`ProxyError::Timeout`].
    async fn invoke_remote_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ProxyError>;
}
