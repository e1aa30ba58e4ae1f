//! Tool filter and translator: the proxy's core state machine.
//!
//! Per invocation, decides whether to apply the encrypt → forward → decrypt
//! transformation (sensitive human-in-the-loop tools) or to pass the call
//! through to the backend unchanged (everything else). Also filters the
//! advertised catalog so encrypted-variant tools stay invisible to the
//! caller.
//!
//! The engine is stateless across calls: all state is per-invocation, so
//! concurrent in-flight calls need no locking.

use std::sync::Arc;

use tracing::{debug, info, warn};

use hitl_crypto::SealedBox;
use hitl_types::errors::ProxyError;
use hitl_types::protocol::{McpToolDef, ToolOutput};
use hitl_types::traits::{DeviceDirectory, ToolGateway};

/// Suffix marking a backend tool as the sealed variant of a plaintext tool.
pub const E2EE_SUFFIX: &str = "_e2ee";

/// The human-input-request tool.
pub const REQUEST_HUMAN_INPUT: &str = "request_human_input";
/// The human-notification tool.
pub const NOTIFY_HUMAN: &str = "notify_human";

/// Tools whose arguments and responses must never reach the relay in
/// plaintext. Handled locally with the encrypt-forward-decrypt protocol,
/// never proxied generically.
const SENSITIVE_TOOLS: [&str; 2] = [REQUEST_HUMAN_INPUT, NOTIFY_HUMAN];

/// Fixed acknowledgment returned for a delivered notification. The backend
/// acknowledgment for the sealed variant is not itself sealed.
const NOTIFY_ACK: &str = "notification delivered";

fn is_sensitive(name: &str) -> bool {
    SENSITIVE_TOOLS.contains(&name)
}

/// Descriptors for the locally-defined sensitive tools, as shown to the
/// caller. Identical in shape to what a plaintext backend tool would
/// advertise, so the caller cannot observe that encryption happens.
fn local_tool_descriptors() -> Vec<McpToolDef> {
    vec![
        McpToolDef {
            name: REQUEST_HUMAN_INPUT.to_string(),
            description: Some(
                "Pause and ask the human a question; returns their reply text.".to_string(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "The question to put to the human."
                    },
                    "choices": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Optional fixed choices to offer."
                    },
                    "placeholder_text": {
                        "type": "string",
                        "description": "Optional placeholder for a free-text reply."
                    }
                },
                "required": ["prompt"]
            }),
        },
        McpToolDef {
            name: NOTIFY_HUMAN.to_string(),
            description: Some(
                "Send the human a notification; returns a delivery acknowledgment.".to_string(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The notification text."
                    }
                },
                "required": ["message"]
            }),
        },
    ]
}

/// The proxy engine, wiring the gateway, the device key directory, and the
/// sealed-box codec together.
pub struct ProxyEngine {
    gateway: Arc<dyn ToolGateway>,
    devices: Arc<dyn DeviceDirectory>,
    codec: SealedBox,
}

impl ProxyEngine {
    /// An engine over the given collaborators.
    pub fn new(
        gateway: Arc<dyn ToolGateway>,
        devices: Arc<dyn DeviceDirectory>,
        codec: SealedBox,
    ) -> Self {
        Self {
            gateway,
            devices,
            codec,
        }
    }

    /// The tool catalog exposed to the caller.
    ///
    /// Locally-defined sensitive tools come first, then the backend catalog
    /// minus every encrypted-variant name and minus any backend duplicate of
    /// a local name. The result never contains an `_e2ee` name and contains
    /// each sensitive tool exactly once.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>, ProxyError> {
        let mut catalog = local_tool_descriptors();

        let remote = self.gateway.list_remote_tools().await?;
        let remote_count = remote.len();
        for tool in remote {
            if tool.name.ends_with(E2EE_SUFFIX) {
                continue;
            }
            if is_sensitive(&tool.name) {
                // Already defined locally; a generic pass-through would
                // silently skip encryption.
                continue;
            }
            catalog.push(tool);
        }

        debug!(
            exposed = catalog.len(),
            remote = remote_count,
            "filtered tool catalog"
        );
        Ok(catalog)
    }

    /// Dispatch one tool invocation.
    ///
    /// Sensitive tools get the encrypt-forward-decrypt treatment; any other
    /// name — the backend's set is open-ended — is forwarded verbatim and
    /// its result returned unchanged.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ProxyError> {
        if is_sensitive(name) {
            self.call_sensitive(name, arguments).await
        } else {
            debug!(tool = name, "forwarding tool call verbatim");
            self.gateway.invoke_remote_tool(name, arguments).await
        }
    }

    /// Encrypt-forward-decrypt protocol for a sensitive tool.
    ///
    /// Never falls back to plaintext: with no recipient device the call
    /// fails before the gateway is touched.
    async fn call_sensitive(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ProxyError> {
        // Phase 1: recipient key retrieval. Re-fetched per call; device
        // registrations can change between calls.
        let device_keys = self.devices.fetch_device_public_keys().await?;
        let Some(recipient_key) = device_keys.first() else {
            warn!(tool = name, "sensitive call with no registered device");
            return Err(ProxyError::NoRecipientKey);
        };
        // Single-recipient simplification: the first registered device is
        // both the addressee and the expected responder. Multi-device
        // fan-out needs a product decision first.
        if device_keys.len() > 1 {
            debug!(
                devices = device_keys.len(),
                "multiple device keys registered; encrypting for the first"
            );
        }

        // Phase 2: seal the arguments.
        let sealed_arguments = self.codec.seal(&arguments, recipient_key)?;

        // Phase 3: invoke the encrypted variant on the backend.
        let encrypted_tool = format!("{name}{E2EE_SUFFIX}");
        info!(tool = %encrypted_tool, "forwarding sealed payload to backend");
        let response = self
            .gateway
            .invoke_remote_tool(
                &encrypted_tool,
                serde_json::json!({"encrypted_payload": sealed_arguments}),
            )
            .await?;
        if response.is_error {
            let detail = response.first_text().unwrap_or("no detail");
            return Err(ProxyError::Gateway(format!(
                "backend rejected {encrypted_tool}: {detail}"
            )));
        }

        // Phase 4: open the sealed response, except for notifications,
        // whose acknowledgment is plaintext by contract.
        if name == NOTIFY_HUMAN {
            return Ok(ToolOutput::text(NOTIFY_ACK));
        }

        let sealed_response = response.first_text().ok_or_else(|| {
            ProxyError::Gateway(format!(
                "backend returned no sealed content for {encrypted_tool}"
            ))
        })?;
        let opened = self.codec.open(sealed_response, recipient_key)?;
        let reply = match opened {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        };

        Ok(ToolOutput::text(reply))
    }
}
