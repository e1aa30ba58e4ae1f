//! JSON-RPC 2.0 and MCP wire types.
//!
//! The proxy speaks the Model Context Protocol on both sides: newline-delimited
//! JSON-RPC over stdio toward the calling agent, and streamable HTTP toward the
//! backend tool server. Both sides share these frame types.

use serde::{Deserialize, Serialize};

/// MCP protocol version the proxy advertises and accepts.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A JSON-RPC 2.0 message (request, notification, or response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request ID (None for notifications).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Method name (for requests/notifications).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Parameters (for requests/notifications).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Result (for responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error (for error responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcMessage {
    /// Build a request with the given id, method, and params.
    pub fn request(id: i64, method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::Value::Number(id.into())),
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// Build a notification (no id, no response expected).
    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: Some(method.to_string()),
            params: None,
            result: None,
            error: None,
        }
    }

    /// Build a success response carrying `result`.
    pub fn response(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error_response(id: serde_json::Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// An MCP tool definition as exchanged via `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDef {
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input.
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// A typed content block within a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Plain text content.
    Text {
        /// The text payload.
        text: String,
    },
}

/// Result of a `tools/call` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Content blocks produced by the tool.
    pub content: Vec<ContentBlock>,
    /// Whether the tool reported an execution error.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolOutput {
    /// A successful result with a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// The first text block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().map(|block| {
            let ContentBlock::Text { text } = block;
            text.as_str()
        }).next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips() {
        let msg = JsonRpcMessage::request(7, "tools/list", serde_json::json!({}));
        let wire = serde_json::to_string(&msg).unwrap();
        let back: JsonRpcMessage = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.method.as_deref(), Some("tools/list"));
        assert_eq!(back.id, Some(serde_json::json!(7)));
        assert!(back.result.is_none());
    }

    #[test]
    fn notification_has_no_id() {
        let msg = JsonRpcMessage::notification("notifications/initialized");
        let wire = serde_json::to_value(&msg).unwrap();
        assert!(wire.get("id").is_none());
    }

    #[test]
    fn tool_def_uses_camel_case_schema_key() {
        let def = McpToolDef {
            name: "other_tool".to_string(),
            description: Some("a tool".to_string()),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let wire = serde_json::to_value(&def).unwrap();
        assert!(wire.get("inputSchema").is_some());
        assert!(wire.get("input_schema").is_none());
    }

    #[test]
    fn tool_output_text_helper() {
        let out = ToolOutput::text("Yes");
        assert_eq!(out.first_text(), Some("Yes"));
        assert!(!out.is_error);

        let wire = serde_json::to_value(&out).unwrap();
        assert_eq!(wire["content"][0]["type"], "text");
        assert_eq!(wire["content"][0]["text"], "Yes");
    }

    #[test]
    fn tool_output_is_error_defaults_false() {
        let out: ToolOutput =
            serde_json::from_value(serde_json::json!({"content": []})).unwrap();
        assert!(!out.is_error);
    }
}
