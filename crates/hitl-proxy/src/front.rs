//! Stdio front: newline-delimited JSON-RPC toward the calling agent.
//!
//! One JSON-RPC message per line on stdin, one per line on stdout. Logging
//! goes to stderr, so stdout carries protocol frames only.
//!
//! Requests are handled concurrently: a human can take minutes to answer a
//! `request_human_input` call, and other tool calls must not queue behind
//! it. Responses are funneled through a single writer task so frames never
//! interleave, which means response order follows completion order, as
//! JSON-RPC permits.

use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use hitl_types::errors::ProxyError;
use hitl_types::protocol::{JsonRpcMessage, PROTOCOL_VERSION};

use crate::engine::ProxyEngine;

/// JSON-RPC parse error code.
const PARSE_ERROR: i64 = -32700;
/// JSON-RPC method-not-found code.
const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC invalid-params code.
const INVALID_PARAMS: i64 = -32602;

/// Serves the MCP protocol over a line-delimited byte stream pair.
pub struct StdioFront {
    engine: Arc<ProxyEngine>,
}

impl StdioFront {
    /// A front dispatching into the given engine.
    pub fn new(engine: Arc<ProxyEngine>) -> Self {
        Self { engine }
    }

    /// Serve on the process's stdin/stdout until stdin closes.
    pub async fn run(self) -> Result<(), ProxyError> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve on arbitrary streams until the reader reaches end of input.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> Result<(), ProxyError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<JsonRpcMessage>(64);

        // Single writer: in-flight handlers finish in any order, but frames
        // must hit the stream whole.
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(message) = rx.recv().await {
                let line = match serde_json::to_string(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "dropping unserializable response");
                        continue;
                    }
                };
                if writer.write_all(line.as_bytes()).await.is_err()
                    || writer.write_all(b"\n").await.is_err()
                    || writer.flush().await.is_err()
                {
                    warn!("output stream closed; stopping writer");
                    break;
                }
            }
        });

        let mut lines = reader.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => return Err(ProxyError::Io(format!("stdin read failed: {e}"))),
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcMessage>(line) {
                Ok(message) => self.dispatch(message, &tx),
                Err(e) => {
                    debug!(error = %e, "unparseable input frame");
                    let _ = tx
                        .send(JsonRpcMessage::error_response(
                            serde_json::Value::Null,
                            PARSE_ERROR,
                            format!("parse error: {e}"),
                        ))
                        .await;
                }
            }
        }

        info!("input stream closed; shutting down");
        drop(tx);
        let _ = writer_task.await;
        Ok(())
    }

    fn dispatch(&self, message: JsonRpcMessage, tx: &mpsc::Sender<JsonRpcMessage>) {
        let Some(method) = message.method.clone() else {
            // A response frame from the caller; nothing expects one.
            debug!("ignoring methodless frame");
            return;
        };

        let Some(id) = message.id.clone() else {
            // Notifications get no response.
            match method.as_str() {
                "notifications/initialized" => debug!("caller completed initialization"),
                other => debug!(method = other, "ignoring notification"),
            }
            return;
        };

        let engine = self.engine.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = match method.as_str() {
                "initialize" => JsonRpcMessage::response(
                    id,
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {"tools": {}},
                        "serverInfo": {
                            "name": "hitl-proxy",
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    }),
                ),
                "ping" => JsonRpcMessage::response(id, json!({})),
                "tools/list" => match engine.list_tools().await {
                    Ok(tools) => JsonRpcMessage::response(id, json!({"tools": tools})),
                    Err(e) => protocol_error(id, &e),
                },
                "tools/call" => {
                    let params = message.params.unwrap_or(serde_json::Value::Null);
                    let Some(name) = params.get("name").and_then(|n| n.as_str()) else {
                        let _ = tx
                            .send(JsonRpcMessage::error_response(
                                id,
                                INVALID_PARAMS,
                                "tools/call requires a string `name` parameter",
                            ))
                            .await;
                        return;
                    };
                    let arguments = params
                        .get("arguments")
                        .cloned()
                        .unwrap_or_else(|| json!({}));

                    match engine.call_tool(name, arguments).await {
                        Ok(output) => match serde_json::to_value(&output) {
                            Ok(result) => JsonRpcMessage::response(id, result),
                            Err(e) => protocol_error(id, &ProxyError::from(e)),
                        },
                        Err(e) => {
                            warn!(tool = name, error = %e, "tool call failed");
                            protocol_error(id, &e)
                        }
                    }
                }
                other => JsonRpcMessage::error_response(
                    id,
                    METHOD_NOT_FOUND,
                    format!("method not found: {other}"),
                ),
            };
            let _ = tx.send(response).await;
        });
    }
}

/// The single point where typed errors become JSON-RPC protocol errors.
fn protocol_error(id: serde_json::Value, error: &ProxyError) -> JsonRpcMessage {
    JsonRpcMessage::error_response(id, error.jsonrpc_code(), error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hitl_crypto::{AgentKeypair, SealedBox};
    use hitl_types::protocol::{McpToolDef, ToolOutput};
    use hitl_types::traits::{DeviceDirectory, ToolGateway};
    use tokio::io::DuplexStream;

    struct StaticGateway;

    #[async_trait]
    impl ToolGateway for StaticGateway {
        async fn list_remote_tools(&self) -> Result<Vec<McpToolDef>, ProxyError> {
            Ok(vec![
                McpToolDef {
                    name: "other_tool".to_string(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                },
                McpToolDef {
                    name: "request_human_input_e2ee".to_string(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                },
            ])
        }

        async fn invoke_remote_tool(
            &self,
            name: &str,
            _arguments: serde_json::Value,
        ) -> Result<ToolOutput, ProxyError> {
            Ok(ToolOutput::text(format!("{name} ran")))
        }
    }

    struct NoDevices;

    #[async_trait]
    impl DeviceDirectory for NoDevices {
        async fn fetch_device_public_keys(&self) -> Result<Vec<String>, ProxyError> {
            Ok(Vec::new())
        }
    }

    struct Client {
        to_front: DuplexStream,
        from_front: tokio::io::Lines<BufReader<DuplexStream>>,
    }

    impl Client {
        async fn send(&mut self, frame: serde_json::Value) {
            let mut line = frame.to_string();
            line.push('\n');
            self.to_front.write_all(line.as_bytes()).await.unwrap();
        }

        async fn send_raw(&mut self, line: &str) {
            self.to_front.write_all(line.as_bytes()).await.unwrap();
            self.to_front.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> serde_json::Value {
            let line = self.from_front.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }
    }

    fn start_front() -> Client {
        let engine = Arc::new(ProxyEngine::new(
            Arc::new(StaticGateway),
            Arc::new(NoDevices),
            SealedBox::new(AgentKeypair::generate()),
        ));
        let (to_front, front_reader) = tokio::io::duplex(4096);
        let (front_writer, from_front) = tokio::io::duplex(4096);
        tokio::spawn(
            StdioFront::new(engine).serve(BufReader::new(front_reader), front_writer),
        );
        Client {
            to_front,
            from_front: BufReader::new(from_front).lines(),
        }
    }

    #[tokio::test]
    async fn initialize_handshake() {
        let mut client = start_front();
        client
            .send(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
            .await;

        let resp = client.recv().await;
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(resp["result"]["serverInfo"]["name"], "hitl-proxy");
    }

    #[tokio::test]
    async fn tools_list_exposes_filtered_catalog() {
        let mut client = start_front();
        client
            .send(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
            .await;

        let resp = client.recv().await;
        let names: Vec<&str> = resp["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"request_human_input"));
        assert!(names.contains(&"notify_human"));
        assert!(names.contains(&"other_tool"));
        assert!(!names.iter().any(|n| n.ends_with("_e2ee")));
    }

    #[tokio::test]
    async fn tools_call_pass_through() {
        let mut client = start_front();
        client
            .send(json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "other_tool", "arguments": {"x": 1}},
            }))
            .await;

        let resp = client.recv().await;
        assert_eq!(resp["result"]["content"][0]["text"], "other_tool ran");
        assert_eq!(resp["result"]["isError"], false);
    }

    #[tokio::test]
    async fn sensitive_call_without_device_maps_to_protocol_error() {
        let mut client = start_front();
        client
            .send(json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "request_human_input", "arguments": {"prompt": "hi"}},
            }))
            .await;

        let resp = client.recv().await;
        assert_eq!(resp["error"]["code"], ProxyError::NoRecipientKey.jsonrpc_code());
        assert!(resp["result"].is_null());
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let mut client = start_front();
        client
            .send(json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"}))
            .await;

        let resp = client.recv().await;
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn garbage_input_yields_parse_error() {
        let mut client = start_front();
        client.send_raw("this is not json").await;

        let resp = client.recv().await;
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
        assert!(resp["id"].is_null());
    }

    #[tokio::test]
    async fn tools_call_without_name_is_invalid_params() {
        let mut client = start_front();
        client
            .send(json!({
                "jsonrpc": "2.0", "id": 6, "method": "tools/call",
                "params": {"arguments": {}},
            }))
            .await;

        let resp = client.recv().await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let mut client = start_front();
        client
            .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        // A follow-up request proves the notification produced no frame.
        client
            .send(json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}))
            .await;

        let resp = client.recv().await;
        assert_eq!(resp["id"], 7);
        assert_eq!(resp["result"], json!({}));
    }
}
