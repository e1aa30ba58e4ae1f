//! Backend tool gateway: MCP JSON-RPC over streamable HTTP.
//!
//! Speaks the streamable HTTP transport toward the backend tool server:
//! - HTTP POST per JSON-RPC request, bearer-authenticated
//! - Responses as plain JSON or as an SSE (`text/event-stream`) body
//! - Session tracking via the `Mcp-Session-Id` header
//!
//! Tool invocations run under a minutes-scale timeout because the flow
//! waits on a human; the timeout failure stays distinguishable from other
//! transport failures. The gateway never retries — a double-fired
//! sensitive call could duplicate a human notification.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use hitl_types::config::ProxyConfig;
use hitl_types::errors::ProxyError;
use hitl_types::protocol::{JsonRpcMessage, McpToolDef, ToolOutput, PROTOCOL_VERSION};
use hitl_types::traits::{CredentialProvider, ToolGateway};

/// A parsed SSE event from a `text/event-stream` response body.
#[derive(Debug, Default)]
struct SseEvent {
    data: String,
}

/// Split a raw SSE body into events. Events are separated by blank lines;
/// multiple `data:` lines within one event are joined with newlines.
fn parse_sse_events(body: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    for raw in body.split("\n\n") {
        let mut event = SseEvent::default();
        let mut has_data = false;
        for line in raw.lines() {
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.find(':') {
                Some(pos) => (&line[..pos], line[pos + 1..].strip_prefix(' ').unwrap_or(&line[pos + 1..])),
                None => (line, ""),
            };
            if field == "data" {
                if has_data {
                    event.data.push('\n');
                }
                event.data.push_str(value);
                has_data = true;
            }
        }
        if has_data {
            events.push(event);
        }
    }
    events
}

/// MCP gateway over streamable HTTP.
pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: String,
    credentials: Arc<dyn CredentialProvider>,
    request_timeout: Duration,
    call_timeout: Duration,
    next_id: AtomicI64,
    session_id: Mutex<Option<String>>,
    init_state: tokio::sync::Mutex<bool>,
}

impl HttpGateway {
    /// A gateway for the configured backend MCP endpoint.
    pub fn new(
        config: &ProxyConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ProxyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.mcp_endpoint(),
            credentials,
            request_timeout: config.request_timeout,
            call_timeout: config.call_timeout,
            next_id: AtomicI64::new(1),
            session_id: Mutex::new(None),
            init_state: tokio::sync::Mutex::new(false),
        })
    }

    /// 4xx means the request itself is bad; 5xx may clear up on a later call.
    fn classify_http_status(status: reqwest::StatusCode) -> ProxyError {
        if status.is_client_error() {
            ProxyError::Gateway(format!("backend rejected request: HTTP {status}"))
        } else {
            ProxyError::Gateway(format!("backend error: HTTP {status}"))
        }
    }

    fn classify_send_error(e: reqwest::Error, timeout: Duration) -> ProxyError {
        if e.is_timeout() {
            ProxyError::Timeout(format!(
                "no response within {}s: {e}",
                timeout.as_secs()
            ))
        } else if e.is_connect() {
            ProxyError::Gateway(format!("failed to connect to backend: {e}"))
        } else {
            ProxyError::Gateway(format!("request failed: {e}"))
        }
    }

    fn capture_session_id(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(value) = headers.get("mcp-session-id").and_then(|v| v.to_str().ok()) {
            let mut session = self.session_id.lock().unwrap_or_else(|p| p.into_inner());
            if session.as_deref() != Some(value) {
                debug!(session_id = value, "captured backend MCP session");
                *session = Some(value.to_string());
            }
        }
    }

    /// POST one JSON-RPC message and collect the JSON-RPC messages in the
    /// response body (plain JSON or SSE).
    async fn post(
        &self,
        message: &JsonRpcMessage,
        timeout: Duration,
    ) -> Result<Vec<JsonRpcMessage>, ProxyError> {
        let token = self.credentials.bearer_token()?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .bearer_auth(token)
            .header(
                reqwest::header::ACCEPT,
                "application/json, text/event-stream",
            )
            .json(message);

        let session = {
            let guard = self.session_id.lock().unwrap_or_else(|p| p.into_inner());
            guard.clone()
        };
        if let Some(session_id) = session {
            request = request.header("mcp-session-id", session_id);
        }

        debug!(method = ?message.method, id = ?message.id, "sending JSON-RPC request");

        let response = request
            .send()
            .await
            .map_err(|e| Self::classify_send_error(e, timeout))?;

        self.capture_session_id(response.headers());

        let status = response.status();
        if !status.is_success() {
            return Err(Self::classify_http_status(status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ProxyError::Gateway(format!("failed to read response body: {e}")))?;

        if body.is_empty() {
            // Notifications legitimately get empty 2xx responses.
            return Ok(Vec::new());
        }

        if content_type.contains("text/event-stream") {
            let mut messages = Vec::new();
            for event in parse_sse_events(&body) {
                match serde_json::from_str::<JsonRpcMessage>(&event.data) {
                    Ok(msg) => messages.push(msg),
                    Err(e) => warn!(error = %e, "skipping unparseable SSE event"),
                }
            }
            Ok(messages)
        } else {
            let msg: JsonRpcMessage = serde_json::from_str(&body)
                .map_err(|e| ProxyError::Gateway(format!("unparseable backend response: {e}")))?;
            Ok(vec![msg])
        }
    }

    /// Issue a request and return its matched result value.
    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, ProxyError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = JsonRpcMessage::request(id, method, params);
        let responses = self.post(&message, timeout).await?;

        let expected = serde_json::Value::Number(id.into());
        let response = responses
            .into_iter()
            .find(|msg| msg.id.as_ref() == Some(&expected))
            .ok_or_else(|| {
                ProxyError::Gateway(format!("backend returned no response for {method}"))
            })?;

        if let Some(error) = response.error {
            return Err(ProxyError::Gateway(format!(
                "backend error {}: {}",
                error.code, error.message
            )));
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    /// Run the MCP initialize handshake once per process.
    async fn ensure_initialized(&self) -> Result<(), ProxyError> {
        let mut initialized = self.init_state.lock().await;
        if *initialized {
            return Ok(());
        }

        self.request(
            "initialize",
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "hitl-proxy",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
            self.request_timeout,
        )
        .await?;

        // Notification: no id, no response expected.
        let note = JsonRpcMessage::notification("notifications/initialized");
        self.post(&note, self.request_timeout).await?;

        *initialized = true;
        debug!("backend MCP session initialized");
        Ok(())
    }
}

#[async_trait]
impl ToolGateway for HttpGateway {
    async fn list_remote_tools(&self) -> Result<Vec<McpToolDef>, ProxyError> {
        self.ensure_initialized().await?;
        let result = self
            .request("tools/list", serde_json::json!({}), self.request_timeout)
            .await?;
        let tools = result.get("tools").cloned().ok_or_else(|| {
            ProxyError::Gateway("tools/list response missing 'tools'".to_string())
        })?;
        serde_json::from_value(tools)
            .map_err(|e| ProxyError::Gateway(format!("malformed tool catalog: {e}")))
    }

    async fn invoke_remote_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ProxyError> {
        self.ensure_initialized().await?;
        let result = self
            .request(
                "tools/call",
                serde_json::json!({"name": name, "arguments": arguments}),
                self.call_timeout,
            )
            .await?;
        serde_json::from_value(result)
            .map_err(|e| ProxyError::Gateway(format!("malformed tool result: {e}")))
    }
}
