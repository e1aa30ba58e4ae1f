//! End-to-end-encrypted MCP proxy for human-in-the-loop tool calls.
//!
//! Sits between a tool-calling agent (stdio, JSON-RPC) and a remote
//! tool-serving backend (MCP over streamable HTTP). Sensitive tools that
//! carry human-readable prompts and responses are transparently re-encrypted
//! so their plaintext never touches the relay; every other tool passes
//! through unmodified.
//!
//! Data flow:
//! caller → [`front::StdioFront`] → [`engine::ProxyEngine`] →
//! pass-through via [`gateway::HttpGateway`], or seal with
//! [`hitl_crypto::SealedBox`] → encrypted-variant tool on the backend →
//! open the sealed response → caller.

pub mod auth;
pub mod devices;
pub mod engine;
pub mod front;
pub mod gateway;
