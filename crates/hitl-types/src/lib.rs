//! Shared types for the HITL E2EE MCP proxy.
//!
//! These types are the lingua franca of the proxy — every crate imports from
//! here. The trait contracts live alongside the data types so that each
//! subsystem can be developed and tested against interfaces rather than
//! against each other's concrete types.

pub mod config;
pub mod errors;
pub mod protocol;
pub mod traits;
