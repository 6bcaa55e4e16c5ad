//! Shared types for mcp-tunnel.
//!
//! JSON-RPC envelopes and MCP handshake messages used by the proxy and its
//! tests.

pub mod jsonrpc;
pub mod mcp;

// Re-export commonly used types
pub use jsonrpc::{message_id, JsonRpcError, JsonRpcResponse};
pub use mcp::{ClientInfo, MCP_SESSION_ID_HEADER, PROTOCOL_VERSION};
