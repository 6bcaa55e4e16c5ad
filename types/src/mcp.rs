//! MCP handshake messages and HTTP transport constants.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::jsonrpc::JSONRPC_VERSION;

/// MCP protocol version announced during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Header carrying the remote session identifier.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Accept header value: the remote may answer with plain JSON or SSE.
pub const ACCEPT_JSON_OR_SSE: &str = "application/json, text/event-stream";

/// Path segment every normalized endpoint URL ends with.
pub const MCP_PATH: &str = "/mcp/";

/// Method name of the handshake notification.
pub const INITIALIZED_NOTIFICATION: &str = "notifications/initialized";

/// Client identity sent in `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl ClientInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Build the `initialize` request.
pub fn initialize_request(client: &ClientInfo) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": "initialize",
        "method": "initialize",
        "params": {
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "roots": { "listChanged": true },
                "sampling": {}
            },
            "clientInfo": client
        }
    })
}

/// Build the `notifications/initialized` notification.
pub fn initialized_notification() -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": INITIALIZED_NOTIFICATION
    })
}
