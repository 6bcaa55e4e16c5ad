//! JSON-RPC 2.0 envelopes produced by the proxy itself.
//!
//! Messages coming from the client or the remote server are forwarded as
//! opaque `serde_json::Value`s; these types only describe what the proxy
//! synthesizes when something goes wrong.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;

/// Generic server-side failure (network, auth, malformed upstream reply).
pub const SERVER_ERROR: i64 = -32000;

/// The remote answered with an event stream that carried no usable data frame.
pub const NO_EVENT_DATA: i64 = -32001;

/// JSON-RPC 2.0 error response.
///
/// `id` is always serialized; it is `null` when the request id could not be
/// recovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    pub error: JsonRpcError,
}

impl JsonRpcResponse {
    /// Create an error response.
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcError {
                code,
                message: message.into(),
                data: None,
            },
        }
    }

    /// The response for an input line that is not valid JSON.
    pub fn parse_error() -> Self {
        Self::error(Value::Null, PARSE_ERROR, "Parse error")
    }

    /// Convert into a plain JSON value.
    pub fn into_value(self) -> Value {
        // Serializing a struct of strings and values cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// JSON-RPC 2.0 Error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Read the `id` of an inbound message, `null` when absent.
pub fn message_id(message: &Value) -> Value {
    message.get("id").cloned().unwrap_or(Value::Null)
}
