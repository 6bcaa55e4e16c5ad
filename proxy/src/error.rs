//! Error types for credential handling and request forwarding.

use mcp_tunnel_types::jsonrpc::{JsonRpcResponse, NO_EVENT_DATA, SERVER_ERROR};
use serde_json::Value;
use std::time::Duration;

/// Maximum number of body characters quoted in an HTTP status error.
pub const BODY_EXCERPT_CHARS: usize = 100;

/// Error type for credential issuance and validation.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Failed to run credential helper `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential helper `{action}` exited with {status}: {stderr}")]
    CommandFailed {
        action: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Credential helper `{action}` timed out after {}s", .timeout.as_secs())]
    Timeout { action: String, timeout: Duration },

    #[error("Credential helper printed invalid JSON: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    #[error("No access token in response")]
    MissingToken,

    #[error("No credential helper command configured")]
    NoCommand,

    #[error("Failed to authenticate: {0}")]
    LoginFailed(Box<AuthError>),
}

/// Error type for everything that can fail while serving one request.
///
/// Each variant maps onto a JSON-RPC error code via [`ProxyError::code`].
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {}", excerpt(.body))]
    Status { status: u16, body: String },

    #[error("no data frame in event stream")]
    MissingEventData,

    #[error("Invalid JSON from remote: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Handshake failed: {0}")]
    Handshake(String),
}

impl ProxyError {
    /// JSON-RPC error code reported for this error.
    pub fn code(&self) -> i64 {
        match self {
            ProxyError::Status { status, .. } => i64::from(*status),
            ProxyError::MissingEventData => NO_EVENT_DATA,
            _ => SERVER_ERROR,
        }
    }

    /// Convert into the JSON-RPC error response for the request with `id`.
    pub fn into_response(self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::error(id, self.code(), self.to_string())
    }
}

/// The first [`BODY_EXCERPT_CHARS`] characters of a response body.
pub fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
