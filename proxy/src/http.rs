//! Request builders shared by the handshake and the forwarder.

use mcp_tunnel_types::mcp::{ACCEPT_JSON_OR_SSE, MCP_SESSION_ID_HEADER};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use std::time::Duration;

use crate::auth::BearerToken;

/// HTTP client for the remote endpoint.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Add bearer auth, content negotiation and the session header.
pub fn authorized(
    builder: RequestBuilder,
    token: &BearerToken,
    session_id: Option<&str>,
) -> RequestBuilder {
    let builder = builder
        .bearer_auth(token.as_str())
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, ACCEPT_JSON_OR_SSE);
    match session_id {
        Some(id) => builder.header(MCP_SESSION_ID_HEADER, id),
        None => builder,
    }
}

/// POST `body` as JSON to `endpoint`.
pub fn json_post(
    client: &Client,
    endpoint: &Url,
    token: &BearerToken,
    session_id: Option<&str>,
    body: &Value,
) -> RequestBuilder {
    // Serializing a Value cannot fail; `.json()` would also overwrite our content type.
    let payload = serde_json::to_vec(body).unwrap_or_default();
    authorized(client.post(endpoint.clone()), token, session_id).body(payload)
}
