//! Forwards one JSON-RPC message to the remote endpoint and normalizes the reply.
//!
//! The remote may answer with a plain JSON document or with an SSE-framed body
//! (`event: message` / `data: {...}`). Only the first parseable data frame is
//! used: every stdio request maps to exactly one reply.

use async_trait::async_trait;
use mcp_tunnel_types::jsonrpc::message_id;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::CredentialProvider;
use crate::error::{ProxyError, Result};
use crate::http::json_post;
use crate::session::SessionManager;
use crate::transport::MessageHandler;

/// Marker identifying an SSE-framed reply body.
const SSE_EVENT_MARKER: &str = "event: message";

/// Prefix of an SSE data line.
const SSE_DATA_PREFIX: &str = "data: ";

/// Bridges JSON-RPC messages onto HTTP POSTs.
pub struct Forwarder {
    http: Client,
    endpoint: Url,
    credentials: Arc<CredentialProvider>,
    session: Arc<SessionManager>,
    /// Re-handshake once when the remote rejects the session with 404.
    recover_expired: bool,
}

impl Forwarder {
    pub fn new(
        http: Client,
        endpoint: Url,
        credentials: Arc<CredentialProvider>,
        session: Arc<SessionManager>,
    ) -> Self {
        Self {
            http,
            endpoint,
            credentials,
            session,
            recover_expired: false,
        }
    }

    pub fn with_session_recovery(mut self, enabled: bool) -> Self {
        self.recover_expired = enabled;
        self
    }

    /// Forward `message` and return the remote's reply, or a JSON-RPC error
    /// carrying the message's `id`.
    pub async fn forward(&self, message: Value) -> Value {
        match self.try_forward(&message).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Forwarding failed: {}", e);
                e.into_response(message_id(&message)).into_value()
            }
        }
    }

    async fn try_forward(&self, message: &Value) -> Result<Value> {
        self.session.ensure_session(&self.credentials).await?;
        let session_id = self.session.session_id().await;

        match self.post(message, session_id.as_deref()).await {
            Err(ProxyError::Status { status: 404, body })
                if self.recover_expired && session_id.is_some() =>
            {
                warn!(
                    "Remote rejected session {:?} (HTTP 404: {}), re-running handshake",
                    session_id,
                    crate::error::excerpt(&body)
                );
                self.session.reset().await;
                self.session.ensure_session(&self.credentials).await?;
                let session_id = self.session.session_id().await;
                self.post(message, session_id.as_deref()).await
            }
            other => other,
        }
    }

    async fn post(&self, message: &Value, session_id: Option<&str>) -> Result<Value> {
        let token = self.credentials.get_token().await?;
        let response = json_post(&self.http, &self.endpoint, &token, session_id, message)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!("Remote replied {} ({} bytes)", status, body.len());

        if status != StatusCode::OK {
            return Err(ProxyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_reply(&body)
    }
}

#[async_trait]
impl MessageHandler for Forwarder {
    async fn handle(&self, message: Value) -> Value {
        self.forward(message).await
    }
}

/// Turn a 200 reply body into a JSON-RPC message.
pub fn parse_reply(body: &str) -> Result<Value> {
    if body.contains(SSE_EVENT_MARKER) {
        first_event_data(body).ok_or(ProxyError::MissingEventData)
    } else {
        Ok(serde_json::from_str(body)?)
    }
}

/// First `data: ` line of an SSE body that parses as JSON.
fn first_event_data(body: &str) -> Option<Value> {
    body.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix(SSE_DATA_PREFIX))
        .find_map(|data| serde_json::from_str(data).ok())
}
