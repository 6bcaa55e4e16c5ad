//! MCP session handshake against the remote endpoint.
//!
//! The handshake runs lazily on the first forwarded message and at most once
//! per process: bootstrap GET (to learn the `mcp-session-id`), `initialize`,
//! then `notifications/initialized`.

use mcp_tunnel_types::mcp::{
    initialize_request, initialized_notification, ClientInfo, MCP_SESSION_ID_HEADER,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, Url};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{BearerToken, CredentialProvider};
use crate::error::{ProxyError, Result};
use crate::http::{authorized, json_post};

/// What to do when a handshake step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakePolicy {
    /// `initialize` and `initialized` failures are logged and the session is
    /// still marked initialized; the remote may accept later calls anyway.
    #[default]
    BestEffort,
    /// Every step must succeed with a 2xx status.
    Strict,
}

/// Session identity as negotiated with the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub id: Option<String>,
    pub initialized: bool,
}

/// Owns the session for the lifetime of the process.
pub struct SessionManager {
    http: Client,
    endpoint: Url,
    policy: HandshakePolicy,
    client_info: ClientInfo,
    /// Held for the whole handshake so it runs exactly once.
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(http: Client, endpoint: Url, policy: HandshakePolicy) -> Self {
        Self {
            http,
            endpoint,
            policy,
            client_info: ClientInfo::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Run the handshake unless it already completed.
    pub async fn ensure_session(&self, credentials: &CredentialProvider) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.initialized {
            return Ok(());
        }

        let token = credentials.get_token().await?;
        *state = self.handshake(&token).await?;
        info!(
            "MCP session established (session id: {})",
            state.id.as_deref().unwrap_or("none")
        );
        Ok(())
    }

    /// Current session identifier, if the remote assigned one.
    pub async fn session_id(&self) -> Option<String> {
        self.state.lock().await.id.clone()
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.initialized
    }

    /// Forget the session so the next `ensure_session` handshakes again.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        debug!("Resetting MCP session {:?}", state.id);
        *state = SessionState::default();
    }

    async fn handshake(&self, token: &BearerToken) -> Result<SessionState> {
        let response = authorized(self.http.get(self.endpoint.clone()), token, None)
            .send()
            .await?;
        let mut session_id = session_id_from(response.headers());
        debug!(
            "Bootstrap GET returned {} (session id: {:?})",
            response.status(),
            session_id
        );
        if self.policy == HandshakePolicy::Strict && !response.status().is_success() {
            return Err(ProxyError::Handshake(format!(
                "bootstrap GET returned HTTP {}",
                response.status()
            )));
        }

        let init = initialize_request(&self.client_info);
        match self.post(token, session_id.as_deref(), &init).await {
            Ok(headers) => {
                if session_id.is_none() {
                    session_id = session_id_from(&headers);
                }
            }
            Err(e) => self.tolerate("initialize", e)?,
        }

        let notification = initialized_notification();
        if let Err(e) = self.post(token, session_id.as_deref(), &notification).await {
            self.tolerate("notifications/initialized", e)?;
        }

        Ok(SessionState {
            id: session_id,
            initialized: true,
        })
    }

    /// POST a handshake message, returning the response headers on success.
    async fn post(
        &self,
        token: &BearerToken,
        session_id: Option<&str>,
        body: &Value,
    ) -> Result<HeaderMap> {
        let response = json_post(&self.http, &self.endpoint, token, session_id, body)
            .send()
            .await?;
        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(headers)
    }

    fn tolerate(&self, step: &str, error: ProxyError) -> Result<()> {
        match self.policy {
            HandshakePolicy::BestEffort => {
                warn!("MCP handshake step `{}` failed, continuing: {}", step, error);
                Ok(())
            }
            HandshakePolicy::Strict => Err(ProxyError::Handshake(format!("{}: {}", step, error))),
        }
    }
}

fn session_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_session_id_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id_from(&headers), None);

        headers.insert(MCP_SESSION_ID_HEADER, HeaderValue::from_static(""));
        assert_eq!(session_id_from(&headers), None);

        headers.insert(MCP_SESSION_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(session_id_from(&headers), Some("abc-123".to_string()));
    }

    #[test]
    fn test_default_policy_is_best_effort() {
        assert_eq!(HandshakePolicy::default(), HandshakePolicy::BestEffort);
    }
}
