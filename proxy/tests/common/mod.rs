//! Test doubles: a fake remote MCP endpoint, a fake identity host and a
//! counting token issuer.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use mcp_tunnel::auth::{BearerToken, CredentialProvider, TokenIssuer};
use mcp_tunnel::error::AuthError;
use mcp_tunnel::forwarder::Forwarder;
use mcp_tunnel::http::build_client;
use mcp_tunnel::session::{HandshakePolicy, SessionManager};
use reqwest::Url;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PROBE_PATH: &str = "/api/2.0/preview/scim/v2/Me";

/// What the fake remote answers to a forwarded (non-handshake) POST.
#[derive(Clone, Debug)]
pub enum Reply {
    Json(String),
    Sse(String),
    Status(u16, String),
    /// Plain JSON `{"jsonrpc":"2.0","id":<id>,"result":{"method":<method>}}`.
    Echo,
}

/// A forwarded POST as seen by the fake remote.
#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub body: Value,
    pub authorization: Option<String>,
    pub session_id: Option<String>,
    pub accept: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct RemoteState {
    pub gets: AtomicUsize,
    pub initializes: AtomicUsize,
    pub notifications: AtomicUsize,
    pub probes: AtomicUsize,
    /// Session id handed out by the bootstrap GET.
    pub get_session_id: Mutex<Option<String>>,
    /// Session id handed out on the `initialize` response.
    pub init_session_id: Mutex<Option<String>>,
    /// Status for `initialize` (200 when unset).
    pub init_status: Mutex<Option<u16>>,
    /// Replies for forwarded POSTs, consumed in order; the last one repeats.
    pub replies: Mutex<VecDeque<Reply>>,
    pub seen: Mutex<Vec<SeenRequest>>,
    /// Tokens the identity probe accepts.
    pub valid_tokens: Mutex<HashSet<String>>,
    /// `user-agent` of each identity probe.
    pub probe_agents: Mutex<Vec<String>>,
}

impl RemoteState {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn set_replies(&self, replies: impl IntoIterator<Item = Reply>) {
        *self.replies.lock().unwrap() = replies.into_iter().collect();
    }

    pub fn accept_token(&self, token: &str) {
        self.valid_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn revoke_token(&self, token: &str) {
        self.valid_tokens.lock().unwrap().remove(token);
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap_or(Reply::Echo)
        }
    }
}

/// A running fake server; serves the MCP endpoint at `/mcp/` and the identity probe.
pub struct FakeRemote {
    pub addr: SocketAddr,
    pub state: Arc<RemoteState>,
}

impl FakeRemote {
    pub async fn start() -> Self {
        let state = Arc::new(RemoteState::default());
        let app = Router::new()
            .route("/mcp/", get(mcp_get).post(mcp_post))
            .route(PROBE_PATH, get(probe))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn endpoint(&self) -> Url {
        Url::parse(&format!("http://{}/mcp/", self.addr)).unwrap()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn with_session(mut response: Response, session_id: Option<String>) -> Response {
    if let Some(id) = session_id {
        response
            .headers_mut()
            .insert("mcp-session-id", HeaderValue::from_str(&id).unwrap());
    }
    response
}

async fn mcp_get(State(state): State<Arc<RemoteState>>) -> Response {
    state.gets.fetch_add(1, Ordering::SeqCst);
    let session_id = state.get_session_id.lock().unwrap().clone();
    with_session(StatusCode::OK.into_response(), session_id)
}

async fn mcp_post(
    State(state): State<Arc<RemoteState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let body: Value = match serde_json::from_str(&body) {
        Ok(body) => body,
        Err(_) => return (StatusCode::BAD_REQUEST, "bad json").into_response(),
    };

    match body["method"].as_str() {
        Some("initialize") => {
            state.initializes.fetch_add(1, Ordering::SeqCst);
            let status = state.init_status.lock().unwrap().unwrap_or(200);
            let status = StatusCode::from_u16(status).unwrap();
            let session_id = state.init_session_id.lock().unwrap().clone();
            let reply = serde_json::json!({
                "jsonrpc": "2.0",
                "id": body["id"].clone(),
                "result": {"protocolVersion": "2024-11-05", "capabilities": {}}
            });
            return with_session((status, reply.to_string()).into_response(), session_id);
        }
        Some("notifications/initialized") => {
            state.notifications.fetch_add(1, Ordering::SeqCst);
            return StatusCode::ACCEPTED.into_response();
        }
        _ => {}
    }

    state.seen.lock().unwrap().push(SeenRequest {
        body: body.clone(),
        authorization: header(&headers, "authorization"),
        session_id: header(&headers, "mcp-session-id"),
        accept: header(&headers, "accept"),
        content_type: header(&headers, "content-type"),
    });

    match state.next_reply() {
        Reply::Json(text) => (
            StatusCode::OK,
            [("content-type", "application/json")],
            text,
        )
            .into_response(),
        Reply::Sse(text) => (
            StatusCode::OK,
            [("content-type", "text/event-stream")],
            text,
        )
            .into_response(),
        Reply::Status(status, text) => {
            (StatusCode::from_u16(status).unwrap(), text).into_response()
        }
        Reply::Echo => {
            let reply = serde_json::json!({
                "jsonrpc": "2.0",
                "id": body["id"].clone(),
                "result": {"method": body["method"].clone()}
            });
            (
                StatusCode::OK,
                [("content-type", "application/json")],
                reply.to_string(),
            )
                .into_response()
        }
    }
}

async fn probe(State(state): State<Arc<RemoteState>>, headers: HeaderMap) -> StatusCode {
    state.probes.fetch_add(1, Ordering::SeqCst);
    if let Some(agent) = header(&headers, "user-agent") {
        state.probe_agents.lock().unwrap().push(agent);
    }
    let token = header(&headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer ").map(|t| t.to_string()));
    match token {
        Some(token) if state.valid_tokens.lock().unwrap().contains(&token) => StatusCode::OK,
        _ => StatusCode::UNAUTHORIZED,
    }
}

/// Token issuer with scripted results and call counters.
#[derive(Default)]
pub struct FakeIssuer {
    pub fetches: AtomicUsize,
    pub logins: AtomicUsize,
    /// Results of successive `fetch_token` calls; `None` = failure.
    /// When empty, every fetch fails.
    pub fetch_results: Mutex<VecDeque<Option<String>>>,
    pub login_fails: std::sync::atomic::AtomicBool,
}

impl FakeIssuer {
    pub fn with_fetches(results: impl IntoIterator<Item = Option<&'static str>>) -> Arc<Self> {
        let issuer = Self::default();
        *issuer.fetch_results.lock().unwrap() = results
            .into_iter()
            .map(|r| r.map(|s| s.to_string()))
            .collect();
        Arc::new(issuer)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for FakeIssuer {
    async fn fetch_token(&self) -> Result<BearerToken, AuthError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up behind the refresh.
        tokio::time::sleep(Duration::from_millis(20)).await;
        match self.fetch_results.lock().unwrap().pop_front().flatten() {
            Some(token) => Ok(BearerToken::new(token)),
            None => Err(AuthError::MissingToken),
        }
    }

    async fn login(&self) -> Result<(), AuthError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.login_fails.load(Ordering::SeqCst) {
            Err(AuthError::MissingToken)
        } else {
            Ok(())
        }
    }
}

/// Credential provider validating against `remote`'s identity probe.
pub fn remote_credentials(remote: &FakeRemote, issuer: Arc<FakeIssuer>) -> Arc<CredentialProvider> {
    Arc::new(CredentialProvider::remote(
        remote.base_url(),
        PROBE_PATH,
        Duration::from_secs(2),
        issuer,
        build_client(Duration::from_secs(5)).unwrap(),
    ))
}

/// Session manager and forwarder wired against `remote`.
pub fn forwarder(
    remote: &FakeRemote,
    credentials: Arc<CredentialProvider>,
    policy: HandshakePolicy,
) -> (Forwarder, Arc<SessionManager>) {
    let http = build_client(Duration::from_secs(5)).unwrap();
    let session = Arc::new(SessionManager::new(http.clone(), remote.endpoint(), policy));
    let forwarder = Forwarder::new(http, remote.endpoint(), credentials, session.clone());
    (forwarder, session)
}
