//! mcp-tunnel: expose a remote MCP server (HTTP/SSE behind a bearer-token
//! gateway) as a local stdio MCP server.
//!
//! ```text
//! stdin ──> transport ──> Forwarder ──> SessionManager ──> CredentialProvider
//!                             │                                  │
//! stdout <── transport <──────┴──── HTTP POST <── bearer token <─┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod http;
pub mod logging;
pub mod session;
pub mod transport;

use std::sync::Arc;

use auth::{CliTokenIssuer, CredentialProvider};
use config::Config;
use forwarder::Forwarder;
use session::{HandshakePolicy, SessionManager};

/// Wire credential provider, session manager and forwarder from `config`.
pub fn build_forwarder(config: &Config) -> anyhow::Result<Forwarder> {
    let http = http::build_client(config.request_timeout)?;

    let issuer = CliTokenIssuer::from_settings(&config.auth, &config.identity_host)?;
    let credentials = Arc::new(CredentialProvider::for_endpoint(
        &config.endpoint,
        &config.identity_host,
        &config.auth,
        Arc::new(issuer),
        http.clone(),
    ));

    let policy = if config.session.strict_handshake {
        HandshakePolicy::Strict
    } else {
        HandshakePolicy::BestEffort
    };
    let session = Arc::new(SessionManager::new(
        http.clone(),
        config.endpoint.url().clone(),
        policy,
    ));

    Ok(Forwarder::new(
        http,
        config.endpoint.url().clone(),
        credentials,
        session,
    )
    .with_session_recovery(config.session.recover_expired))
}
