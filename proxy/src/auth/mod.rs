//! Bearer credential lifecycle for the remote endpoint.
//!
//! The [`CredentialProvider`] hands out a token that is either a fixed
//! sentinel (loopback endpoints) or a real token obtained from an external
//! credential helper. Real tokens are cached and re-validated with a cheap
//! authenticated probe against the identity host before every use; when the
//! probe fails the helper is asked for a fresh one.
//!
//! ## Refresh sequence
//!
//! 1. `fetch_token` on the [`TokenIssuer`]
//! 2. on failure: `login`, then `fetch_token` once more
//! 3. the result replaces the cached token

mod issuer;

pub use issuer::CliTokenIssuer;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{AuthSettings, EndpointConfig};
use crate::error::AuthError;

/// An opaque bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(..)")
    }
}

/// Source of fresh tokens.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Fetch a token without user interaction.
    async fn fetch_token(&self) -> Result<BearerToken, AuthError>;

    /// Run the interactive login flow so that a later fetch can succeed.
    async fn login(&self) -> Result<(), AuthError>;
}

enum Mode {
    /// Loopback endpoint: the sentinel is returned unconditionally.
    Local(BearerToken),
    Remote {
        identity_host: String,
        probe_url: String,
        probe_timeout: Duration,
        issuer: Arc<dyn TokenIssuer>,
        http: reqwest::Client,
    },
}

/// Obtains, caches and validates the bearer token.
pub struct CredentialProvider {
    mode: Mode,
    /// Held across validation and refresh so only one refresh runs at a time.
    cached: Mutex<Option<BearerToken>>,
}

impl CredentialProvider {
    /// Provider that always returns `token`.
    pub fn local(token: impl Into<String>) -> Self {
        Self {
            mode: Mode::Local(BearerToken::new(token)),
            cached: Mutex::new(None),
        }
    }

    /// Provider backed by `issuer`, validating cached tokens against
    /// `identity_host` with `http`.
    pub fn remote(
        identity_host: impl Into<String>,
        probe_path: &str,
        probe_timeout: Duration,
        issuer: Arc<dyn TokenIssuer>,
        http: reqwest::Client,
    ) -> Self {
        let identity_host = identity_host.into();
        let probe_url = format!("{}{}", identity_host.trim_end_matches('/'), probe_path);
        Self {
            mode: Mode::Remote {
                identity_host,
                probe_url,
                probe_timeout,
                issuer,
                http,
            },
            cached: Mutex::new(None),
        }
    }

    /// Pick the provider kind for `endpoint`.
    pub fn for_endpoint(
        endpoint: &EndpointConfig,
        identity_host: &str,
        settings: &AuthSettings,
        issuer: Arc<dyn TokenIssuer>,
        http: reqwest::Client,
    ) -> Self {
        if endpoint.is_local() {
            debug!("Local endpoint, using placeholder credential");
            Self::local(settings.local_token.clone())
        } else {
            Self::remote(
                identity_host,
                &settings.probe_path,
                settings.probe_timeout,
                issuer,
                http,
            )
        }
    }

    /// Return a usable token, refreshing it when the cached one is rejected.
    pub async fn get_token(&self) -> Result<BearerToken, AuthError> {
        let (identity_host, probe_url, probe_timeout, issuer, http) = match &self.mode {
            Mode::Local(token) => return Ok(token.clone()),
            Mode::Remote {
                identity_host,
                probe_url,
                probe_timeout,
                issuer,
                http,
            } => (identity_host, probe_url, *probe_timeout, issuer, http),
        };

        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if validate_token(http, probe_url, probe_timeout, token).await {
                return Ok(token.clone());
            }
            debug!("Cached token rejected by {}", identity_host);
        }

        let token = issue_token(issuer.as_ref(), identity_host).await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Probe the identity host with `token`; only HTTP 200 counts as valid.
async fn validate_token(
    http: &reqwest::Client,
    probe_url: &str,
    timeout: Duration,
    token: &BearerToken,
) -> bool {
    match http
        .get(probe_url)
        .bearer_auth(token.as_str())
        .timeout(timeout)
        .send()
        .await
    {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(e) => {
            debug!("Token validation probe failed: {}", e);
            false
        }
    }
}

async fn issue_token(
    issuer: &dyn TokenIssuer,
    identity_host: &str,
) -> Result<BearerToken, AuthError> {
    match issuer.fetch_token().await {
        Ok(token) => Ok(token),
        Err(e) => {
            debug!("Direct token fetch failed: {}", e);
            info!("Getting fresh OAuth token for {}...", identity_host);

            let token = async {
                issuer.login().await?;
                issuer.fetch_token().await
            }
            .await
            .map_err(|e| {
                warn!("Authentication against {} failed: {}", identity_host, e);
                AuthError::LoginFailed(Box::new(e))
            })?;

            info!("OAuth authentication successful");
            Ok(token)
        }
    }
}
