//! Configuration management.

use anyhow::{bail, Context};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use mcp_tunnel_types::mcp::MCP_PATH;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix for environment variable overrides (`MCP_TUNNEL_REMOTE__URL`, ...).
pub const ENV_PREFIX: &str = "MCP_TUNNEL_";

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = ".mcp-tunnel.toml";

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    remote: RemoteConfig,
    #[serde(default)]
    auth: AuthConfig,
    #[serde(default)]
    session: SessionConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RemoteConfig {
    url: Option<String>,
    identity_host: Option<String>,
    #[serde(default = "default_request_timeout")]
    request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            identity_host: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthConfig {
    #[serde(default = "default_command")]
    command: Vec<String>,
    #[serde(default = "default_command_timeout")]
    command_timeout_secs: u64,
    #[serde(default = "default_probe_path")]
    probe_path: String,
    #[serde(default = "default_probe_timeout")]
    probe_timeout_secs: u64,
    #[serde(default = "default_local_token")]
    local_token: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            command_timeout_secs: default_command_timeout(),
            probe_path: default_probe_path(),
            probe_timeout_secs: default_probe_timeout(),
            local_token: default_local_token(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SessionConfig {
    #[serde(default)]
    strict_handshake: bool,
    #[serde(default)]
    recover_expired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Path to log file (if set, logs are written there in addition to stderr)
    log_file: Option<PathBuf>,
    /// Log level; if not set, RUST_LOG or "info" is used
    log_level: Option<String>,
}

fn default_request_timeout() -> u64 {
    120
}

fn default_command() -> Vec<String> {
    vec!["uvx".to_string(), "databricks".to_string()]
}

fn default_command_timeout() -> u64 {
    300
}

fn default_probe_path() -> String {
    "/api/2.0/preview/scim/v2/Me".to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_local_token() -> String {
    "local-test-token".to_string()
}

/// The resolved remote MCP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    url: Url,
    is_local: bool,
}

impl EndpointConfig {
    /// Normalize `raw` to end in the MCP path and classify it as local or remote.
    pub fn new(raw: &str) -> anyhow::Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            bail!("URL argument is required");
        }

        let normalized = normalize_mcp_url(raw);
        let url = Url::parse(&normalized)
            .with_context(|| format!("Invalid MCP endpoint URL: {}", normalized))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            bail!("Unsupported URL scheme `{}` in {}", url.scheme(), url);
        }

        let is_local = url.host_str().map(is_loopback_host).unwrap_or(false);
        Ok(Self { url, is_local })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the endpoint is on this machine (no real authentication).
    pub fn is_local(&self) -> bool {
        self.is_local
    }
}

/// Append the canonical MCP path segment unless the URL already ends in it.
pub fn normalize_mcp_url(url: &str) -> String {
    if url.ends_with(MCP_PATH) {
        url.to_string()
    } else if url.ends_with("/mcp") {
        format!("{}/", url)
    } else if url.ends_with('/') {
        format!("{}{}", url, &MCP_PATH[1..])
    } else {
        format!("{}{}", url, MCP_PATH)
    }
}

/// Normalize the identity host: default to https and drop trailing slashes.
pub fn normalize_identity_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    // IPv6 hosts come bracketed from Url::host_str
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    bare.parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

/// Credential settings.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Credential helper program followed by its leading arguments
    pub command: Vec<String>,
    pub command_timeout: Duration,
    pub probe_path: String,
    pub probe_timeout: Duration,
    /// Token used for loopback endpoints
    pub local_token: String,
}

/// Session handshake settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSettings {
    pub strict_handshake: bool,
    pub recover_expired: bool,
}

/// Values supplied on the command line; they take precedence over everything else.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub url: Option<String>,
    pub identity_host: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub strict_handshake: bool,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: EndpointConfig,
    /// Identity host used for token issuance and validation
    pub identity_host: String,
    /// Bound for every call to the remote endpoint
    pub request_timeout: Duration,
    pub auth: AuthSettings,
    pub session: SessionSettings,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with full priority chain: CLI args > env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `config.toml` in the user config directory (~/.config/mcp-tunnel/ on Linux)
    /// 2. `.mcp-tunnel.toml` in the current directory
    /// 3. the file given with `--config`
    pub fn from_figment(overrides: ConfigOverrides) -> anyhow::Result<Self> {
        let local_config = std::env::current_dir()
            .ok()
            .map(|d| d.join(LOCAL_CONFIG_FILE));
        let user_config = directories::ProjectDirs::from("", "", "mcp-tunnel")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile::default()));

        if let Some(ref path) = user_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        if let Some(ref path) = local_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        if let Some(ref path) = overrides.config_file {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(ref url) = overrides.url {
            figment = figment.merge(Serialized::default("remote.url", url));
        }
        if let Some(ref host) = overrides.identity_host {
            figment = figment.merge(Serialized::default("remote.identity_host", host));
        }
        if let Some(secs) = overrides.request_timeout_secs {
            figment = figment.merge(Serialized::default("remote.request_timeout_secs", secs));
        }
        if overrides.strict_handshake {
            figment = figment.merge(Serialized::default("session.strict_handshake", true));
        }
        if let Some(ref path) = overrides.log_file {
            figment = figment.merge(Serialized::default("logging.log_file", path));
        }
        if let Some(ref level) = overrides.log_level {
            figment = figment.merge(Serialized::default("logging.log_level", level));
        }

        let config_file: ConfigFile = figment.extract()?;
        Self::from_file(config_file)
    }

    fn from_file(file: ConfigFile) -> anyhow::Result<Self> {
        let endpoint = EndpointConfig::new(file.remote.url.as_deref().unwrap_or_default())?;

        let identity_host = match file.remote.identity_host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => normalize_identity_host(host),
            _ => bail!("Identity host argument is required"),
        };

        if file.auth.command.is_empty() {
            bail!("auth.command must name a credential helper program");
        }

        Ok(Self {
            endpoint,
            identity_host,
            request_timeout: Duration::from_secs(file.remote.request_timeout_secs),
            auth: AuthSettings {
                command: file.auth.command,
                command_timeout: Duration::from_secs(file.auth.command_timeout_secs),
                probe_path: file.auth.probe_path,
                probe_timeout: Duration::from_secs(file.auth.probe_timeout_secs),
                local_token: file.auth.local_token,
            },
            session: SessionSettings {
                strict_handshake: file.session.strict_handshake,
                recover_expired: file.session.recover_expired,
            },
            log_file: file.logging.log_file,
            log_level: file.logging.log_level,
        })
    }
}
