//! Credential helper invoked as a subprocess.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{BearerToken, TokenIssuer};
use crate::config::AuthSettings;
use crate::error::AuthError;

/// Output of `<helper> auth token`.
#[derive(Debug, Deserialize)]
struct TokenOutput {
    access_token: Option<String>,
}

/// Runs `<command...> auth token --host <host>` and
/// `<command...> auth login --host <host>`.
///
/// Both stdout and stderr are captured: stdout of this process carries the
/// JSON-RPC stream and must never see helper output.
#[derive(Debug, Clone)]
pub struct CliTokenIssuer {
    program: String,
    args: Vec<String>,
    host: String,
    timeout: Duration,
}

impl CliTokenIssuer {
    pub fn new(
        command: &[String],
        host: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let (program, args) = command.split_first().ok_or(AuthError::NoCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            host: host.into(),
            timeout,
        })
    }

    pub fn from_settings(settings: &AuthSettings, host: &str) -> Result<Self, AuthError> {
        Self::new(&settings.command, host, settings.command_timeout)
    }

    /// Run `auth <action> --host <host>` and return its stdout.
    async fn run(&self, action: &str) -> Result<Vec<u8>, AuthError> {
        debug!("Running credential helper: {} auth {}", self.program, action);

        let child = Command::new(&self.program)
            .args(&self.args)
            .args(["auth", action, "--host", &self.host])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AuthError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AuthError::Timeout {
                action: action.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| AuthError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(AuthError::CommandFailed {
                action: action.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl TokenIssuer for CliTokenIssuer {
    async fn fetch_token(&self) -> Result<BearerToken, AuthError> {
        let stdout = self.run("token").await?;
        let output: TokenOutput = serde_json::from_slice(&stdout)?;
        match output.access_token {
            Some(token) if !token.is_empty() => Ok(BearerToken::new(token)),
            _ => Err(AuthError::MissingToken),
        }
    }

    async fn login(&self) -> Result<(), AuthError> {
        self.run("login").await.map(|_| ())
    }
}
