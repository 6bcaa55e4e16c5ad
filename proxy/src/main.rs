//! mcp-tunnel entry point.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use mcp_tunnel::{
    build_forwarder,
    config::{Config, ConfigOverrides},
    logging,
    transport::{self, LoopExit},
};

/// MCP proxy: bridges a stdio MCP client to a remote MCP server over HTTP/SSE
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    after_help = "Examples:\n  \
        # Connect to a local development server\n  \
        mcp-tunnel --identity-host https://workspace.cloud.databricks.com --app-url http://localhost:8000\n\n  \
        # Connect to a deployed app\n  \
        mcp-tunnel --identity-host https://workspace.cloud.databricks.com --app-url https://myapp.databricksapps.com"
)]
struct Args {
    /// Identity host used to issue and validate tokens (e.g. https://workspace.cloud.databricks.com)
    #[arg(long, alias = "databricks-host", env = "MCP_TUNNEL_IDENTITY_HOST")]
    identity_host: Option<String>,

    /// Remote app URL; `/mcp/` is appended when missing
    #[arg(long, alias = "databricks-app-url", env = "MCP_TUNNEL_APP_URL")]
    app_url: Option<String>,

    /// Extra TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Timeout in seconds for calls to the remote endpoint
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Fail requests when any handshake step fails instead of continuing
    #[arg(long)]
    strict_handshake: bool,

    /// Log level (trace, debug, info, warn, error); overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(args));

    // A blocking stdin read cannot be cancelled; don't wait for it.
    runtime.shutdown_background();
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::from_figment(ConfigOverrides {
        config_file: args.config,
        url: args.app_url,
        identity_host: args.identity_host,
        request_timeout_secs: args.request_timeout,
        strict_handshake: args.strict_handshake,
        log_file: args.log_file,
        log_level: args.log_level,
    })?;

    let _log_guard = logging::init(config.log_level.as_deref(), config.log_file.as_deref())?;

    let forwarder = build_forwarder(&config)?;
    info!("Connected to MCP server at: {}", config.endpoint.url());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    match transport::run(&forwarder, stdin, stdout, shutdown).await {
        Ok(LoopExit::Eof) => info!("Input closed, exiting"),
        Ok(LoopExit::Interrupted) => {}
        Ok(LoopExit::Fatal) => error!("Proxy loop stopped after a fatal input error"),
        Err(e) => error!("Failed to write to stdout: {}", e),
    }

    Ok(())
}
