use std::{net::IpAddr, sync::Arc, time::Duration};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mcp_console::{ConsoleServerConfig, SessionRegistry, cli};

#[derive(Debug, Parser)]
#[command(name = "mcp-console", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "MCP_CONSOLE_PORT", default_value_t = 8080)]
    port: u16,

    /// Mount point for the transport.
    #[arg(long, default_value = "/mcp")]
    path: String,

    /// Require `Authorization: Bearer <token>` on every request.
    #[arg(long, env = "MCP_CONSOLE_AUTH_TOKEN")]
    auth_token: Option<String>,

    /// Seconds of idle time between SSE heartbeat frames.
    #[arg(long, default_value_t = 15)]
    heartbeat: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let ct = CancellationToken::new();
    let registry = SessionRegistry::new();
    let config = ConsoleServerConfig {
        bind: (args.host, args.port).into(),
        path: args.path,
        auth_token: args.auth_token,
        sse_keep_alive: Duration::from_secs(args.heartbeat),
        ct: ct.clone(),
    };
    let auth_enabled = config.auth_token.is_some();
    let path = config.path.clone();

    let bind = mcp_console::serve(registry.clone(), config).await?;
    tracing::info!(%bind, path = %path, auth = auth_enabled, "console listening");

    cli::run(Arc::clone(&registry), ct).await;
    Ok(())
}
