use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use parlor::api::{self, AppState};
use parlor::auth::AuthState;
use parlor::paths::Paths;
use parlor::upstream::UpstreamClient;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common);

    match cli.command {
        Command::Serve(cmd) => async_serve(cmd),
    }
}

#[tokio::main]
async fn async_serve(cmd: ServeCommand) -> Result<()> {
    handle_serve(cmd).await
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Parlor - HTTP gateway for a conversational AI backend.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Emit logs as machine readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP gateway
    Serve(ServeCommand),
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,
    /// Base URL of the upstream SDK service
    #[arg(long, default_value = "http://localhost:8080")]
    upstream_url: String,
    /// Override the session base directory (defaults to CLAUDE_BASE_DIR, then ~/.claude)
    #[arg(long, value_name = "PATH")]
    base_dir: Option<PathBuf>,
}

fn init_logging(common: &CommonOpts) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = if common.quiet {
        "error"
    } else {
        match common.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parlor={level},tower_http={level}")));

    if common.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_ansi(io::stderr().is_terminal()))
            .try_init()
            .ok();
    }
}

async fn handle_serve(cmd: ServeCommand) -> Result<()> {
    let paths = cmd
        .base_dir
        .map(Paths::with_base)
        .unwrap_or_else(Paths::from_env);
    info!(base = %paths.base().display(), "session base directory");

    let auth = AuthState::from_env();
    if auth.is_dev_mode() {
        warn!("API_KEY not set, mutating endpoints are open (dev mode)");
    }

    let upstream = UpstreamClient::new(&cmd.upstream_url);
    info!(upstream = %cmd.upstream_url, "upstream SDK service");

    let state = AppState::new(paths, upstream, auth);
    let app = api::create_router(state);

    let addr: SocketAddr = format!("{}:{}", cmd.host, cmd.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cmd.host, cmd.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
