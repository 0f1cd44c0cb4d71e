use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use miniagent::config::{LogFormat, PlatformConfig};
use miniagent::http::{AppState, HttpServer};
use miniagent::ratelimit::{build_backend, RateLimiter};

#[derive(Debug, Parser)]
#[command(name = "miniagent", version, about = "Multi-tenant AI agent execution gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP gateway
    Serve {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the listen address
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },
    /// Print the effective configuration
    Config {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve {
        config: None,
        bind: None,
    }) {
        Command::Serve { config, bind } => serve(config, bind).await,
        Command::Config { config } => {
            let config = PlatformConfig::load(config.as_deref())?;
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

async fn serve(path: Option<PathBuf>, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    // Load configuration (file, then environment overrides)
    let mut config = PlatformConfig::load(path.as_deref())?;
    if let Some(bind) = bind {
        config.server.http_addr = bind;
    }

    // Initialize tracing
    init_tracing(config.logging.format);

    info!("Starting Mini Agent Platform gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        requests = config.rate_limit.requests,
        window_seconds = config.rate_limit.window_seconds,
        backend = ?config.rate_limit.backend,
        "Configuration loaded"
    );

    // Connect the rate limit store before accepting traffic
    let backend = build_backend(&config.rate_limit).await.map_err(|e| {
        error!(error = %e, "Rate limit backend unavailable at startup");
        e
    })?;
    let rate_limiter = Arc::new(RateLimiter::from_config(backend, &config.rate_limit)?);
    info!("Rate limiter initialized");

    // Create and start the HTTP server
    let state = AppState::from_config(&config, rate_limiter.clone());
    let server = HttpServer::new(config.server.http_addr, state);

    // Run the server with graceful shutdown on Ctrl+C or SIGTERM
    let result = server.serve_with_shutdown(shutdown_signal()).await;

    rate_limiter.close().await;
    info!("Mini Agent Platform gateway stopped");
    Ok(result?)
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
