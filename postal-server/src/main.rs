//! postal-server - parses postal addresses into labeled components over HTTP.
//!
//! Startup order: logging, configuration, lifecycle, bind, signal handlers,
//! serve. A bind failure is fatal and exits with status 1. After a stop
//! signal the process drains in-flight work for up to 10 seconds and exits 0.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use postal_core::config::ServerConfig;
use postal_core::lifecycle::{DrainResult, LifecycleConfig, LifecycleManager};
use postal_core::{AddressParser, RuleBasedParser};
use postal_server::PostalServer;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Command line overrides. Unset flags fall back to `POSTAL_SERVER_*`
/// environment variables, then to built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "postal-server", version, about)]
struct Cli {
    /// Interface to bind (default: 0.0.0.0)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (default: 4001)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    // The guard flushes buffered log lines when main returns.
    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()?;

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration, refusing to start");
        return Ok(ExitCode::FAILURE);
    }

    let shutdown = CancellationToken::new();
    let lifecycle = Arc::new(LifecycleManager::new(
        LifecycleConfig::default(),
        shutdown.clone(),
    ));
    let parser: Arc<dyn AddressParser> = Arc::new(RuleBasedParser::new());

    let server = match PostalServer::bind(&config, parser, lifecycle).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, addr = %config.bind_string(), "Failed to start postal server");
            return Ok(ExitCode::FAILURE);
        }
    };

    setup_signal_handlers(shutdown);

    match server.run().await {
        DrainResult::Complete => info!("All connections drained, shutting down cleanly"),
        DrainResult::Timeout { remaining } => {
            warn!(remaining, "Forced shutdown after drain timeout")
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Cancel `shutdown` on SIGINT, and on SIGTERM where available.
fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                shutdown_sigint.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown");
                shutdown.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
            }
        }
    });

    #[cfg(not(unix))]
    let _ = shutdown;
}
