//! pcpd - PCP forwarder daemon
//!
//! Serves the local UI and forwards its commands to a desk phone's web API.
//!
//! Usage:
//!   pcpd [OPTIONS]
//!
//! Configuration is read from `--config`, else from
//! `<config dir>/pcpd/config.toml` when it exists. Command-line options
//! override file values.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pcp_bridge::{
    create_router, ConsoleConfirmer, Confirmer, FixedConfirmer, HostState, MessageBridge,
    RequestLogger, Verbosity,
};
use pcp_client::{ClientFactory, ClientHandle, Forwarder};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, ConfirmMode, Overrides};

#[derive(Parser)]
#[command(name = "pcpd")]
#[command(author, version, about = "PCP desk-phone request forwarder")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PCPD_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on [default: 127.0.0.1:18090]
    #[arg(short, long, env = "PCPD_LISTEN")]
    listen: Option<SocketAddr>,

    /// Directory holding index.html and the rest of the UI
    #[arg(long, env = "PCPD_CONTENT_ROOT")]
    content_root: Option<PathBuf>,

    /// Request log file
    #[arg(long, env = "PCPD_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// How reboot confirmations are answered [default: console]
    #[arg(long, value_enum, env = "PCPD_CONFIRM")]
    confirm: Option<ConfirmMode>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            listen: self.listen,
            content_root: self.content_root.clone(),
            log_file: self.log_file.clone(),
            confirm: self.confirm,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pcpd=info,pcp_bridge=info,pcp_client=info".into()),
        )
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading config");
            Config::load_from(path)?
        }
        None => Config::load()?,
    };
    let exe = std::env::current_exe().context("Could not locate the executable")?;
    let exe_dir = exe
        .parent()
        .context("Executable has no parent directory")?;
    let config = file.merge_with_args(&cli.overrides(), exe_dir)?;

    tracing::info!(
        content_root = %config.content_root.display(),
        log = %config.log_path.display(),
        confirm = ?config.confirm,
        "Starting pcpd"
    );

    let verbosity = Verbosity::default();
    let logger = Arc::new(RequestLogger::new(&config.log_path, verbosity.clone()));
    let clients = Arc::new(
        ClientHandle::new(ClientFactory::new()).context("Failed to build HTTP client")?,
    );
    let forwarder = Forwarder::new(clients, logger.clone());
    let confirmer: Arc<dyn Confirmer> = match config.confirm {
        ConfirmMode::Console => Arc::new(ConsoleConfirmer::console()),
        ConfirmMode::Deny => Arc::new(FixedConfirmer(false)),
    };
    let bridge = MessageBridge::new(forwarder, confirmer, verbosity);
    let app = create_router(HostState::new(bridge, logger.stream(), &config.content_root));

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    tracing::info!("Listening on http://{}", config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "pcpd",
            "--listen",
            "127.0.0.1:9999",
            "--confirm",
            "deny",
            "--log-file",
            "/tmp/pcp.log",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.listen, Some("127.0.0.1:9999".parse().unwrap()));
        assert_eq!(overrides.confirm, Some(ConfirmMode::Deny));
        assert_eq!(overrides.log_file, Some(PathBuf::from("/tmp/pcp.log")));
        assert!(overrides.content_root.is_none());
    }
}
