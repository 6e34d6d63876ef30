//! CLI module for the tunnel.

use std::io;
use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TunnelConfig;

/// CLI arguments for the tunnel.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "hopchain",
    version,
    about = "Forward a local TCP port to a remote address through a chain of SSH hops"
)]
pub struct TunnelArgs {
    /// Optional config file path (toml). Flags and environment override it.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SSH hosts to chain through, e.g. user@jump1,user@jump2:2222
    #[arg(long = "sshhost", env = "SSHHOST")]
    pub ssh_host: Option<String>,

    /// SSH private key file used on every hop
    #[arg(long = "sshkey", env = "SSHKEY")]
    pub ssh_key: Option<PathBuf>,

    /// Local address to listen on, e.g. 127.0.0.1:8080
    #[arg(long = "localaddr", env = "LOCALADDR")]
    pub local_addr: Option<String>,

    /// Remote address to forward to, as seen from the last hop
    #[arg(long = "remoteaddr", env = "REMOTEADDR")]
    pub remote_addr: Option<String>,

    /// Timeout for dialing the first hop (seconds, 0 = none)
    #[arg(long)]
    pub connect_timeout_secs: Option<u64>,

    /// Rebuild the chain every N forwarded sessions (0 = never)
    #[arg(long)]
    pub reconnect_every: Option<u64>,

    /// Log level override (e.g. "info", "debug", "trace").
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Merge flags and environment over `config`.
pub fn apply_overrides(config: &mut TunnelConfig, args: &TunnelArgs) {
    if let Some(v) = &args.ssh_host {
        config.ssh.hosts = v.clone();
    }
    if let Some(v) = &args.ssh_key {
        config.ssh.key = v.clone();
    }
    if let Some(v) = &args.local_addr {
        config.local_addr = v.clone();
    }
    if let Some(v) = &args.remote_addr {
        config.remote_addr = v.clone();
    }
    if let Some(v) = args.connect_timeout_secs {
        config.timeouts.connect_timeout_secs = v;
    }
    if let Some(v) = args.reconnect_every {
        config.reconnect.every_sessions = v;
    }
    if let Some(v) = &args.log_level {
        config.log_level = Some(v.clone());
    }
}

/// Run the tunnel with the given CLI arguments.
pub async fn run(args: TunnelArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => TunnelConfig::load(path)?,
        None => TunnelConfig::default(),
    };
    apply_overrides(&mut config, &args);

    init_tracing(config.log_level.as_deref());
    info!(
        version = hopchain_core::VERSION,
        "starting {}",
        hopchain_core::PROJECT_NAME
    );

    let validated = config.validate().inspect_err(|e| {
        error!(error = %e, "invalid configuration");
    })?;

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    crate::listener::run(validated, shutdown).await.map_err(|e| {
        if e.is_fatal() {
            error!(error = %e, error_type = e.error_type(), "fatal startup error");
        }
        Box::new(e) as Box<dyn std::error::Error>
    })
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing(level: Option<&str>) {
    let level = level.unwrap_or(hopchain_core::DEFAULT_LOG_LEVEL);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}
