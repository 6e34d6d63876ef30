//! Local listener and process lifecycle.
//!
//! `run` wires a validated configuration into the SSH connector, the chain
//! manager and the accept loop. `serve` is the accept loop itself and is
//! generic over the hop transport so it can be driven by any connector.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::chain::ChainBuilder;
use crate::config::ValidatedConfig;
use crate::credential::{credentials_for, load_private_key};
use crate::error::TunnelError;
use crate::forward::{forward, RelaySettings};
use crate::hop::Endpoint;
use crate::manager::ChainManager;
use crate::scheduler::ReconnectScheduler;
use crate::transport::HopConnector;
use crate::transport::ssh::SshConnector;

/// Run the tunnel until `shutdown` is cancelled.
pub async fn run(config: ValidatedConfig, shutdown: CancellationToken) -> Result<(), TunnelError> {
    let key = load_private_key(&config.key)?;
    info!(path = ?config.key, "loaded private key");

    let connector = SshConnector::new(&config.ssh);
    let credentials = credentials_for(&config.hops, key);
    let builder = ChainBuilder::new(connector, config.hops.clone(), credentials, config.connect_timeout);
    let manager = Arc::new(ChainManager::new(
        builder,
        ReconnectScheduler::new(config.reconnect_every),
        shutdown.child_token(),
    ));
    manager.warm_up();

    let listener = TcpListener::bind(&config.local_addr).await.map_err(|e| {
        TunnelError::Config(format!("unable to listen on {}: {e}", config.local_addr))
    })?;

    serve(listener, manager, config.remote, config.relay, shutdown).await
}

/// Accept local connections and forward each one until `shutdown` fires.
///
/// Sessions already running when `shutdown` fires are left to finish on
/// their own.
pub async fn serve<C: HopConnector>(
    listener: TcpListener,
    manager: Arc<ChainManager<C>>,
    remote: Endpoint,
    settings: RelaySettings,
    shutdown: CancellationToken,
) -> Result<(), TunnelError> {
    let local_addr = listener.local_addr()?;
    let remote = Arc::new(remote);
    let settings = Arc::new(settings);
    info!(hops = %manager.hops(), "forwarding {local_addr} -> {remote}");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("shutting down");
                manager.shutdown();
                return Ok(());
            }
            accept_result = listener.accept() => {
                let (stream, peer_addr) = match accept_result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "unable to accept connection");
                        continue;
                    }
                };
                let _ = stream.set_nodelay(true);

                let manager = manager.clone();
                let remote = remote.clone();
                let settings = settings.clone();

                tokio::spawn(
                    async move {
                        if let Err(e) = forward(&manager, stream, &remote, &settings).await {
                            info!(error = %e, error_type = e.error_type(), "session ended with error");
                        }
                    }
                    .instrument(info_span!("session", peer = %peer_addr)),
                );
            }
        }
    }
}
