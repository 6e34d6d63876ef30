//! Per-connection forwarding through the shared chain.

use std::sync::Arc;
use std::time::Duration;

use hopchain_core::io::relay_bidirectional;
use tracing::{debug, info, warn};

use crate::error::TunnelError;
use crate::hop::Endpoint;
use crate::manager::{ChainManager, SharedChain};
use crate::transport::{HopConnector, HopSession, TransportStream};

/// Relay tuning for forwarding sessions.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// End a session after this long without traffic; `None` never does.
    pub idle_timeout: Option<Duration>,
    /// Read buffer size per direction.
    pub buffer_size: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            buffer_size: hopchain_core::DEFAULT_RELAY_BUFFER_SIZE,
        }
    }
}

/// Forward one accepted local connection to `remote` through the chain.
///
/// If the chain cannot be obtained the session ends. If the chain is
/// obtained but the channel to `remote` cannot be opened, the chain is
/// rebuilt once and the open retried once against the new chain. The local
/// connection is closed whenever this returns.
pub async fn forward<C, L>(
    manager: &Arc<ChainManager<C>>,
    local: L,
    remote: &Endpoint,
    settings: &RelaySettings,
) -> Result<(), TunnelError>
where
    C: HopConnector,
    L: TransportStream,
{
    let chain = manager.acquire().await.map_err(|e| {
        warn!(error = %e, error_type = e.error_type(), "unable to obtain chain");
        e
    })?;

    let opened = chain.endpoint().open_channel(remote).await;
    let (chain, channel) = match opened {
        Ok(channel) => (chain, channel),
        Err(e) => {
            warn!(chain = chain.id(), remote = %remote, error = %e, "failed to dial remote, attempting to reconnect");
            drop(chain);
            open_after_rebuild(manager, remote).await?
        }
    };

    manager.session_started();

    debug!(chain = chain.id(), remote = %remote, "channel open, relaying");
    let result = relay_bidirectional(local, channel, settings.idle_timeout, settings.buffer_size).await;
    // keep the chain referenced until the relay ends
    drop(chain);

    match result {
        Ok(stats) => {
            info!(up = stats.upstream, down = stats.downstream, "session closed");
            Ok(())
        }
        Err(e) => {
            warn!(
                direction = %e.direction,
                up = e.stats.upstream,
                down = e.stats.downstream,
                error = %e.source,
                "failed to copy stream"
            );
            Err(e.into())
        }
    }
}

async fn open_after_rebuild<C: HopConnector>(
    manager: &Arc<ChainManager<C>>,
    remote: &Endpoint,
) -> Result<(SharedChain<C>, <C::Session as HopSession>::Stream), TunnelError> {
    let chain = manager.force_rebuild().await.map_err(|e| {
        warn!(error = %e, error_type = e.error_type(), "reconnect failed");
        e
    })?;

    let opened = chain.endpoint().open_channel(remote).await;
    match opened {
        Ok(channel) => Ok((chain, channel)),
        Err(e) => {
            warn!(chain = chain.id(), remote = %remote, error = %e, "failed to dial remote (final)");
            Err(e)
        }
    }
}
