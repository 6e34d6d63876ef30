//! Ownership of the single shared hop chain.
//!
//! Every forwarding session asks the manager for the current chain. The
//! manager either hands back the installed chain (after a liveness probe)
//! or builds a new one. Failure recovery and the periodic refresh go
//! through [`ChainManager::force_rebuild`], which builds outside the lock
//! and only takes it for the swap.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::{ChainBuilder, ChainHandle};
use crate::error::TunnelError;
use crate::hop::HopSpec;
use crate::probe::is_alive;
use crate::scheduler::ReconnectScheduler;
use crate::transport::HopConnector;

/// Shared reference to an installed chain.
pub type SharedChain<C> = Arc<ChainHandle<<C as HopConnector>::Session>>;

pub struct ChainManager<C: HopConnector> {
    builder: ChainBuilder<C>,
    current: Mutex<Option<SharedChain<C>>>,
    scheduler: ReconnectScheduler,
    shutdown: CancellationToken,
}

impl<C: HopConnector> ChainManager<C> {
    pub fn new(
        builder: ChainBuilder<C>,
        scheduler: ReconnectScheduler,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            builder,
            current: Mutex::new(None),
            scheduler,
            shutdown,
        }
    }

    pub fn hops(&self) -> &HopSpec {
        self.builder.hops()
    }

    /// Return the current chain if it answers a probe, otherwise build and
    /// install a new one.
    ///
    /// The lock is held for the probe and for the whole rebuild. A failed
    /// rebuild leaves no chain installed, so the next call starts from
    /// scratch.
    pub async fn acquire(&self) -> Result<SharedChain<C>, TunnelError> {
        let mut current = self.current.lock().await;

        if is_alive(current.as_deref()).await {
            if let Some(chain) = current.as_ref() {
                return Ok(chain.clone());
            }
        }

        match self.builder.build().await {
            Ok(chain) => {
                let chain = Arc::new(chain);
                *current = Some(chain.clone());
                Ok(chain)
            }
            Err(e) => {
                *current = None;
                Err(e)
            }
        }
    }

    /// Build a new chain unconditionally and install it.
    ///
    /// The installed chain is only replaced on success. The replaced chain
    /// is not closed here: sessions still pumping through it keep it alive,
    /// and it is released when the last of them finishes.
    pub async fn force_rebuild(&self) -> Result<SharedChain<C>, TunnelError> {
        let chain = Arc::new(self.builder.build().await?);

        let previous = {
            let mut current = self.current.lock().await;
            current.replace(chain.clone())
        };
        if let Some(previous) = previous {
            debug!(old = previous.id(), new = chain.id(), "replaced chain");
        }
        Ok(chain)
    }

    /// Count one forwarding session and trigger a background rebuild when
    /// the refresh cadence is reached.
    pub fn session_started(self: &Arc<Self>) {
        if !self.scheduler.record() {
            return;
        }
        if self.shutdown.is_cancelled() {
            debug!("shutting down, skipping scheduled reconnect");
            return;
        }

        info!(
            sessions = self.scheduler.sessions(),
            every = self.scheduler.every(),
            "scheduling reconnect"
        );
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.force_rebuild().await {
                warn!(error = %e, error_type = e.error_type(), "scheduled reconnect failed");
            }
        });
    }

    /// Build the first chain in the background so the first client does not
    /// pay for it.
    pub fn warm_up(self: &Arc<Self>) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.acquire().await {
                warn!(error = %e, error_type = e.error_type(), "initial chain build failed");
            }
        });
    }

    /// Snapshot of the installed chain.
    pub async fn current(&self) -> Option<SharedChain<C>> {
        self.current.lock().await.clone()
    }

    /// Sessions recorded by the refresh scheduler.
    pub fn sessions(&self) -> u64 {
        self.scheduler.sessions()
    }

    /// Stop scheduling background work.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
