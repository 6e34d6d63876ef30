//! Hop chain construction and teardown.
//!
//! A chain is built by dialing hop 0 directly and every later hop through
//! the session of the one before it:
//!
//! ```text
//! local ──tcp──> hop0 ──channel──> hop1 ──channel──> ... ──channel──> hopN-1
//! ```
//!
//! The final session is the chain's usable endpoint. Every session,
//! intermediate or final, is owned by the chain's [`HopCloser`] so a single
//! close releases the whole path.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{debug, info, warn};

use crate::error::TunnelError;
use crate::hop::HopSpec;
use crate::transport::{HopConnector, HopSession};

static NEXT_CHAIN_ID: AtomicU64 = AtomicU64::new(1);

/// Owns every hop session of one chain, in dial order.
pub struct HopCloser<S: HopSession> {
    hops: Vec<Arc<S>>,
    closed: AtomicBool,
}

impl<S: HopSession> HopCloser<S> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            hops: Vec::with_capacity(capacity),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&mut self, hop: S) {
        self.hops.push(Arc::new(hop));
    }

    fn last(&self) -> Option<&S> {
        self.hops.last().map(Arc::as_ref)
    }

    fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every hop, deepest first.
    ///
    /// Each hop is closed even if an earlier close failed or panicked. The
    /// first error is returned; later ones are only logged. Calling this
    /// more than once is a no-op.
    pub async fn close(&self) -> Result<(), TunnelError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        close_all(&self.hops).await
    }
}

async fn close_all<S: HopSession>(hops: &[Arc<S>]) -> Result<(), TunnelError> {
    let mut first_err = None;
    for (index, hop) in hops.iter().enumerate().rev() {
        let err = match AssertUnwindSafe(hop.close()).catch_unwind().await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(_) => TunnelError::Close(format!("hop {index} panicked while closing")),
        };
        debug!(hop = index, error = %err, "hop close failed");
        first_err.get_or_insert(err);
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl<S: HopSession> Drop for HopCloser<S> {
    // A chain that was superseded but never explicitly closed is released
    // once its last user lets go of it.
    fn drop(&mut self) {
        if self.hops.is_empty() || *self.closed.get_mut() {
            return;
        }
        let hops = std::mem::take(&mut self.hops);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = close_all(&hops).await {
                        debug!(error = %e, "failed to close released chain");
                    }
                });
            }
            Err(_) => debug!(hops = hops.len(), "no runtime to close released chain"),
        }
    }
}

/// The live end of a fully dialed chain plus the closer for all its hops.
pub struct ChainHandle<S: HopSession> {
    id: u64,
    closer: HopCloser<S>,
}

impl<S: HopSession> ChainHandle<S> {
    fn new(closer: HopCloser<S>) -> Self {
        Self {
            id: NEXT_CHAIN_ID.fetch_add(1, Ordering::Relaxed),
            closer,
        }
    }

    /// Process-unique id, used in log fields.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The final hop's session, used to open channels to destinations.
    pub fn endpoint(&self) -> &S {
        // never empty: a handle is only created from a complete build
        &self.closer.hops[self.closer.hops.len() - 1]
    }

    /// Number of hops in the chain.
    pub fn hops(&self) -> usize {
        self.closer.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    /// Close every hop of the chain. See [`HopCloser::close`].
    pub async fn close(&self) -> Result<(), TunnelError> {
        self.closer.close().await
    }
}

/// Builds complete hop chains from a fixed [`HopSpec`].
pub struct ChainBuilder<C: HopConnector> {
    connector: C,
    hops: Arc<HopSpec>,
    credentials: Vec<C::Credential>,
    connect_timeout: Option<Duration>,
}

impl<C: HopConnector> ChainBuilder<C> {
    /// `credentials[i]` authenticates on hop `i`.
    pub fn new(
        connector: C,
        hops: Arc<HopSpec>,
        credentials: Vec<C::Credential>,
        connect_timeout: Option<Duration>,
    ) -> Self {
        Self {
            connector,
            hops,
            credentials,
            connect_timeout,
        }
    }

    pub fn hops(&self) -> &HopSpec {
        &self.hops
    }

    /// Dial every hop in order and return the finished chain.
    ///
    /// On failure at hop *i*, hops *0..i* that were already established are
    /// closed before the error (tagged with hop *i*'s address) is returned,
    /// and no later hop is attempted.
    pub async fn build(&self) -> Result<ChainHandle<C::Session>, TunnelError> {
        let hops = self.hops.hops();
        if hops.is_empty() {
            return Err(TunnelError::Config("no addresses provided".into()));
        }
        if hops.len() != self.credentials.len() {
            return Err(TunnelError::Config(format!(
                "{} hops but {} credentials",
                hops.len(),
                self.credentials.len()
            )));
        }

        let mut closer = HopCloser::with_capacity(hops.len());

        for (index, (hop, credential)) in hops.iter().zip(&self.credentials).enumerate() {
            info!(hop = index, addr = %hop.addr, user = %hop.user, "establishing hop connection");

            let result = match closer.last() {
                None => {
                    self.connector
                        .connect(hop, credential, self.connect_timeout)
                        .await
                }
                Some(proxy) => self.connector.connect_via(proxy, hop, credential).await,
            };

            match result {
                Ok(session) => closer.push(session),
                Err(e) => {
                    warn!(hop = index, addr = %hop.addr, error = %e, "failed to connect hop");
                    if let Err(close_err) = closer.close().await {
                        debug!(error = %close_err, "error while unwinding partial chain");
                    }
                    return Err(TunnelError::Hop {
                        index,
                        addr: hop.addr.to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }

        let handle = ChainHandle::new(closer);
        info!(
            chain = handle.id(),
            addr = %self.hops.last().addr,
            hops = handle.hops(),
            "connected to final hop"
        );
        Ok(handle)
    }
}
