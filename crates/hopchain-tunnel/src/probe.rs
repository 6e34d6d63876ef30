//! Chain liveness probing.

use tracing::{debug, warn};

use crate::chain::ChainHandle;
use crate::transport::HopSession;

/// Check whether `handle` still answers a round trip over its endpoint.
///
/// An absent or already closed handle is not alive and no probe is sent.
/// When the probe fails, the handle's hops are closed before this returns,
/// whatever the caller later decides to do with it.
pub async fn is_alive<S: HopSession>(handle: Option<&ChainHandle<S>>) -> bool {
    let Some(handle) = handle else {
        return false;
    };
    if handle.is_closed() {
        debug!(chain = handle.id(), "chain already closed");
        return false;
    }

    match handle.endpoint().probe().await {
        Ok(()) => true,
        Err(e) => {
            warn!(chain = handle.id(), error = %e, "chain is not responding, closing");
            if let Err(e) = handle.close().await {
                warn!(chain = handle.id(), error = %e, "failed to close chain");
            }
            false
        }
    }
}
