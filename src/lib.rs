//! # hopchain
//!
//! A resilient TCP port forwarder over a chain of SSH hops.
//!
//! ## Crates
//!
//! - [`hopchain_core`] - Defaults, error type tags and the bidirectional relay
//! - [`hopchain_tunnel`] - Hop chains, the chain manager and the forwarding engine

pub use hopchain_core as core;
pub use hopchain_tunnel as tunnel;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use hopchain_tunnel::chain::{ChainBuilder, ChainHandle};
    pub use hopchain_tunnel::config::{TunnelConfig, ValidatedConfig};
    pub use hopchain_tunnel::hop::{Endpoint, Hop, HopSpec};
    pub use hopchain_tunnel::manager::ChainManager;
    pub use hopchain_tunnel::{CancellationToken, TunnelArgs, TunnelError};
}
