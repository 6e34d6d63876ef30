//! Resilient multi-hop TCP tunnel over SSH.
//!
//! Local TCP connections are forwarded to a destination that is only
//! reachable through a chain of SSH hops:
//! `client → listener → hop0 → hop1 → ... → hopN-1 → destination`.
//!
//! # Architecture
//!
//! - **Chain builder** ([`chain`]): dials hop 0 over TCP and each later hop
//!   through a channel of the previous one; unwinds partial chains on error.
//! - **Liveness prober** ([`probe`]): one keepalive round trip over the
//!   chain's endpoint; a failing chain is closed on the spot.
//! - **Chain manager** ([`manager`]): owns the single shared chain, reuses
//!   it while it is alive, rebuilds it lazily or on demand.
//! - **Reconnect scheduler** ([`scheduler`]): refreshes the chain every N
//!   sessions in the background.
//! - **Forwarding engine** ([`forward`]): one relay per accepted
//!   connection, with a single rebuild-and-retry when the destination
//!   cannot be reached.
//!
//! Hop sessions sit behind the [`transport`] traits; [`transport::ssh`] is
//! the `russh` implementation.

pub mod chain;
pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod forward;
pub mod hop;
pub mod listener;
pub mod manager;
pub mod probe;
pub mod scheduler;
pub mod transport;

pub use cli::TunnelArgs;
pub use error::TunnelError;
pub use tokio_util::sync::CancellationToken;
