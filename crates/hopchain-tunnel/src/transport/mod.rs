//! Hop transport abstraction.
//!
//! Defines the two seams between the chain logic and the secure-shell
//! library: a connector that turns a hop address into an authenticated
//! session, and the session itself, which can open channels, answer a
//! liveness probe and be closed. The chain builder, prober and manager are
//! generic over these traits; [`ssh`] provides the production
//! implementation.

pub mod ssh;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TunnelError;
use crate::hop::{Endpoint, Hop};

/// Boxed, sendable future returned by transport methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Marker trait for streams usable by the forwarding engine.
pub trait TransportStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> TransportStream for T {}

/// An established, authenticated session with one hop.
pub trait HopSession: Send + Sync + 'static {
    /// Stream type of channels opened through this session.
    type Stream: TransportStream;

    /// Open an outbound channel from this hop to `target`.
    fn open_channel<'a>(
        &'a self,
        target: &'a Endpoint,
    ) -> BoxFuture<'a, Result<Self::Stream, TunnelError>>;

    /// One side-effect-free round trip over the session.
    fn probe(&self) -> BoxFuture<'_, Result<(), TunnelError>>;

    /// Tear the session down.
    fn close(&self) -> BoxFuture<'_, Result<(), TunnelError>>;
}

/// Dials hops and performs the secure-session handshake.
pub trait HopConnector: Send + Sync + 'static {
    /// Authentication material for one hop.
    type Credential: Send + Sync + 'static;
    /// The session type produced by this connector.
    type Session: HopSession;

    /// Dial `hop` directly over the network and authenticate.
    ///
    /// `timeout` bounds the network dial; `None` waits as long as the OS does.
    fn connect<'a>(
        &'a self,
        hop: &'a Hop,
        credential: &'a Self::Credential,
        timeout: Option<Duration>,
    ) -> BoxFuture<'a, Result<Self::Session, TunnelError>>;

    /// Reach `hop` through a channel opened on `proxy`, then authenticate.
    fn connect_via<'a>(
        &'a self,
        proxy: &'a Self::Session,
        hop: &'a Hop,
        credential: &'a Self::Credential,
    ) -> BoxFuture<'a, Result<Self::Session, TunnelError>>;
}
