//! Secure-shell hop transport built on `russh`.
//!
//! Each hop is a full SSH client session. The first one runs over a plain
//! TCP connection; every later one runs over a `direct-tcpip` channel of
//! the previous session, so the handshake with hop *i* is tunneled through
//! hops *0..i-1*.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh_keys::key::{KeyPair, PublicKey};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::TunnelError;
use crate::hop::{Endpoint, Hop};
use crate::transport::{BoxFuture, HopConnector, HopSession, TransportStream};

/// Originator reported to hops when opening `direct-tcpip` channels.
const ORIGINATOR_ADDR: &str = "0.0.0.0";
const ORIGINATOR_PORT: u32 = 0;

/// Global request used as a round trip: cancelling a forward that was never
/// requested needs a reply from the hop but changes nothing on it.
const PROBE_FORWARD_ADDR: &str = "";

/// Session-level settings applied to every hop.
#[derive(Debug, Clone)]
pub struct SshSettings {
    /// Interval between library keepalives; `None` disables them.
    pub keepalive_interval: Option<Duration>,
    /// Unanswered keepalives tolerated before the session is dropped.
    pub keepalive_max: usize,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            keepalive_interval: Some(Duration::from_secs(
                hopchain_core::DEFAULT_KEEPALIVE_INTERVAL_SECS,
            )),
            keepalive_max: hopchain_core::DEFAULT_KEEPALIVE_MAX,
        }
    }
}

/// Client handler shared by all hops.
///
/// Host identity is not verified.
struct SshHandler {
    addr: String,
}

#[async_trait]
impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(addr = %self.addr, "accepting host key without verification");
        Ok(true)
    }
}

/// Connects hops over SSH with public-key authentication.
#[derive(Clone)]
pub struct SshConnector {
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new(settings: &SshSettings) -> Self {
        let config = client::Config {
            keepalive_interval: settings.keepalive_interval,
            keepalive_max: settings.keepalive_max,
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }

    /// Run the client handshake over `stream` and authenticate as `hop.user`.
    async fn handshake<S>(
        &self,
        hop: &Hop,
        key: &Arc<KeyPair>,
        stream: S,
    ) -> Result<SshSession, TunnelError>
    where
        S: TransportStream,
    {
        let addr = hop.addr.to_string();
        let handler = SshHandler { addr: addr.clone() };

        let mut handle = client::connect_stream(self.config.clone(), stream, handler)
            .await
            .map_err(|e| TunnelError::Handshake {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        let accepted = handle
            .authenticate_publickey(hop.user.as_str(), key.clone())
            .await
            .map_err(|e| TunnelError::Handshake {
                addr: addr.clone(),
                reason: format!("public key auth: {e}"),
            })?;
        if !accepted {
            return Err(TunnelError::Handshake {
                addr,
                reason: format!("public key rejected for user {:?}", hop.user),
            });
        }

        debug!(addr = %addr, user = %hop.user, "hop authenticated");
        Ok(SshSession { handle, addr })
    }
}

impl HopConnector for SshConnector {
    type Credential = Arc<KeyPair>;
    type Session = SshSession;

    fn connect<'a>(
        &'a self,
        hop: &'a Hop,
        credential: &'a Self::Credential,
        timeout: Option<Duration>,
    ) -> BoxFuture<'a, Result<Self::Session, TunnelError>> {
        Box::pin(async move {
            let addr = hop.addr.to_string();
            let dial = TcpStream::connect((hop.addr.host.as_str(), hop.addr.port));
            let tcp = match timeout {
                Some(timeout) => tokio::time::timeout(timeout, dial)
                    .await
                    .map_err(|_| TunnelError::ConnectTimeout(addr.clone()))?,
                None => dial.await,
            }
            .map_err(|e| TunnelError::Dial {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
            let _ = tcp.set_nodelay(true);

            self.handshake(hop, credential, tcp).await
        })
    }

    fn connect_via<'a>(
        &'a self,
        proxy: &'a Self::Session,
        hop: &'a Hop,
        credential: &'a Self::Credential,
    ) -> BoxFuture<'a, Result<Self::Session, TunnelError>> {
        Box::pin(async move {
            let stream = proxy.open_channel(&hop.addr).await?;
            self.handshake(hop, credential, stream).await
        })
    }
}

/// An authenticated SSH session with one hop.
pub struct SshSession {
    handle: client::Handle<SshHandler>,
    addr: String,
}

impl HopSession for SshSession {
    type Stream = russh::ChannelStream<client::Msg>;

    fn open_channel<'a>(
        &'a self,
        target: &'a Endpoint,
    ) -> BoxFuture<'a, Result<Self::Stream, TunnelError>> {
        Box::pin(async move {
            let channel = self
                .handle
                .channel_open_direct_tcpip(
                    target.host.clone(),
                    u32::from(target.port),
                    ORIGINATOR_ADDR,
                    ORIGINATOR_PORT,
                )
                .await
                .map_err(|e| TunnelError::Dial {
                    addr: target.to_string(),
                    reason: format!("via {}: {e}", self.addr),
                })?;
            Ok(channel.into_stream())
        })
    }

    fn probe(&self) -> BoxFuture<'_, Result<(), TunnelError>> {
        Box::pin(async move {
            if self.handle.is_closed() {
                return Err(TunnelError::Probe(format!("session with {} is closed", self.addr)));
            }
            // Any reply, including a refusal, proves the hop is still there.
            match self.handle.cancel_tcpip_forward(PROBE_FORWARD_ADDR, 0).await {
                Ok(()) | Err(russh::Error::RequestDenied) => Ok(()),
                Err(e) => Err(TunnelError::Probe(format!("{}: {e}", self.addr))),
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TunnelError>> {
        Box::pin(async move {
            self.handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
                .map_err(TunnelError::Ssh)
        })
    }
}
