//! In-process hop transport and helpers shared by the integration tests.
//!
//! `FakeConnector` builds chains whose sessions are cancellation tokens:
//! each hop's token is a child of the previous hop's, so killing the first
//! hop takes every later hop and every open channel down with it, the way a
//! dropped TCP connection does. Channels are real TCP connections from the
//! test process to the target, bridged onto an in-memory duplex pipe.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hopchain_tunnel::chain::ChainBuilder;
use hopchain_tunnel::hop::{Endpoint, Hop, HopSpec};
use hopchain_tunnel::manager::ChainManager;
use hopchain_tunnel::scheduler::ReconnectScheduler;
use hopchain_tunnel::transport::{BoxFuture, HopConnector, HopSession};
use hopchain_tunnel::TunnelError;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const NO_FAILURE: usize = usize::MAX;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Shared state and counters for every fake session.
pub struct FakeNetwork {
    connects: AtomicUsize,
    closes: AtomicUsize,
    probes: AtomicUsize,
    channel_opens: AtomicUsize,
    fail_hop: AtomicUsize,
    channel_failures: AtomicUsize,
    dialed: Mutex<Vec<String>>,
    closed: Mutex<Vec<String>>,
    roots: Mutex<Vec<CancellationToken>>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            channel_opens: AtomicUsize::new(0),
            fail_hop: AtomicUsize::new(NO_FAILURE),
            channel_failures: AtomicUsize::new(0),
            dialed: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            roots: Mutex::new(Vec::new()),
        })
    }

    /// Successful hop sessions established so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn channel_opens(&self) -> usize {
        self.channel_opens.load(Ordering::SeqCst)
    }

    /// Hop addresses in the order they were attempted.
    pub fn dialed(&self) -> Vec<String> {
        self.dialed.lock().unwrap().clone()
    }

    /// Hop addresses in the order they were closed.
    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }

    /// Make every dial of hop `index` fail.
    pub fn fail_hop(&self, index: usize) {
        self.fail_hop.store(index, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_hop.store(NO_FAILURE, Ordering::SeqCst);
    }

    /// Make the next `count` channel opens fail.
    pub fn fail_channels(&self, count: usize) {
        self.channel_failures.store(count, Ordering::SeqCst);
    }

    /// Drop the network under every chain built so far.
    pub fn kill_first_hop(&self) {
        for root in self.roots.lock().unwrap().iter() {
            root.cancel();
        }
    }

    fn check_dial(&self, index: usize, hop: &Hop) -> Result<(), TunnelError> {
        self.dialed.lock().unwrap().push(hop.addr.to_string());
        if self.fail_hop.load(Ordering::SeqCst) == index {
            return Err(TunnelError::Dial {
                addr: hop.addr.to_string(),
                reason: "connection refused".into(),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn take_channel_failure(&self) -> bool {
        self.channel_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct FakeConnector {
    net: Arc<FakeNetwork>,
}

impl FakeConnector {
    pub fn new(net: Arc<FakeNetwork>) -> Self {
        Self { net }
    }
}

impl HopConnector for FakeConnector {
    type Credential = ();
    type Session = FakeSession;

    fn connect<'a>(
        &'a self,
        hop: &'a Hop,
        _credential: &'a (),
        _timeout: Option<Duration>,
    ) -> BoxFuture<'a, Result<FakeSession, TunnelError>> {
        Box::pin(async move {
            self.net.check_dial(0, hop)?;
            let alive = CancellationToken::new();
            self.net.roots.lock().unwrap().push(alive.clone());
            Ok(FakeSession {
                net: self.net.clone(),
                addr: hop.addr.to_string(),
                index: 0,
                alive,
            })
        })
    }

    fn connect_via<'a>(
        &'a self,
        proxy: &'a FakeSession,
        hop: &'a Hop,
        _credential: &'a (),
    ) -> BoxFuture<'a, Result<FakeSession, TunnelError>> {
        Box::pin(async move {
            if proxy.alive.is_cancelled() {
                return Err(TunnelError::Handshake {
                    addr: hop.addr.to_string(),
                    reason: "proxy session closed".into(),
                });
            }
            let index = proxy.index + 1;
            self.net.check_dial(index, hop)?;
            Ok(FakeSession {
                net: self.net.clone(),
                addr: hop.addr.to_string(),
                index,
                alive: proxy.alive.child_token(),
            })
        })
    }
}

pub struct FakeSession {
    net: Arc<FakeNetwork>,
    addr: String,
    index: usize,
    alive: CancellationToken,
}

impl HopSession for FakeSession {
    type Stream = DuplexStream;

    fn open_channel<'a>(
        &'a self,
        target: &'a Endpoint,
    ) -> BoxFuture<'a, Result<DuplexStream, TunnelError>> {
        Box::pin(async move {
            self.net.channel_opens.fetch_add(1, Ordering::SeqCst);
            if self.alive.is_cancelled() || self.net.take_channel_failure() {
                return Err(TunnelError::Dial {
                    addr: target.to_string(),
                    reason: "administratively prohibited".into(),
                });
            }

            let mut upstream = TcpStream::connect((target.host.as_str(), target.port))
                .await
                .map_err(|e| TunnelError::Dial {
                    addr: target.to_string(),
                    reason: e.to_string(),
                })?;
            let (near, mut far) = tokio::io::duplex(64 * 1024);
            let alive = self.alive.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::io::copy_bidirectional(&mut far, &mut upstream) => {}
                    _ = alive.cancelled() => {}
                }
            });
            Ok(near)
        })
    }

    fn probe(&self) -> BoxFuture<'_, Result<(), TunnelError>> {
        Box::pin(async move {
            self.net.probes.fetch_add(1, Ordering::SeqCst);
            if self.alive.is_cancelled() {
                return Err(TunnelError::Probe(format!("{}: session closed", self.addr)));
            }
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TunnelError>> {
        Box::pin(async move {
            self.alive.cancel();
            self.net.closes.fetch_add(1, Ordering::SeqCst);
            self.net.closed.lock().unwrap().push(self.addr.clone());
            Ok(())
        })
    }
}

/// `user@hop0,user@hop1,...` with `count` hops.
pub fn hop_spec(count: usize) -> Arc<HopSpec> {
    let hosts: Vec<String> = (0..count).map(|i| format!("ops@hop{i}")).collect();
    Arc::new(hosts.join(",").parse().unwrap())
}

pub fn builder(net: &Arc<FakeNetwork>, hops: usize) -> ChainBuilder<FakeConnector> {
    ChainBuilder::new(
        FakeConnector::new(net.clone()),
        hop_spec(hops),
        vec![(); hops],
        Some(Duration::from_secs(1)),
    )
}

pub fn manager(
    net: &Arc<FakeNetwork>,
    hops: usize,
    reconnect_every: u64,
) -> Arc<ChainManager<FakeConnector>> {
    Arc::new(ChainManager::new(
        builder(net, hops),
        ReconnectScheduler::new(reconnect_every),
        CancellationToken::new(),
    ))
}

/// Poll `cond` until it holds or five seconds pass.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timeout waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub struct TcpEchoServer {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl TcpEchoServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let shutdown_task = shutdown.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = listener.accept() => {
                        if let Ok((mut stream, _)) = res {
                            tokio::spawn(async move {
                                let mut buf = [0u8; 4096];
                                loop {
                                    match stream.read(&mut buf).await {
                                        Ok(0) => break,
                                        Ok(n) => {
                                            if stream.write_all(&buf[..n]).await.is_err() {
                                                break;
                                            }
                                        }
                                        Err(_) => break,
                                    }
                                }
                            });
                        }
                    }
                    _ = shutdown_task.cancelled() => break,
                }
            }
        });
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.addr.port())
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}
