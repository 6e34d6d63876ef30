#![allow(clippy::tests_outside_test_module)]
mod common;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{init_tracing, TcpEchoServer};
use hopchain_tunnel::chain::ChainBuilder;
use hopchain_tunnel::credential::{credentials_for, load_private_key};
use hopchain_tunnel::hop::{Endpoint, Hop, HopSpec};
use hopchain_tunnel::probe::is_alive;
use hopchain_tunnel::transport::ssh::{SshConnector, SshSession, SshSettings};
use hopchain_tunnel::transport::{HopConnector, HopSession};
use russh::server::{self, Auth, Msg, Session};
use russh::Channel;
use russh_keys::key::PublicKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn key_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata/id_ed25519")
}

/// Accepts every key and serves `direct-tcpip` by dialing the target;
/// an unreachable target refuses the channel.
struct TestServer;

#[async_trait]
impl server::Handler for TestServer {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        _user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let Ok(mut upstream) = TcpStream::connect((host_to_connect, port_to_connect as u16)).await
        else {
            return Ok(false);
        };
        tokio::spawn(async move {
            let mut stream = channel.into_stream();
            let _ = tokio::io::copy_bidirectional(&mut stream, &mut upstream).await;
        });
        Ok(true)
    }
}

/// Start an SSH server on a local port; it accepts any number of sessions.
async fn start_ssh_server() -> SocketAddr {
    let pem = std::fs::read_to_string(key_path()).unwrap();
    let host_key = russh_keys::decode_secret_key(&pem, None).unwrap();
    let config = Arc::new(server::Config {
        keys: vec![host_key],
        auth_rejection_time: Duration::from_millis(10),
        ..Default::default()
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let config = config.clone();
            tokio::spawn(async move {
                if let Ok(session) = server::run_stream(config, socket, TestServer).await {
                    let _ = session.await;
                }
            });
        }
    });
    addr
}

fn hop(addr: SocketAddr) -> Hop {
    Hop::parse(&format!("tester@{addr}")).unwrap()
}

async fn echo_over<S: HopSession>(session: &S, target: &Endpoint) {
    let mut channel = session.open_channel(target).await.unwrap();
    channel.write_all(b"over ssh").await.unwrap();
    let mut buf = [0u8; 8];
    tokio::time::timeout(Duration::from_secs(5), channel.read_exact(&mut buf))
        .await
        .expect("no echo through channel")
        .unwrap();
    assert_eq!(&buf, b"over ssh");
}

async fn until_dead(session: &SshSession) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.probe().await.is_ok() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session still answering after disconnect");
}

#[tokio::test]
async fn session_answers_round_trip_and_opens_channels() {
    init_tracing();
    let server = start_ssh_server().await;
    let echo = TcpEchoServer::start().await;
    let key = load_private_key(key_path()).unwrap();
    let connector = SshConnector::new(&SshSettings::default());

    let session = connector
        .connect(&hop(server), &key, Some(Duration::from_secs(5)))
        .await
        .unwrap();

    session.probe().await.unwrap();
    echo_over(&session, &echo.endpoint()).await;

    session.close().await.unwrap();
    until_dead(&session).await;

    echo.stop().await;
}

#[tokio::test]
async fn second_hop_runs_through_first() {
    init_tracing();
    let server = start_ssh_server().await;
    let echo = TcpEchoServer::start().await;
    let key = load_private_key(key_path()).unwrap();
    let connector = SshConnector::new(&SshSettings::default());

    let first = connector
        .connect(&hop(server), &key, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    let second = connector.connect_via(&first, &hop(server), &key).await.unwrap();

    second.probe().await.unwrap();
    echo_over(&second, &echo.endpoint()).await;

    // dropping the first hop takes the tunneled one with it
    first.close().await.unwrap();
    until_dead(&second).await;

    echo.stop().await;
}

#[tokio::test]
async fn chain_of_ssh_hops_builds_and_closes() {
    init_tracing();
    let server = start_ssh_server().await;
    let echo = TcpEchoServer::start().await;
    let key = load_private_key(key_path()).unwrap();

    let spec: HopSpec = format!("tester@{server},tester@{server},tester@{server}")
        .parse()
        .unwrap();
    let spec = Arc::new(spec);
    let credentials = credentials_for(&spec, key);
    let builder = ChainBuilder::new(
        SshConnector::new(&SshSettings::default()),
        spec,
        credentials,
        Some(Duration::from_secs(5)),
    );

    let chain = builder.build().await.unwrap();
    assert_eq!(chain.hops(), 3);
    assert!(is_alive(Some(&chain)).await);
    echo_over(chain.endpoint(), &echo.endpoint()).await;

    chain.close().await.unwrap();
    assert!(!is_alive(Some(&chain)).await);

    echo.stop().await;
}

#[tokio::test]
async fn unreachable_second_hop_unwinds_first() {
    let server = start_ssh_server().await;
    let key = load_private_key(key_path()).unwrap();

    // bind then drop to get a port nobody listens on
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let spec = Arc::new(format!("tester@{server},tester@{closed}").parse::<HopSpec>().unwrap());
    let credentials = credentials_for(&spec, key);
    let builder = ChainBuilder::new(
        SshConnector::new(&SshSettings::default()),
        spec,
        credentials,
        Some(Duration::from_secs(5)),
    );

    let err = builder.build().await.err().unwrap();
    assert!(
        matches!(err, hopchain_tunnel::TunnelError::Hop { index: 1, .. }),
        "got {err}"
    );
}
