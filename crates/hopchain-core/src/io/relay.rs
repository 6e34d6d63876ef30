//! Bidirectional data relay between a local connection and a tunnel channel.
//!
//! Each direction is driven as an independent poll-based state machine within
//! a single future, so back-pressure on one direction never stalls the other.
//! This matters once the remote side is a channel multiplexed over a chain of
//! hops that all share one transport window.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::time::Instant as TokioInstant;

/// Direction of a copy loop, named from the local side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local connection to remote channel.
    Upstream,
    /// Remote channel to local connection.
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("local->remote"),
            Direction::Downstream => f.write_str("remote->local"),
        }
    }
}

/// Bytes moved in each direction over the lifetime of one relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub upstream: u64,
    pub downstream: u64,
}

/// An I/O error tagged with the direction that produced it.
#[derive(Debug, thiserror::Error)]
#[error("{direction}: {source}")]
pub struct RelayError {
    pub direction: Direction,
    #[source]
    pub source: io::Error,
    /// Bytes moved before the error ended the relay.
    pub stats: RelayStats,
}

/// State machine for one-directional copy with flush.
enum CopyState {
    Reading,
    Writing(usize, usize), // (pos, len)
    Flushing(usize),       // bytes flushing
    ShuttingDown,
    Done,
}

/// Result of polling one copy direction.
enum CopyPoll {
    /// Data was flushed, carries the byte count.
    Flushed(usize),
    /// Direction finished (EOF + shutdown).
    Finished,
}

/// Poll-driven one-directional copy: read → write → flush.
fn poll_copy_direction<R, W>(
    cx: &mut Context<'_>,
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    state: &mut CopyState,
) -> Poll<io::Result<CopyPoll>>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    loop {
        match state {
            CopyState::Reading => {
                let mut read_buf = ReadBuf::new(buf);
                match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
                    Poll::Ready(Ok(())) => {
                        let n = read_buf.filled().len();
                        if n == 0 {
                            *state = CopyState::ShuttingDown;
                        } else {
                            *state = CopyState::Writing(0, n);
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Writing(pos, len) => {
                match Pin::new(&mut *writer).poll_write(cx, &buf[*pos..*len]) {
                    Poll::Ready(Ok(0)) => {
                        return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                    }
                    Poll::Ready(Ok(n)) => {
                        *pos += n;
                        if *pos >= *len {
                            let total = *len;
                            *state = CopyState::Flushing(total);
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Flushing(bytes) => {
                let bytes = *bytes;
                match Pin::new(&mut *writer).poll_flush(cx) {
                    Poll::Ready(Ok(())) => {
                        *state = CopyState::Reading;
                        return Poll::Ready(Ok(CopyPoll::Flushed(bytes)));
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            // Shutdown errors end the direction without failing the relay.
            CopyState::ShuttingDown => match Pin::new(&mut *writer).poll_shutdown(cx) {
                Poll::Ready(_) => {
                    *state = CopyState::Done;
                    return Poll::Ready(Ok(CopyPoll::Finished));
                }
                Poll::Pending => return Poll::Pending,
            },
            CopyState::Done => return Poll::Ready(Ok(CopyPoll::Finished)),
        }
    }
}

/// Outcome of one poll over both directions.
enum RelayPoll {
    /// Data moved in at least one direction.
    Progress,
    /// One direction reached EOF and shut its writer down.
    Finished(Direction),
}

/// Upper bound on shutting down the surviving writer once the relay ends.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bidirectional relay that ends with the first direction to terminate.
///
/// Both directions run concurrently within a single task. As soon as one
/// side reaches EOF, its peer's writer is shut down, the writer facing the
/// side that hung up is shut down too, and the relay returns; both streams
/// are dropped with it. An error in either direction ends the relay the
/// same way.
///
/// When `idle_timeout` is set, the relay also ends once **neither**
/// direction has transferred data for that long.
///
/// # Arguments
///
/// * `local` - The accepted local connection
/// * `remote` - The channel opened through the tunnel
/// * `idle_timeout` - Optional maximum time without data transfer
/// * `buffer_size` - Size of each direction's read buffer
pub async fn relay_bidirectional<A, B>(
    local: A,
    remote: B,
    idle_timeout: Option<Duration>,
    buffer_size: usize,
) -> Result<RelayStats, RelayError>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut local_r, mut local_w) = tokio::io::split(local);
    let (mut remote_r, mut remote_w) = tokio::io::split(remote);

    let mut buf_up = vec![0u8; buffer_size];
    let mut buf_down = vec![0u8; buffer_size];
    let mut state_up = CopyState::Reading;
    let mut state_down = CopyState::Reading;

    // tokio clamps an overflowing deadline to its far future.
    let idle_sleep = tokio::time::sleep(idle_timeout.unwrap_or(Duration::MAX));
    tokio::pin!(idle_sleep);

    let mut stats = RelayStats::default();

    let finished = loop {
        let both = std::future::poll_fn(|cx| {
            let mut progress = false;

            match poll_copy_direction(cx, &mut local_r, &mut remote_w, &mut buf_up, &mut state_up) {
                Poll::Ready(Ok(CopyPoll::Flushed(n))) => {
                    stats.upstream += n as u64;
                    progress = true;
                }
                Poll::Ready(Ok(CopyPoll::Finished)) => {
                    return Poll::Ready(Ok(RelayPoll::Finished(Direction::Upstream)));
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err((Direction::Upstream, e))),
                Poll::Pending => {}
            }

            match poll_copy_direction(cx, &mut remote_r, &mut local_w, &mut buf_down, &mut state_down) {
                Poll::Ready(Ok(CopyPoll::Flushed(n))) => {
                    stats.downstream += n as u64;
                    progress = true;
                }
                Poll::Ready(Ok(CopyPoll::Finished)) => {
                    return Poll::Ready(Ok(RelayPoll::Finished(Direction::Downstream)));
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err((Direction::Downstream, e))),
                Poll::Pending => {}
            }

            if progress {
                Poll::Ready(Ok(RelayPoll::Progress))
            } else {
                Poll::Pending
            }
        });

        tokio::select! {
            result = both => {
                match result {
                    Ok(RelayPoll::Progress) => {
                        if let Some(idle) = idle_timeout {
                            idle_sleep.as_mut().reset(TokioInstant::now() + idle);
                        }
                    }
                    Ok(RelayPoll::Finished(direction)) => break direction,
                    Err((direction, source)) => {
                        return Err(RelayError { direction, source, stats });
                    }
                }
            }
            _ = &mut idle_sleep => {
                return Ok(stats);
            }
        }
    };

    // The finished direction already shut down the writer it fed.
    let _ = match finished {
        Direction::Upstream => tokio::time::timeout(SHUTDOWN_TIMEOUT, local_w.shutdown()).await,
        Direction::Downstream => tokio::time::timeout(SHUTDOWN_TIMEOUT, remote_w.shutdown()).await,
    };
    Ok(stats)
}
