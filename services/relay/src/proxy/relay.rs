//! Per-connection duplex relay sessions.
//!
//! A session dials the route's destination, then copies bytes in both
//! directions until either direction closes, errors, or the route's
//! shutdown signal fires. Termination of either direction is authoritative:
//! a half-dead connection is assumed dead for the mirror direction too.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::route::Route;
use crate::error::Result;

/// The direction whose copy task ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToServer => write!(f, "client->server"),
            Direction::ServerToClient => write!(f, "server->client"),
        }
    }
}

/// Terminal outcome of one relay session. Exactly one is reported per
/// session.
#[derive(Debug)]
pub enum Outcome {
    /// Either direction reached end-of-stream and the session closed.
    Completed(Direction),
    /// A read or write failed mid-session.
    TransferError(Direction, io::Error),
    /// The shutdown signal fired before either direction finished. Not a
    /// data-transfer failure; callers skip error logging for it.
    Closing,
}

/// Run one session for an accepted connection. A dial failure is local to
/// this session: the error is returned and the inbound connection is closed
/// on drop.
pub async fn run(client: TcpStream, route: &Route) -> Result<Outcome> {
    let server = route.dial().await?;
    Ok(forward(client, server, route.buffer_size(), route.shutdown_signal()).await)
}

/// Relay bytes between the two connections until one direction finishes or
/// the shutdown signal fires. Both connections are closed on every exit
/// path.
pub(crate) async fn forward(
    mut client: TcpStream,
    mut server: TcpStream,
    buffer_size: usize,
    shutdown: &CancellationToken,
) -> Outcome {
    let (mut client_read, mut client_write) = client.split();
    let (mut server_read, mut server_write) = server.split();

    tokio::select! {
        res = copy_bytes(&mut client_read, &mut server_write, buffer_size) => {
            finish(Direction::ClientToServer, res)
        }
        res = copy_bytes(&mut server_read, &mut client_write, buffer_size) => {
            finish(Direction::ServerToClient, res)
        }
        _ = shutdown.cancelled() => Outcome::Closing,
    }
}

fn finish(direction: Direction, res: io::Result<u64>) -> Outcome {
    match res {
        Ok(_) => Outcome::Completed(direction),
        Err(err) => Outcome::TransferError(direction, err),
    }
}

/// Copy until end-of-stream using a buffer of the route's configured size.
/// Returns the number of bytes copied.
async fn copy_bytes<R, W>(reader: &mut R, writer: &mut W, buffer_size: usize) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;
    loop {
        match reader.read(&mut buf).await? {
            0 => break,
            n => {
                writer.write_all(&buf[..n]).await?;
                total += n as u64;
            }
        }
    }
    Ok(total)
}
