//! Forwarding routes and their runtime state.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::endpoint::{Endpoint, Upstream};
use crate::error::{Error, Result};

/// Default timeout for destination connection attempts.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Counters for a route, updated by concurrently running sessions.
#[derive(Debug, Default)]
pub struct RouteStats {
    /// Sessions currently relaying.
    pub sessions_active: AtomicU64,
    /// Total connections accepted.
    pub sessions_accepted: AtomicU64,
    /// Sessions that ended with a natural close from either direction.
    pub sessions_completed: AtomicU64,
    /// Destination dial failures.
    pub dial_errors: AtomicU64,
    /// Sessions that ended with a mid-transfer read/write failure.
    pub transfer_errors: AtomicU64,
}

/// One forwarding rule: a source endpoint to listen on, a set of destination
/// endpoints to relay to, and the route's admission limit and transfer
/// buffer size.
///
/// The live-session counter and the shutdown signal are shared with every
/// session spawned for this route; the listener itself is owned by the
/// route's acceptor loop once bound.
pub struct Route {
    source: Endpoint,
    upstream: Upstream,
    max_sessions: usize,
    buffer_size: usize,
    connect_timeout: Duration,
    stats: RouteStats,
    shutdown: CancellationToken,
    bound_addr: OnceLock<SocketAddr>,
}

impl Route {
    /// Create a new route. Limits are validated by the configuration layer;
    /// `shutdown` is the signal observed by the acceptor loop and every
    /// in-flight session of this route.
    pub fn new(
        source: Endpoint,
        destinations: Vec<Endpoint>,
        max_sessions: usize,
        buffer_size: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            upstream: Upstream::new(destinations),
            max_sessions,
            buffer_size,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stats: RouteStats::default(),
            shutdown,
            bound_addr: OnceLock::new(),
        }
    }

    /// Human-readable `"src <-> dst"` label for diagnostics.
    pub fn name(&self) -> String {
        format!("{} <-> {}", self.source.addr(), self.upstream.label())
    }

    /// Bind a listener on the source endpoint.
    pub async fn listen(&self) -> Result<TcpListener> {
        let addr = self.source.addr();
        let listener = TcpListener::bind(&addr).await.map_err(|source| Error::Bind {
            addr: addr.clone(),
            source,
        })?;

        let local_addr = listener.local_addr().map_err(|source| Error::Bind {
            addr: addr.clone(),
            source,
        })?;
        let _ = self.bound_addr.set(local_addr);

        info!(
            route = %self.name(),
            bind_addr = %local_addr,
            max_sessions = self.max_sessions,
            "listener bound"
        );
        Ok(listener)
    }

    /// Open an outbound connection to the next destination.
    pub async fn dial(&self) -> Result<TcpStream> {
        let addr = self.upstream.pick().addr();
        debug!(route = %self.name(), dest_addr = %addr, "connecting to destination");

        let attempt = timeout(self.connect_timeout, TcpStream::connect(addr.clone())).await;
        match attempt {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(Error::Dial { addr, source }),
            Err(_) => Err(Error::Dial {
                addr,
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timeout"),
            }),
        }
    }

    /// Maximum number of simultaneously active sessions.
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Transfer buffer size in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// The route's shutdown signal.
    pub fn shutdown_signal(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Route counters.
    pub fn stats(&self) -> &RouteStats {
        &self.stats
    }

    /// Number of sessions currently relaying.
    pub fn active_sessions(&self) -> u64 {
        self.stats.sessions_active.load(Ordering::Relaxed)
    }

    /// The address the listener is actually bound to, once `listen` has
    /// succeeded. Differs from the source endpoint when port 0 was
    /// configured.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr.get().copied()
    }
}
