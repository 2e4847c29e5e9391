//! Network endpoints and destination selection.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;

/// A resolved network address usable for listening or dialing.
///
/// Whether the address is actually connectable is deferred to listen/dial
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Canonical `"host:port"` address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Round-robin selector over a route's destination endpoints.
///
/// Selection is serialized through a single atomic cursor so concurrently
/// dialing sessions never race the "pick next host" step. Independent of the
/// relay logic so other balancing strategies can replace it.
#[derive(Debug)]
pub struct Upstream {
    endpoints: Vec<Endpoint>,
    cursor: AtomicUsize,
}

impl Upstream {
    /// Create a selector. The endpoint list must be non-empty; the
    /// configuration layer rejects empty destination lists before a route
    /// is built.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        debug_assert!(!endpoints.is_empty());
        Self {
            endpoints,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Pick the next destination.
    pub fn pick(&self) -> &Endpoint {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        &self.endpoints[idx % self.endpoints.len()]
    }

    /// Number of destinations.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Comma-joined `"host:port"` list for diagnostics.
    pub fn label(&self) -> String {
        self.endpoints
            .iter()
            .map(Endpoint::addr)
            .collect::<Vec<_>>()
            .join(",")
    }
}
