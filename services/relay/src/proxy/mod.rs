//! Multi-route TCP forwarding engine.
//!
//! This module provides:
//! - listener binding and a per-route accept loop
//! - admission limiting with OS-backlog backpressure
//! - a duplex byte relay per accepted connection
//! - coordinated graceful shutdown with a drain deadline
//! - periodic usage reporting
//!
//! ## Architecture
//!
//! ```text
//! Client -> Acceptor loop -> Relay session <-> Destination (round-robin)
//!                |                 |
//!        admission limit    shutdown signal (per route)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use tcp_relay::{Config, Proxy};
//!
//! let proxy = Proxy::new(Config::load("config.json")?)?;
//! proxy.start().await?;
//! ```

mod acceptor;
mod endpoint;
mod monitor;
mod relay;
mod route;
mod server;

pub use endpoint::{Endpoint, Upstream};
pub use monitor::{RouteUsage, UsageReport};
pub use relay::{Direction, Outcome};
pub use route::{Route, RouteStats, DEFAULT_CONNECT_TIMEOUT};
pub use server::Proxy;
