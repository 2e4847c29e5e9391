pub mod config;
pub mod error;
pub mod proxy;

pub use config::{Config, RouteConfig};
pub use error::{Error, Result};
pub use proxy::{
    Direction, Endpoint, Outcome, Proxy, Route, RouteStats, RouteUsage, Upstream, UsageReport,
};
