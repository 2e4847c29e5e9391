//! Periodic route usage reporting.
//!
//! The monitor reads route counters on a timer and hands snapshots to
//! whichever collaborator holds the feed's receiving end; formatting and
//! emission are the consumer's concern. Reading the counters never
//! participates in the shutdown handshake.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::route::Route;

/// Usage snapshot for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUsage {
    /// Position of the route in the configured route list.
    pub index: usize,
    /// The route's diagnostic name.
    pub name: String,
    /// Sessions currently relaying.
    pub sessions: u64,
    /// Total connections accepted since start.
    pub accepted: u64,
}

/// One tick's snapshots, in route order.
pub type UsageReport = Vec<RouteUsage>;

pub(crate) fn snapshot(routes: &[Arc<Route>]) -> UsageReport {
    routes
        .iter()
        .enumerate()
        .map(|(index, route)| RouteUsage {
            index,
            name: route.name(),
            sessions: route.active_sessions(),
            accepted: route.stats().sessions_accepted.load(Ordering::Relaxed),
        })
        .collect()
}

/// Emit a usage report for every route on each interval tick until
/// cancelled or the feed's consumer goes away.
pub(crate) async fn run(
    routes: Vec<Arc<Route>>,
    interval: Duration,
    feed: mpsc::UnboundedSender<UsageReport>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let report = snapshot(&routes);
                debug!(routes = report.len(), "usage report");
                if feed.send(report).is_err() {
                    break;
                }
            }
        }
    }
}
