//! Per-route accept loop.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn, Instrument};

use super::relay::{self, Outcome};
use super::route::Route;
use super::server::Lifecycle;

/// Delay before retrying after a transient accept error.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Poll interval while the route sits at its admission limit.
const LIMIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Accept connections for one route until shutdown, then drain every
/// in-flight session before returning.
///
/// Accept errors are transient: logged and retried. The admission limit is
/// enforced by not accepting, so the OS backlog applies backpressure to new
/// arrivals.
pub(crate) async fn run(route: Arc<Route>, listener: TcpListener, lifecycle: Arc<Lifecycle>) {
    let sessions = TaskTracker::new();
    let mut limit_notified = false;

    loop {
        if lifecycle.is_shutting_down() {
            break;
        }

        if route.active_sessions() >= route.max_sessions() as u64 {
            // Notify once per overload episode, not once per poll.
            if !limit_notified {
                warn!(
                    route = %route.name(),
                    limit = route.max_sessions(),
                    "session limit reached, pausing accepts"
                );
                limit_notified = true;
            }
            tokio::select! {
                _ = sleep(LIMIT_POLL_INTERVAL) => continue,
                _ = route.shutdown_signal().cancelled() => break,
            }
        }
        if limit_notified {
            debug!(route = %route.name(), "below session limit, resuming accepts");
            limit_notified = false;
        }

        tokio::select! {
            _ = route.shutdown_signal().cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((client, peer_addr)) => {
                    spawn_session(&sessions, Arc::clone(&route), client, peer_addr);
                }
                Err(err) => {
                    warn!(route = %route.name(), error = %err, "accept error");
                    tokio::select! {
                        _ = sleep(ACCEPT_RETRY_DELAY) => {}
                        _ = route.shutdown_signal().cancelled() => break,
                    }
                }
            },
        }
    }

    // Stop accepting before draining: dropping the listener closes the
    // socket, so new arrivals are refused while sessions finish.
    drop(listener);

    sessions.close();
    if !sessions.is_empty() {
        debug!(
            route = %route.name(),
            pending = sessions.len(),
            "draining sessions"
        );
    }
    sessions.wait().await;
    info!(route = %route.name(), "route stopped");
}

/// Track a session: the live counter covers the whole session, dial attempt
/// included, and is decremented on every exit path.
fn spawn_session(sessions: &TaskTracker, route: Arc<Route>, client: TcpStream, peer_addr: SocketAddr) {
    route.stats().sessions_accepted.fetch_add(1, Ordering::Relaxed);
    route.stats().sessions_active.fetch_add(1, Ordering::Relaxed);

    let span = tracing::info_span!("session", route = %route.name(), peer = %peer_addr);
    sessions.spawn(
        async move {
            match relay::run(client, &route).await {
                Ok(Outcome::Completed(direction)) => {
                    route.stats().sessions_completed.fetch_add(1, Ordering::Relaxed);
                    debug!(direction = %direction, "session completed");
                }
                Ok(Outcome::TransferError(direction, err)) => {
                    route.stats().transfer_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(direction = %direction, error = %err, "session transfer error");
                }
                Ok(Outcome::Closing) => {
                    debug!("session closed by shutdown");
                }
                Err(err) => {
                    route.stats().dial_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %err, "session abandoned");
                }
            }
            route.stats().sessions_active.fetch_sub(1, Ordering::Relaxed);
        }
        .instrument(span),
    );
}
