//! Proxy orchestration and lifecycle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::acceptor;
use super::monitor::{self, UsageReport};
use super::route::Route;
use crate::config::Config;
use crate::error::{Error, Result};

/// Poll interval while `shutdown` waits for the drain to finish.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Proxy lifecycle states. Transitions are monotonic: a stopped proxy never
/// goes back to running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Created = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

/// Lifecycle flag observed by every acceptor loop.
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    fn new() -> Self {
        Self(AtomicU8::new(State::Created as u8))
    }

    fn current(&self) -> State {
        match self.0.load(Ordering::SeqCst) {
            0 => State::Created,
            1 => State::Running,
            2 => State::ShuttingDown,
            _ => State::Stopped,
        }
    }

    fn transition(&self, from: State, to: State) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.current() as u8 >= State::ShuttingDown as u8
    }

    fn is_stopped(&self) -> bool {
        self.current() == State::Stopped
    }

    fn mark_stopped(&self) {
        self.0.store(State::Stopped as u8, Ordering::SeqCst);
    }
}

/// The proxy engine: owns the configured routes, runs one acceptor loop per
/// route, and coordinates graceful shutdown and usage monitoring.
pub struct Proxy {
    routes: Vec<Arc<Route>>,
    monitor_interval: Option<Duration>,
    lifecycle: Arc<Lifecycle>,
    shutdown: CancellationToken,
    usage_tx: mpsc::UnboundedSender<UsageReport>,
    usage_rx: Mutex<Option<mpsc::UnboundedReceiver<UsageReport>>>,
}

impl Proxy {
    /// Build a proxy from validated configuration. Rejects an empty route
    /// list and unconfigured per-route limits; no partial proxy is returned
    /// on error.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        // One close-once broadcast: every route signal is a child of the
        // proxy-level token, so a single cancel reaches every acceptor loop
        // and in-flight session.
        let shutdown = CancellationToken::new();
        let routes = config
            .routes
            .into_iter()
            .map(|route| {
                Arc::new(Route::new(
                    route.source,
                    route.destinations,
                    route.max_sessions,
                    route.buffer_size,
                    shutdown.child_token(),
                ))
            })
            .collect();

        let (usage_tx, usage_rx) = mpsc::unbounded_channel();
        let monitor_interval =
            (config.monitor_interval > 0).then(|| Duration::from_secs(config.monitor_interval));

        Ok(Self {
            routes,
            monitor_interval,
            lifecycle: Arc::new(Lifecycle::new()),
            shutdown,
            usage_tx,
            usage_rx: Mutex::new(Some(usage_rx)),
        })
    }

    /// Take the monitoring feed. Reports are delivered only when a monitor
    /// interval is configured; take the feed before calling `start`.
    /// Returns `None` once taken.
    pub fn usage_feed(&self) -> Option<mpsc::UnboundedReceiver<UsageReport>> {
        self.usage_rx.lock().ok().and_then(|mut feed| feed.take())
    }

    /// The configured routes, in order.
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    /// Bind every route and run until shutdown completes.
    ///
    /// Startup is all-or-nothing: the first bind failure closes every
    /// already-bound listener and aborts. On success, blocks until every
    /// acceptor loop has drained after `shutdown`, then returns `Ok`.
    pub async fn start(&self) -> Result<()> {
        if !self.lifecycle.transition(State::Created, State::Running) {
            return Err(match self.lifecycle.current() {
                State::Running => Error::AlreadyRunning,
                _ => Error::AlreadyClosing,
            });
        }

        let mut listeners = Vec::with_capacity(self.routes.len());
        for route in &self.routes {
            match route.listen().await {
                Ok(listener) => listeners.push(listener),
                Err(err) => {
                    error!(route = %route.name(), error = %err, "startup aborted");
                    // Already-bound listeners close on drop.
                    drop(listeners);
                    self.shutdown.cancel();
                    self.lifecycle.mark_stopped();
                    return Err(err);
                }
            }
        }

        let monitor_task = self.monitor_interval.map(|interval| {
            // An unclaimed feed would buffer reports forever.
            drop(self.usage_feed());
            tokio::spawn(monitor::run(
                self.routes.clone(),
                interval,
                self.usage_tx.clone(),
                self.shutdown.clone(),
            ))
        });

        let mut acceptors = Vec::with_capacity(self.routes.len());
        for (route, listener) in self.routes.iter().zip(listeners) {
            acceptors.push(tokio::spawn(acceptor::run(
                Arc::clone(route),
                listener,
                Arc::clone(&self.lifecycle),
            )));
        }

        for task in acceptors {
            if let Err(err) = task.await {
                error!(error = %err, "acceptor task failed");
            }
        }
        self.lifecycle.mark_stopped();

        self.shutdown.cancel();
        if let Some(task) = monitor_task {
            let _ = task.await;
        }

        info!("proxy stopped");
        Ok(())
    }

    /// Request graceful stop: no new connections are accepted and every
    /// in-flight session is asked to close. Waits up to `deadline` for the
    /// drain to finish; on `DeadlineExceeded` the drain continues in the
    /// background. A second call reports `AlreadyClosing`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        loop {
            match self.lifecycle.current() {
                State::Created => {
                    // Nothing is running yet; stop for good so a later
                    // `start` cannot resurrect the proxy.
                    if self.lifecycle.transition(State::Created, State::Stopped) {
                        self.shutdown.cancel();
                        return Ok(());
                    }
                }
                State::Running => {
                    if self.lifecycle.transition(State::Running, State::ShuttingDown) {
                        break;
                    }
                }
                State::ShuttingDown | State::Stopped => return Err(Error::AlreadyClosing),
            }
        }

        info!("shutdown requested, draining sessions");
        self.shutdown.cancel();

        let deadline_at = Instant::now() + deadline;
        while !self.lifecycle.is_stopped() {
            if Instant::now() >= deadline_at {
                warn!("shutdown deadline exceeded, drain continues in the background");
                return Err(Error::DeadlineExceeded);
            }
            sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::proxy::endpoint::Endpoint;

    fn one_route_config() -> Config {
        Config {
            routes: vec![RouteConfig {
                source: Endpoint::new("127.0.0.1", 0),
                destinations: vec![Endpoint::new("127.0.0.1", 1)],
                max_sessions: 1,
                buffer_size: 8,
            }],
            monitor_interval: 0,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn lifecycle_transitions_are_monotonic() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.is_shutting_down());

        assert!(lifecycle.transition(State::Created, State::Running));
        assert!(!lifecycle.transition(State::Created, State::Running));

        assert!(lifecycle.transition(State::Running, State::ShuttingDown));
        assert!(lifecycle.is_shutting_down());
        assert!(!lifecycle.is_stopped());

        lifecycle.mark_stopped();
        assert!(lifecycle.is_stopped());
        assert!(!lifecycle.transition(State::Stopped, State::Running));
    }

    #[test]
    fn new_rejects_empty_route_list() {
        let config = Config {
            routes: Vec::new(),
            monitor_interval: 0,
            log_level: "info".to_string(),
        };
        assert!(matches!(Proxy::new(config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn shutdown_before_start_stops_for_good() {
        let proxy = Proxy::new(one_route_config()).unwrap();

        proxy.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(
            proxy.shutdown(Duration::from_secs(1)).await,
            Err(Error::AlreadyClosing)
        ));
        assert!(matches!(proxy.start().await, Err(Error::AlreadyClosing)));
    }

    #[tokio::test]
    async fn usage_feed_can_be_taken_once() {
        let proxy = Proxy::new(one_route_config()).unwrap();
        assert!(proxy.usage_feed().is_some());
        assert!(proxy.usage_feed().is_none());
    }
}
