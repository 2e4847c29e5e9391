//! relayd
//!
//! Multi-route TCP forwarding proxy daemon.
//!
//! This binary:
//! - loads a JSON route configuration
//! - binds a listener per route and relays accepted connections unmodified
//! - logs periodic per-route usage reports
//! - drains in-flight sessions on SIGINT/SIGTERM

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tcp_relay::{Config, Proxy};

/// How long a signal-triggered shutdown waits for sessions to drain.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "relayd", version, about = "Multi-route TCP forwarding proxy")]
struct Args {
    /// Configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Force debug-level logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // Prefer RUST_LOG, fall back to the configured level.
    let log_level = if args.debug {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        routes = config.routes.len(),
        monitor_interval = config.monitor_interval,
        "starting relayd"
    );

    let proxy = Arc::new(Proxy::new(config).context("invalid configuration")?);

    if let Some(mut feed) = proxy.usage_feed() {
        tokio::spawn(async move {
            while let Some(report) = feed.recv().await {
                for usage in report {
                    info!(
                        index = usage.index,
                        route = %usage.name,
                        sessions = usage.sessions,
                        accepted = usage.accepted,
                        "route usage"
                    );
                }
            }
        });
    }

    let shutdown_proxy = Arc::clone(&proxy);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("termination signal received");
        if let Err(err) = shutdown_proxy.shutdown(SHUTDOWN_DEADLINE).await {
            error!(error = %err, "shutdown incomplete");
        }
    });

    proxy.start().await?;
    info!("terminated");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
