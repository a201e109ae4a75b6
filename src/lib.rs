// src/lib.rs

pub mod api;
pub mod cli;
pub mod errors;
pub mod logging;
pub mod store;
pub mod supervisor;
pub mod telemetry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cli::CliArgs;
use crate::store::Store;
use crate::supervisor::Supervisor;

const SNAPSHOT_PERIOD: Duration = Duration::from_secs(30);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - snapshot hydration
/// - the supervisor
/// - the telemetry collector and periodic snapshotter
/// - the HTTP API with Ctrl-C graceful shutdown and a final snapshot
pub async fn run(args: CliArgs) -> Result<()> {
    let store = Arc::new(Store::new(&args.state));
    store.load();

    let supervisor = Arc::new(Supervisor::new(store.clone(), args.allow_actions));
    let shutdown = CancellationToken::new();

    telemetry::spawn_collector(store.clone(), shutdown.clone());
    spawn_snapshotter(store.clone(), shutdown.clone());

    // Ctrl-C → graceful shutdown.
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            shutdown.cancel();
        });
    }

    let app = api::router(api::AppState {
        store: store.clone(),
        supervisor,
        started_at: Instant::now(),
    });

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(addr = %args.listen, allow_actions = args.allow_actions, "helmsman listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await?;

    info!("shutting down");
    shutdown.cancel();
    if let Err(err) = store.snapshot() {
        error!(error = %err, "snapshot on exit failed");
    }
    Ok(())
}

/// Periodic full-state snapshot until shutdown. Failures are logged and the
/// in-memory state stays authoritative; a later attempt may succeed.
fn spawn_snapshotter(store: Arc<Store>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = interval(SNAPSHOT_PERIOD);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = store.snapshot() {
                        error!(error = %err, "periodic snapshot failed");
                    }
                }
            }
        }
    });
}
