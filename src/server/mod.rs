mod middleware;
mod router;
mod state;

pub use middleware::{auth_middleware, correlation_middleware};
pub use router::router;
pub use state::AppState;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::backend::RecordingPool;
use crate::config::GatewayConfig;
use crate::gateway::Gateway;

/// Binds `config.bind` and serves until ctrl-c.
pub async fn serve(config: GatewayConfig) -> Result<()> {
    warn!("no database driver configured; statements are recorded in memory only");
    let state = AppState::from_config(&config, Arc::new(RecordingPool::new()))
        .context("invalid gateway configuration")?;
    spawn_trace_pruning(
        Arc::clone(state.gateway()),
        config.trace_stale_after().context("invalid trace.stale_after")?,
    );

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(
        bind = %config.bind,
        tenants = config.tenants.len(),
        api_keys = config.api_keys.len(),
        "tenantgate listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server terminated")?;
    info!("tenantgate stopped");
    Ok(())
}

fn spawn_trace_pruning(gateway: Arc<Gateway>, stale_after: Duration) {
    if stale_after.is_zero() {
        info!("trace pruning disabled (stale_after=0)");
        return;
    }
    let period = (stale_after / 2).max(Duration::from_secs(5));
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            let pruned = gateway.prune_traces(stale_after);
            if pruned > 0 {
                debug!(pruned, "pruned unfinished request traces");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
