//! ipguard gateway binary.
//!
//! Loads config from `$IPGUARD_CONFIG` (default `ipguard.yaml`), wires the
//! governance stack, and serves until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use ipguard_core::error::{GuardError, Result};
use ipguard_gateway::{app_state::AppState, audit, config, policy, router};

const AUDIT_DRAIN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "ipguard-gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = config::config_path();
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.gateway.listen_addr()?;
    let sweep_every = cfg.policy.sweep_interval();
    let record_idle_ttl = cfg.policy.record_idle_ttl();

    let state = AppState::new(cfg)?;
    audit::install_panic_hook(state.engine().auditor().clone());
    let _sweeper = policy::spawn_sweeper(Arc::clone(state.engine()), sweep_every, record_idle_ttl);

    let app = router::build_router(state.clone())?;

    tracing::info!(%listen, config = %path, "ipguard-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| GuardError::Internal(format!("bind {listen}: {e}")))?;

    let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|e| GuardError::Internal(format!("server: {e}")));

    if !state.drain_audit(AUDIT_DRAIN_GRACE).await {
        tracing::warn!(grace = ?AUDIT_DRAIN_GRACE, "audit queue not fully delivered before exit");
    }
    served
}

async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    state.metrics().set_draining();
    tracing::info!("shutdown requested, draining");
}
