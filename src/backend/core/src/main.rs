//! campus-server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use campus_core::{
    api::{self, AppState},
    auth::ConsumedTokenLedger,
    config::Config,
    db::Database,
    middleware::{AccessGate, SecurityHeadersConfig},
    observability,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

const LEDGER_SWEEP_EVERY: Duration = Duration::from_secs(600);
const HSTS_MAX_AGE_SECS: u64 = 365 * 24 * 60 * 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // No default signing secret exists, so configuration errors are fatal.
    let config = match std::env::var("CAMPUS_CONFIG") {
        Ok(path) => Config::from_file(&path),
        Err(_) => Config::load(),
    }
    .context("loading configuration")?;

    observability::init("campus-server", &config.observability)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        unmatched_routes = ?config.auth.unmatched_routes,
        "campus-server starting"
    );

    let db = Database::new(&config.database).await?;
    let latency = db.ping().await?;
    info!(latency_ms = latency.as_millis() as u64, "Database reachable");

    let ledger = Arc::new(ConsumedTokenLedger::new());
    spawn_ledger_sweeper(ledger.clone());
    let gate = Arc::new(AccessGate::from_config(&config.auth, ledger)?);

    let mut headers = SecurityHeadersConfig::default();
    if config.auth.secure_cookies {
        headers = headers.with_hsts(HSTS_MAX_AGE_SECS);
    }
    let app = api::build_router_with_headers(AppState::new(Arc::new(db), gate), headers);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("server.host/server.port")?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    observability::shutdown();
    info!("campus-server stopped");
    Ok(())
}

/// Drops consumed refresh ids once the token they name has expired anyway.
fn spawn_ledger_sweeper(ledger: Arc<ConsumedTokenLedger>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(LEDGER_SWEEP_EVERY);
        loop {
            tick.tick().await;
            ledger.purge_expired();
        }
    });
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutting down");
}
