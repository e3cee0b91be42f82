//! commskit gateway binary.
//!
//! Refuses to start unless the required provider credentials, sender
//! numbers and allowed origin are configured.

use commskit::prelude::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("commskit: {}", e);
            return Err(e.into());
        }
    };
    commskit::logging::init(&config.logging)?;

    let state = server::build_state(&config)?;
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let _cleanup = limiter.spawn_cleanup(RATE_LIMIT_CLEANUP_INTERVAL);
    let app = server::build_router(&config, state, limiter)?;

    let listener = tokio::net::TcpListener::bind(config.server.bind_address()).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "commskit gateway listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("commskit gateway stopped");
    Ok(())
}

/// Wait for `SIGINT` or `SIGTERM`.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
}
