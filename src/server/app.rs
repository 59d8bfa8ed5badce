//! Application server
//!
//! Initialization and graceful shutdown.

use anyhow::Result;
use std::net::SocketAddr;
use tokio::signal;

use crate::{
    config::Settings,
    server::{routes, state::AppState},
};

pub struct App {
    settings: Settings,
    state: AppState,
}

impl App {
    pub async fn new(settings: Settings) -> Result<Self> {
        tracing::debug!("Initializing application state");
        let state = AppState::new(settings.clone()).await?;

        Ok(Self { settings, state })
    }

    /// Serve until SIGINT or SIGTERM, then release the database pool
    pub async fn run_with_graceful_shutdown(self) -> Result<()> {
        let addr = self.settings.server_addr().parse::<SocketAddr>()?;
        let router = routes::create_router(self.state.clone())?;

        tracing::info!(
            address = %addr,
            url = %self.settings.public_url(),
            "Starting server with graceful shutdown enabled"
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.cleanup().await;

        Ok(())
    }

    async fn cleanup(&self) {
        tracing::info!("Closing database pool");
        self.state.database.close().await;
    }
}

/// Completes when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
