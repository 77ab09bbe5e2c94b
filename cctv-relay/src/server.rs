//! Server lifecycle management
//!
//! Runs the HTTP server until a shutdown signal arrives, then stops the
//! primary capture.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use cctv_api::AppState;
use cctv_live::LiveHub;

pub struct RelayServer {
    state: AppState,
    hub: Arc<LiveHub>,
}

impl RelayServer {
    pub fn new(state: AppState) -> Self {
        let hub = state.hub.clone();
        Self { state, hub }
    }

    /// Serve until the HTTP server stops or a shutdown signal arrives
    pub async fn start(self) -> anyhow::Result<()> {
        info!("Starting CCTV relay...");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let http_handle = self.start_http_server(shutdown_rx).await?;

        tokio::select! {
            _ = http_handle => {
                error!("HTTP server stopped unexpectedly");
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
            }
        }

        let _ = shutdown_tx.send(true);
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        info!("Shutting down CCTV relay...");
        self.hub.shutdown().await;
        info!("Shutdown complete");
    }

    /// Bind the listener up front so address errors fail startup
    async fn start_http_server(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<JoinHandle<()>> {
        let http_address = self.state.config.http_address();
        let listener = tokio::net::TcpListener::bind(&http_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_address}: {e}"))?;
        info!("HTTP server listening on {}", http_address);

        let router = cctv_api::create_router(self.state.clone());

        let handle = tokio::spawn(async move {
            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        });

        Ok(handle)
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
