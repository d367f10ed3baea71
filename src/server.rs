use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::api::{self, AppState};
use crate::error::DomainWatchError;

pub struct WebServer {
    host: String,
    port: u16,
    state: AppState,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

impl WebServer {
    pub fn new(host: String, port: u16, state: AppState) -> Self {
        Self { host, port, state }
    }

    pub async fn start(&self) -> Result<(), DomainWatchError> {
        let app = Self::create_router(self.state.clone());

        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| DomainWatchError::Error(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DomainWatchError::Error(format!("Failed to bind to {}: {}", addr, e)))?;

        println!("domainwatch server listening on http://{}", addr);
        log::info!("Server ready to handle requests on {}", addr);

        let scheduler = self.state.scheduler.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                log::info!("Shutdown signal received, stopping auto-check sweep...");
                println!("\nShutdown signal received - stopping server gracefully...");

                scheduler.shutdown().await;

                log::info!("Server shutdown complete");
                println!("   Server stopped");
            })
            .await
            .map_err(|e| DomainWatchError::Error(format!("Server error: {}", e)))?;

        Ok(())
    }

    pub fn create_router(state: AppState) -> Router {
        Router::new()
            // Health check
            .route("/health", get(health_check))

            // Domain registry endpoints
            .route("/api/get-domains", get(api::domains::get_domains))
            .route("/api/add-domain", post(api::domains::add_domain))
            .route("/api/delete-domain", delete(api::domains::delete_domain))

            // Check endpoints
            .route("/api/manual-check", post(api::checks::manual_check))
            .route("/api/check-status", get(api::checks::check_status))

            // Auto-check endpoints
            .route("/api/get-auto", get(api::auto::get_auto))
            .route("/api/auto-check", post(api::auto::auto_check))

            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Waits for a shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received SIGINT (Ctrl+C)");
        },
        _ = terminate => {
            log::info!("Received SIGTERM");
        },
    }
}
