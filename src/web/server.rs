//! HTTP server: routes, shared state and graceful shutdown.

use std::net::SocketAddr;
use std::path::Path;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::download::Coordinator;
use crate::web::{delivery, pages, socket};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
}

/// Builds the router. Anything not matched by a route is looked up in `public_dir`.
pub fn create_router(coordinator: Coordinator, public_dir: &Path) -> Router {
    let state = AppState { coordinator };

    Router::new()
        .route("/", get(pages::index))
        .route("/ws", get(socket::ws_handler))
        .route("/download-file/{filename}", get(delivery::download_file))
        .route("/download", post(delivery::direct_download))
        .route("/health", get(health_handler))
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
}

/// Serves until SIGINT/SIGTERM, then stops every active session.
pub async fn run_server(addr: SocketAddr, coordinator: Coordinator, public_dir: &Path) -> anyhow::Result<()> {
    let app = create_router(coordinator.clone(), public_dir);

    let listener = TcpListener::bind(&addr).await?;
    log::info!("Server running on http://{}", listener.local_addr()?);
    log::info!("  /                          - Landing page");
    log::info!("  /ws                        - Progress channel (WebSocket)");
    log::info!("  /download-file/{{filename}} - Staged file delivery");
    log::info!("  /download                  - Direct streaming (POST)");
    log::info!("  /health                    - Health check");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    log::info!("Shutting down, stopping {} active download(s)", coordinator.active_sessions());
    coordinator.shutdown().await;
    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_downloads": state.coordinator.active_sessions(),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C"),
        _ = terminate => log::info!("Received SIGTERM"),
    }
}
