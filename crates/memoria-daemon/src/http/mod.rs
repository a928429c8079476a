//! HTTP transport: builds the axum [`Router`] for the memory API and runs it
//! with graceful shutdown, mirroring the teacher's own HTTP transport
//! (`vestige-mcp`'s `protocol::http`) generalized from a single JSON-RPC
//! endpoint to the full route table this daemon exposes.

pub mod error;
mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::facade::MemoryFacade;
use error::ApiError;

/// Shared handler state: the facade plus everything needed for `/status` and
/// the bearer-token check, never a store or provider type directly.
pub struct AppState {
    facade: Arc<MemoryFacade>,
    api_key: Option<String>,
    store_backend: &'static str,
    embedder_mode: &'static str,
    started_at: Instant,
}

impl AppState {
    pub fn new(facade: Arc<MemoryFacade>, api_key: Option<String>, store_backend: &'static str, embedder_mode: &'static str) -> Self {
        Self { facade, api_key, store_backend, embedder_mode, started_at: Instant::now() }
    }
}

/// Checks `Authorization: Bearer <MEMORY_API_KEY>` against the configured
/// key. If no key was configured, every request passes — the daemon is
/// assumed to run behind a trusted network boundary in that mode.
async fn require_api_key(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if let Some(expected) = &state.api_key {
        let provided = request.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
        let matches = provided.and_then(|v| v.strip_prefix("Bearer ")).map(|token| token == expected).unwrap_or(false);
        if !matches {
            return ApiError(memoria_core::error::CoreError::Unauthorized).into_response();
        }
    }
    next.run(request).await
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/status", get(routes::status))
        .route("/remember", post(routes::remember))
        .route("/recall", get(routes::recall))
        .route("/forget/{id}", delete(routes::forget))
        .route("/export", get(routes::export))
        .route("/purge", post(routes::purge))
        .route("/clear", delete(routes::clear))
        .route("/decay", post(routes::decay))
        .route("/decay/expiration-candidates", get(routes::decay_expiration_candidates))
        .route("/decay/promote-archival/{id}", post(routes::promote_archival))
        .route("/reflect", post(routes::reflect))
        .route("/reflect/jobs", get(routes::reflect_jobs))
        .route("/reflect/jobs/{id}", get(routes::reflect_job))
        .route("/deduplicate", post(routes::deduplicate))
        .route("/contradictions/enhance", post(routes::contradictions_enhance))
        .route("/contradictions/{memoryId}", get(routes::contradictions_for_memory))
        .route("/entities", get(routes::entities_list))
        .route("/entities/search", get(routes::entities_search))
        .route("/entities/{slug}", get(routes::entity_get))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new().route("/health", get(routes::health)).merge(protected).layer(TraceLayer::new_for_http()).with_state(state)
}

async fn shutdown_signal(mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let external = async {
        loop {
            if *shutdown.borrow() {
                return;
            }
            if shutdown.changed().await.is_err() {
                return;
            }
        }
    };
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = external => info!("shutdown signal received from the dispatcher watch channel"),
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

/// Binds and serves the router on `port` until ctrl-c, SIGTERM, or the
/// shared `shutdown` watch channel fires.
pub async fn serve(state: Arc<AppState>, port: u16, shutdown: tokio::sync::watch::Receiver<bool>) -> Result<(), std::io::Error> {
    let app = build_router(state);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "memoriad HTTP transport listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown)).await
}
