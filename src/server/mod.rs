//! HTTP server for the chat page and the streaming chat endpoint.
//!
//! # Routes
//!
//! - `GET /api/chat?prompt=...`: reply streamed as raw UTF-8 text
//! - `GET /healthz`: liveness probe
//! - everything else: files from the configured static directory

pub mod chat;
pub mod worker;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::generate::{self, Generator};
use worker::InferenceQueue;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Queue in front of the inference worker.
    pub queue: InferenceQueue,
    /// Global configuration.
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Spawn the inference worker for `generator`. Needs a Tokio runtime.
    pub fn new(config: Arc<AppConfig>, generator: Arc<dyn Generator>) -> Self {
        let queue = InferenceQueue::spawn(generator, config.server.queue_depth);
        Self { queue, config }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let static_dir = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/api/chat", get(chat::api_chat))
        .route("/healthz", get(|| async { "ok" }))
        .fallback_service(static_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let generator = generate::from_config(&config.backend)?;

    info!(
        name: "backend.config.loaded",
        backend = generator.name(),
        queue_depth = config.server.queue_depth,
        "Generation backend loaded"
    );

    let state = AppState::new(Arc::clone(&config), generator);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
