//! HTTP surface: health, DOM scan, LLM analysis and its event stream.

pub mod error;
pub mod handlers;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::browser_pool::BrowserPool;
use crate::config::ServerConfig;
use crate::llm::{LlmClient, LlmConfig};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub pool: Arc<BrowserPool>,
    pub llm: Arc<LlmClient>,
}

impl AppState {
    /// No browser starts until the first request needs one
    pub fn new(config: ServerConfig, llm: LlmClient) -> Self {
        let pool = BrowserPool::new(config.pool.clone());
        Self {
            config: Arc::new(config),
            pool: Arc::new(pool),
            llm: Arc::new(llm),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let screenshots = ServeDir::new(&state.config.screenshot_dir);
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/scan", get(handlers::scan))
        .route("/api/analyze-url", get(handlers::analyze_url))
        .route("/api/analyze-url-stream", get(handlers::analyze_url_stream))
        .nest_service("/screenshots", screenshots)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run until Ctrl-C, then close pooled browsers
pub async fn serve(config: ServerConfig) -> Result<()> {
    let llm = LlmClient::new(LlmConfig::from_env());
    if !llm.config().is_configured() {
        warn!("No LLM API key set; analysis responses will carry a parseError");
    }

    let addr = config.bind_addr();
    let state = AppState::new(config, llm);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    info!("Shutting down");
    state.pool.close_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
