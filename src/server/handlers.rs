use axum::Json;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use url::Url;

use super::AppState;
use super::error::ApiError;
use crate::capture;
use crate::llm::MAX_PROMPT_HTML_CHARS;
use crate::pipeline::{self, UrlAnalysis};
use crate::snapshot::{self, truncate_chars};
use crate::types::DomAnalysis;

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    pub url: Option<String>,
}

/// Accept only absolute http, https and file URLs
pub fn validate_url(raw: Option<&str>) -> Result<Url, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing url query parameter".to_string()))?;

    let url =
        Url::parse(raw).map_err(|e| ApiError::BadRequest(format!("Invalid url '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" | "file" => Ok(url),
        scheme => Err(ApiError::BadRequest(format!(
            "Unsupported url scheme '{}': use http, https or file",
            scheme
        ))),
    }
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "browser": state.config.pool.browser_type,
        "llmConfigured": state.llm.config().is_configured(),
    }))
}

pub async fn scan(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<DomAnalysis>, ApiError> {
    let url = validate_url(query.url.as_deref())?;
    let lease = state.pool.acquire().await?;
    let result = pipeline::scan(&lease, url.as_str(), &state.config).await;
    state.pool.release(lease).await;
    Ok(Json(result?))
}

pub async fn analyze_url(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<UrlAnalysis>, ApiError> {
    let url = validate_url(query.url.as_deref())?;
    let lease = state.pool.acquire().await?;
    let result = pipeline::analyze(&lease, &state.llm, url.as_str(), &state.config).await;
    state.pool.release(lease).await;

    let mut analysis = result?;
    analysis.screenshot = analysis.screenshot.map(screenshot_path);
    Ok(Json(analysis))
}

/// Public path of a stored screenshot
pub fn screenshot_path(name: String) -> String {
    format!("/screenshots/{}", name)
}

pub async fn analyze_url_stream(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let url = validate_url(query.url.as_deref())?;
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(stream_analysis(state, url.to_string(), EventSink { tx }));

    let stream = ReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

struct EventSink {
    tx: mpsc::Sender<Event>,
}

impl EventSink {
    /// Returns false once the client has gone away
    async fn send(&self, name: &str, data: impl Serialize) -> bool {
        let event = match Event::default().event(name).json_data(data) {
            Ok(event) => event,
            Err(e) => {
                warn!("Could not encode {} event: {}", name, e);
                return !self.tx.is_closed();
            }
        };
        self.tx.send(event).await.is_ok()
    }

    async fn status(&self, stage: &str, message: impl Into<String>) -> bool {
        self.send("status", json!({ "stage": stage, "message": message.into() }))
            .await
    }

    async fn error(&self, error: ApiError) {
        warn!("Stream analysis failed: {}", error);
        self.send("error", error.body()).await;
    }
}

async fn stream_analysis(state: AppState, url: String, sink: EventSink) {
    if !sink.status("browser", "Starting browser").await {
        return;
    }
    let lease = match state.pool.acquire().await {
        Ok(lease) => lease,
        Err(e) => return sink.error(e.into()).await,
    };

    sink.status("navigate", format!("Loading {}", url)).await;
    let bundle = match capture::collect(&lease, &url, state.config.settle).await {
        Ok(bundle) => bundle,
        Err(e) => {
            state.pool.release(lease).await;
            return sink.error(e.into()).await;
        }
    };
    state.pool.release(lease).await;

    sink.send("console", json!({ "errors": bundle.console_errors }))
        .await;
    sink.send("network", json!({ "errors": bundle.network_errors }))
        .await;

    match snapshot::head(&bundle.html) {
        Ok(head) => {
            sink.send("head", head).await;
        }
        Err(e) => debug!("Could not parse head: {}", e),
    }
    match snapshot::body(&bundle.html) {
        Ok(body) => {
            let html = truncate_chars(&body, MAX_PROMPT_HTML_CHARS);
            let truncated = html.len() < body.len();
            sink.send("body", json!({ "html": html, "truncated": truncated }))
                .await;
        }
        Err(e) => debug!("Could not parse body: {}", e),
    }

    if !sink.status("analyze", "Asking the model").await {
        info!("Client left before analysis of {}", url);
        return;
    }
    let screenshot = pipeline::store_screenshot(&bundle, &state.config).map(screenshot_path);
    let verdict = state.llm.analyze(&bundle).await;
    sink.send("complete", pipeline::assemble(bundle, screenshot, verdict))
        .await;
}
