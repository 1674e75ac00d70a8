//! Advisor HTTP REST API
//!
//! Axum-based HTTP server exposing the assistant over JSON. Runs alongside
//! the Unix socket IPC server on port 8766 (configurable).
//!
//! Each endpoint is a thin axum handler delegating to an inner function that
//! returns `(StatusCode, body)`, so the logic is testable without dispatch.
//!
//! Endpoints:
//! - GET  /health: component status
//! - GET  /version: server version info
//! - POST /ask: answer a question (chart requests are routed automatically)
//! - POST /chart: render a chart from a description
//! - GET  /assets/:filename: serve a persisted chart

use std::io;
use std::sync::Arc;
use std::time::Instant;

use advisor_core::ipc::{AdvisorRequest, AdvisorResponse, PROTOCOL};
use advisor_core::models::ChatTurn;
use advisor_core::{AdvisorConfig, Assistant};
use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub assistant: Arc<Assistant>,
    pub config: AdvisorConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/ask", post(ask_handler))
        .route("/chart", post(chart_handler))
        .route("/assets/:filename", get(asset_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    assistant: Arc<Assistant>,
    config: AdvisorConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState { assistant, config });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Advisor HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Deserialize)]
pub struct ChartRequest {
    pub description: Option<String>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

fn error_body(msg: impl Into<String>) -> serde_json::Value {
    serde_json::to_value(ErrorResponse::new(msg)).unwrap_or_default()
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check: component status, never touches the network.
pub fn health_inner(assistant: &Assistant, socket_path: &str) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "socket": socket_path,
            "components": assistant.health(),
        }),
    )
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL,
    })
}

/// Inner ask: validates the question and calls the IPC router.
pub async fn ask_inner(assistant: &Assistant, req: AskRequest) -> (StatusCode, serde_json::Value) {
    let question = match req.question {
        Some(q) if !q.trim().is_empty() => q,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                error_body("question field is required"),
            );
        }
    };

    let start = Instant::now();
    let ipc_request = AdvisorRequest::Ask {
        question,
        history: req.history,
    };
    let response = crate::router::handle_request(ipc_request, assistant).await;
    with_timing(response, start)
}

/// Inner chart: validates the description and calls the IPC router.
pub async fn chart_inner(
    assistant: &Assistant,
    req: ChartRequest,
) -> (StatusCode, serde_json::Value) {
    let description = match req.description {
        Some(d) if !d.trim().is_empty() => d,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                error_body("description field is required"),
            );
        }
    };

    let start = Instant::now();
    let response =
        crate::router::handle_request(AdvisorRequest::Chart { description }, assistant).await;
    with_timing(response, start)
}

/// Inner asset lookup: returns (status, content type, bytes).
pub async fn asset_inner(
    assistant: &Assistant,
    filename: &str,
) -> (StatusCode, &'static str, Vec<u8>) {
    match assistant.store().read(filename).await {
        Ok(artifact) => {
            let mime = match artifact.mime_type.as_str() {
                "image/jpeg" => "image/jpeg",
                "image/svg+xml" => "image/svg+xml",
                "application/pdf" => "application/pdf",
                _ => "image/png",
            };
            (StatusCode::OK, mime, artifact.bytes)
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
            (StatusCode::BAD_REQUEST, "text/plain", e.to_string().into_bytes())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "text/plain", b"not found".to_vec())
        }
        Err(e) => {
            tracing::error!(file = filename, error = %e, "Failed to read asset");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                b"failed to read asset".to_vec(),
            )
        }
    }
}

fn with_timing(response: AdvisorResponse, start: Instant) -> (StatusCode, serde_json::Value) {
    let took_ms = start.elapsed().as_millis() as u64;
    match response_to_http(response) {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("took_ms".to_string(), serde_json::json!(took_ms));
            }
            (StatusCode::OK, data)
        }
        Err(e) => (StatusCode::BAD_REQUEST, error_body(e)),
    }
}

// ============================================================================
// Axum handler wrappers (thin wrappers over the inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.assistant, &state.config.service.socket_path);
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn ask_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<AskRequest>,
) -> impl IntoResponse {
    let (status, body) = ask_inner(&state.assistant, req).await;
    (status, Json(body))
}

pub async fn chart_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ChartRequest>,
) -> impl IntoResponse {
    let (status, body) = chart_inner(&state.assistant, req).await;
    (status, Json(body))
}

pub async fn asset_handler(
    State(state): State<Arc<HttpState>>,
    Path(filename): Path<String>,
) -> Response {
    let (status, mime, bytes) = asset_inner(&state.assistant, &filename).await;
    (status, [(header::CONTENT_TYPE, mime)], bytes).into_response()
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert an IPC `AdvisorResponse` into an HTTP body value, or an error string.
pub fn response_to_http(
    response: AdvisorResponse,
) -> std::result::Result<serde_json::Value, String> {
    if response.status == "ok" {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
