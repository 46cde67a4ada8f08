//! Liveness endpoints for the service and the generation backend.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ollama", get(health_ollama))
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "MarketLens Stock Analysis API",
        "docs": "/docs",
    }))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "Health"
)]
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "marketlens-api",
    }))
}

#[utoipa::path(
    get,
    path = "/health/ollama",
    responses(
        (status = 200, description = "Generation backend reachable"),
        (status = 503, description = "Generation backend unreachable")
    ),
    tag = "Health"
)]
pub async fn health_ollama(State(state): State<AppState>) -> impl IntoResponse {
    match state.ollama.health().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "ollama_host": state.ollama.base_url(),
                "ollama_reachable": true,
            })),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "Ollama health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "ollama_host": state.ollama.base_url(),
                    "ollama_reachable": false,
                    "error": err.to_string(),
                })),
            )
        }
    }
}
