//! Cache management routes, consumed by operators rather than the hot path.

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use market_cache::CacheStats;
use serde::Serialize;

use crate::{normalize_symbol, ApiResponse, AppError, AppState};

pub fn cache_routes() -> Router<AppState> {
    Router::new()
        .route("/api/cache/stats", get(get_cache_stats))
        .route("/api/cache/purge", post(purge_expired))
        .route("/api/cache/symbol/:symbol", delete(invalidate_symbol))
        .route("/api/cache/endpoint/:endpoint", delete(clear_endpoint))
        .route("/api/cache", delete(flush_cache))
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: u64,
}

#[utoipa::path(
    get,
    path = "/api/cache/stats",
    responses((status = 200, description = "Point-in-time cache statistics")),
    tag = "Cache"
)]
pub async fn get_cache_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CacheStats>>, AppError> {
    let stats = state.cache.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

#[utoipa::path(
    post,
    path = "/api/cache/purge",
    responses((status = 200, description = "Expired entries removed")),
    tag = "Cache"
)]
pub async fn purge_expired(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RemovedResponse>>, AppError> {
    let removed = state.cache.purge_expired().await?;
    Ok(Json(ApiResponse::success(RemovedResponse { removed })))
}

#[utoipa::path(
    delete,
    path = "/api/cache/symbol/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "All entries for the symbol removed")),
    tag = "Cache"
)]
pub async fn invalidate_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<RemovedResponse>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let removed = state.cache.invalidate_symbol(&symbol).await?;
    Ok(Json(ApiResponse::success(RemovedResponse { removed })))
}

#[utoipa::path(
    delete,
    path = "/api/cache/endpoint/{endpoint}",
    params(("endpoint" = String, Path, description = "Endpoint name prefix")),
    responses((status = 200, description = "All entries for the endpoint removed")),
    tag = "Cache"
)]
pub async fn clear_endpoint(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
) -> Result<Json<ApiResponse<RemovedResponse>>, AppError> {
    let removed = state.cache.clear_endpoint(&endpoint).await?;
    Ok(Json(ApiResponse::success(RemovedResponse { removed })))
}

#[utoipa::path(
    delete,
    path = "/api/cache",
    responses((status = 200, description = "Cache flushed")),
    tag = "Cache"
)]
pub async fn flush_cache(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RemovedResponse>>, AppError> {
    let removed = state.cache.clear_all().await?;
    Ok(Json(ApiResponse::success(RemovedResponse { removed })))
}
