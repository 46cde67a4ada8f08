//! Market Data API Routes
//!
//! Cached pass-through endpoints to the upstream data provider. Each fetch
//! helper builds the canonical cache key, asks the store for a live entry,
//! and only hits the provider on a miss. The helpers are shared with the AI
//! routes so generated analysis reads the same cached data the raw endpoints
//! serve.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use lens_core::{AnalystTargets, Fundamentals, LensError, NewsArticle, PriceHistory};
use market_cache::cache_key;
use serde_json::Value;

use crate::{normalize_symbol, ApiResponse, AppError, AppState};

pub fn market_routes() -> Router<AppState> {
    Router::new()
        .route("/api/fundamentals/:symbol", get(get_fundamentals))
        .route("/api/price-history/:symbol", get(get_price_history))
        .route("/api/analyst-targets/:symbol", get(get_analyst_targets))
        .route("/api/calendar/:symbol", get(get_calendar))
        .route("/api/income-stmt/:symbol", get(get_income_stmt))
        .route("/api/balance-sheet/:symbol", get(get_balance_sheet))
        .route("/api/option-chain/:symbol", get(get_option_chain))
        .route("/api/news/:symbol", get(get_news))
        .route("/api/screen-undervalued", get(get_screen_undervalued))
}

pub(crate) async fn fetch_fundamentals(
    state: &AppState,
    symbol: &str,
) -> Result<Fundamentals, LensError> {
    let key = cache_key("fundamentals", symbol);
    let yahoo = state.yahoo.clone();
    let symbol = symbol.to_string();
    state
        .cache
        .get_or_compute(&key, true, move || async move {
            yahoo.fundamentals(&symbol).await
        })
        .await
}

pub(crate) async fn fetch_price_history(
    state: &AppState,
    symbol: &str,
) -> Result<PriceHistory, LensError> {
    let key = cache_key("price-history", symbol);
    let yahoo = state.yahoo.clone();
    let symbol = symbol.to_string();
    state
        .cache
        .get_or_compute(&key, true, move || async move {
            yahoo.price_history(&symbol).await
        })
        .await
}

pub(crate) async fn fetch_analyst_targets(
    state: &AppState,
    symbol: &str,
) -> Result<AnalystTargets, LensError> {
    let key = cache_key("analyst-targets", symbol);
    let yahoo = state.yahoo.clone();
    let symbol = symbol.to_string();
    state
        .cache
        .get_or_compute(&key, true, move || async move {
            yahoo.analyst_targets(&symbol).await
        })
        .await
}

pub(crate) async fn fetch_calendar(state: &AppState, symbol: &str) -> Result<Value, LensError> {
    let key = cache_key("calendar", symbol);
    let yahoo = state.yahoo.clone();
    let symbol = symbol.to_string();
    state
        .cache
        .get_or_compute(&key, true, move || async move {
            yahoo.earnings_calendar(&symbol).await
        })
        .await
}

pub(crate) async fn fetch_income_stmt(state: &AppState, symbol: &str) -> Result<Value, LensError> {
    let key = cache_key("income-stmt", symbol);
    let yahoo = state.yahoo.clone();
    let symbol = symbol.to_string();
    state
        .cache
        .get_or_compute(&key, true, move || async move {
            yahoo.quarterly_income_stmt(&symbol).await
        })
        .await
}

pub(crate) async fn fetch_balance_sheet(
    state: &AppState,
    symbol: &str,
) -> Result<Value, LensError> {
    let key = cache_key("balance-sheet", symbol);
    let yahoo = state.yahoo.clone();
    let symbol = symbol.to_string();
    state
        .cache
        .get_or_compute(&key, true, move || async move {
            yahoo.balance_sheet(&symbol).await
        })
        .await
}

pub(crate) async fn fetch_option_chain(
    state: &AppState,
    symbol: &str,
) -> Result<Value, LensError> {
    let key = cache_key("option-chain", symbol);
    let yahoo = state.yahoo.clone();
    let symbol = symbol.to_string();
    state
        .cache
        .get_or_compute(&key, true, move || async move {
            yahoo.option_chain(&symbol).await
        })
        .await
}

pub(crate) async fn fetch_news(
    state: &AppState,
    symbol: &str,
) -> Result<Vec<NewsArticle>, LensError> {
    let key = cache_key("news", symbol);
    let yahoo = state.yahoo.clone();
    let symbol = symbol.to_string();
    state
        .cache
        .get_or_compute(&key, true, move || async move { yahoo.news(&symbol).await })
        .await
}

pub(crate) async fn fetch_screen_undervalued(
    state: &AppState,
) -> Result<Vec<String>, LensError> {
    let key = cache_key("screen-undervalued", "large-caps");
    let yahoo = state.yahoo.clone();
    state
        .cache
        .get_or_compute(&key, true, move || async move {
            yahoo.screen_undervalued_large_caps().await
        })
        .await
}

#[utoipa::path(
    get,
    path = "/api/fundamentals/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "Company fundamentals")),
    tag = "Market Data"
)]
pub async fn get_fundamentals(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<Fundamentals>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let data = fetch_fundamentals(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(data)))
}

#[utoipa::path(
    get,
    path = "/api/price-history/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "Daily OHLCV bars")),
    tag = "Market Data"
)]
pub async fn get_price_history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<PriceHistory>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let data = fetch_price_history(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(data)))
}

#[utoipa::path(
    get,
    path = "/api/analyst-targets/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "Analyst price targets and consensus")),
    tag = "Market Data"
)]
pub async fn get_analyst_targets(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<AnalystTargets>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let data = fetch_analyst_targets(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(data)))
}

#[utoipa::path(
    get,
    path = "/api/calendar/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "Upcoming earnings and dividend events")),
    tag = "Market Data"
)]
pub async fn get_calendar(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let data = fetch_calendar(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(data)))
}

#[utoipa::path(
    get,
    path = "/api/income-stmt/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "Quarterly income statements")),
    tag = "Market Data"
)]
pub async fn get_income_stmt(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let data = fetch_income_stmt(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(data)))
}

#[utoipa::path(
    get,
    path = "/api/balance-sheet/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "Annual balance sheets")),
    tag = "Market Data"
)]
pub async fn get_balance_sheet(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let data = fetch_balance_sheet(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(data)))
}

#[utoipa::path(
    get,
    path = "/api/option-chain/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "Option chain for the nearest expiry")),
    tag = "Market Data"
)]
pub async fn get_option_chain(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let data = fetch_option_chain(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(data)))
}

#[utoipa::path(
    get,
    path = "/api/news/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "Recent news articles")),
    tag = "Market Data"
)]
pub async fn get_news(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<Vec<NewsArticle>>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let data = fetch_news(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(data)))
}

#[utoipa::path(
    get,
    path = "/api/screen-undervalued",
    responses((status = 200, description = "Undervalued large-cap tickers")),
    tag = "Market Data"
)]
pub async fn get_screen_undervalued(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let data = fetch_screen_undervalued(&state).await?;
    Ok(Json(ApiResponse::success(data)))
}
