//! AI Analysis API Routes
//!
//! Every endpoint goes through the AI-aware cache wrap: the generation
//! backend's reachability is probed before any expensive work, an
//! unreachable backend surfaces as 503, and successful generations are
//! cached market-aware alongside the data they reason about. Composite
//! endpoints (action recommendation, full report) reuse the cached building
//! blocks instead of regenerating them.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use lens_core::{indicators, LensError};
use market_cache::cache_key;
use ollama_client::OllamaError;

use crate::{market_routes, normalize_symbol, prompts, ApiResponse, AppError, AppState};

pub fn ai_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/ai/fundamental-analysis/:symbol",
            get(get_ai_fundamental_analysis),
        )
        .route(
            "/api/ai/balance-sheet-analysis/:symbol",
            get(get_ai_balance_sheet_analysis),
        )
        .route(
            "/api/ai/income-stmt-analysis/:symbol",
            get(get_ai_income_stmt_analysis),
        )
        .route(
            "/api/ai/technical-analysis/:symbol",
            get(get_ai_technical_analysis),
        )
        .route("/api/ai/news-sentiment/:symbol", get(get_ai_news_sentiment))
        .route(
            "/api/ai/action-recommendation/:symbol",
            get(get_ai_action_recommendation),
        )
        .route(
            "/api/ai/action-recommendation-sentence/:symbol",
            get(get_ai_action_recommendation_sentence),
        )
        .route(
            "/api/ai/action-recommendation-word/:symbol",
            get(get_ai_action_recommendation_word),
        )
        .route("/api/ai/full-report/:symbol", get(get_ai_full_report))
}

fn ai_unavailable(err: OllamaError) -> LensError {
    LensError::AiUnavailable(err.to_string())
}

async fn availability(state: &AppState) -> Result<(), LensError> {
    state.ollama.health().await.map_err(ai_unavailable)
}

pub(crate) async fn fundamental_analysis(
    state: &AppState,
    symbol: &str,
) -> Result<String, LensError> {
    let key = cache_key("ai-fundamental-analysis", symbol);
    state
        .cache
        .get_or_compute_ai(
            &key,
            move || availability(state),
            move || async move {
                let fundamentals = market_routes::fetch_fundamentals(state, symbol).await?;
                let data = serde_json::to_string(&fundamentals)
                    .map_err(|e| LensError::ApiError(e.to_string()))?;
                state
                    .ollama
                    .generate(&prompts::value_analysis(&data))
                    .await
                    .map_err(ai_unavailable)
            },
        )
        .await
}

pub(crate) async fn balance_sheet_analysis(
    state: &AppState,
    symbol: &str,
) -> Result<String, LensError> {
    let key = cache_key("ai-balance-sheet-analysis", symbol);
    state
        .cache
        .get_or_compute_ai(
            &key,
            move || availability(state),
            move || async move {
                let sheet = market_routes::fetch_balance_sheet(state, symbol).await?;
                state
                    .ollama
                    .generate(&prompts::value_analysis(&sheet.to_string()))
                    .await
                    .map_err(ai_unavailable)
            },
        )
        .await
}

pub(crate) async fn income_stmt_analysis(
    state: &AppState,
    symbol: &str,
) -> Result<String, LensError> {
    let key = cache_key("ai-income-stmt-analysis", symbol);
    state
        .cache
        .get_or_compute_ai(
            &key,
            move || availability(state),
            move || async move {
                let statement = market_routes::fetch_income_stmt(state, symbol).await?;
                state
                    .ollama
                    .generate(&prompts::value_analysis(&statement.to_string()))
                    .await
                    .map_err(ai_unavailable)
            },
        )
        .await
}

pub(crate) async fn technical_analysis(
    state: &AppState,
    symbol: &str,
) -> Result<String, LensError> {
    let key = cache_key("ai-technical-analysis", symbol);
    state
        .cache
        .get_or_compute_ai(
            &key,
            move || availability(state),
            move || async move {
                let history = market_routes::fetch_price_history(state, symbol).await?;
                let digest = indicators::indicator_digest(&history.bars);
                if digest.is_empty() {
                    return Err(LensError::DataUnavailable(format!(
                        "not enough price history for {symbol}"
                    )));
                }
                state
                    .ollama
                    .generate_with_system(
                        prompts::TECHNICAL_SYSTEM,
                        &prompts::technical_analysis(symbol, &digest),
                    )
                    .await
                    .map_err(ai_unavailable)
            },
        )
        .await
}

pub(crate) async fn news_sentiment(state: &AppState, symbol: &str) -> Result<String, LensError> {
    let key = cache_key("ai-news-sentiment", symbol);
    state
        .cache
        .get_or_compute_ai(
            &key,
            move || availability(state),
            move || async move {
                let news = market_routes::fetch_news(state, symbol).await?;
                let summaries: Vec<String> = news
                    .iter()
                    .map(|a| a.summary.clone().unwrap_or_else(|| a.title.clone()))
                    .filter(|s| !s.is_empty())
                    .take(5)
                    .collect();
                if summaries.is_empty() {
                    return Ok("No news available for analysis.".to_string());
                }
                state
                    .ollama
                    .generate(&prompts::news_sentiment(&summaries.join("\n")))
                    .await
                    .map_err(ai_unavailable)
            },
        )
        .await
}

pub(crate) async fn action_recommendation(
    state: &AppState,
    symbol: &str,
) -> Result<String, LensError> {
    let key = cache_key("ai-action-recommendation", symbol);
    state
        .cache
        .get_or_compute_ai(
            &key,
            move || availability(state),
            move || async move {
                let technical = technical_analysis(state, symbol).await?;
                let fundamental = fundamental_analysis(state, symbol).await?;
                state
                    .ollama
                    .generate(&prompts::action_recommendation(
                        symbol,
                        &technical,
                        &fundamental,
                    ))
                    .await
                    .map_err(ai_unavailable)
            },
        )
        .await
}

pub(crate) async fn action_recommendation_sentence(
    state: &AppState,
    symbol: &str,
) -> Result<String, LensError> {
    let key = cache_key("ai-action-sentence", symbol);
    state
        .cache
        .get_or_compute_ai(
            &key,
            move || availability(state),
            move || async move {
                let action = action_recommendation(state, symbol).await?;
                state
                    .ollama
                    .generate(&prompts::summary_sentence(&action))
                    .await
                    .map_err(ai_unavailable)
            },
        )
        .await
}

pub(crate) async fn action_recommendation_word(
    state: &AppState,
    symbol: &str,
) -> Result<String, LensError> {
    let key = cache_key("ai-action-word", symbol);
    state
        .cache
        .get_or_compute_ai(
            &key,
            move || availability(state),
            move || async move {
                let action = action_recommendation(state, symbol).await?;
                let word = state
                    .ollama
                    .generate(&prompts::single_word(&action))
                    .await
                    .map_err(ai_unavailable)?;
                Ok(word.trim().to_uppercase())
            },
        )
        .await
}

pub(crate) async fn full_report(state: &AppState, symbol: &str) -> Result<String, LensError> {
    let key = cache_key("ai-full-report", symbol);
    state
        .cache
        .get_or_compute_ai(
            &key,
            move || availability(state),
            move || async move {
                let fundamental = fundamental_analysis(state, symbol).await?;
                let technical = technical_analysis(state, symbol).await?;
                let action = action_recommendation(state, symbol).await?;
                let targets = market_routes::fetch_analyst_targets(state, symbol).await?;
                let targets = serde_json::to_string(&targets)
                    .map_err(|e| LensError::ApiError(e.to_string()))?;
                state
                    .ollama
                    .generate(&prompts::full_report(
                        symbol,
                        &fundamental,
                        &technical,
                        &action,
                        &targets,
                    ))
                    .await
                    .map_err(ai_unavailable)
            },
        )
        .await
}

#[utoipa::path(
    get,
    path = "/api/ai/fundamental-analysis/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses(
        (status = 200, description = "AI fundamental analysis"),
        (status = 503, description = "Generation backend unavailable")
    ),
    tag = "AI Analysis"
)]
pub async fn get_ai_fundamental_analysis(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let text = fundamental_analysis(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(text)))
}

#[utoipa::path(
    get,
    path = "/api/ai/balance-sheet-analysis/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses(
        (status = 200, description = "AI balance sheet analysis"),
        (status = 503, description = "Generation backend unavailable")
    ),
    tag = "AI Analysis"
)]
pub async fn get_ai_balance_sheet_analysis(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let text = balance_sheet_analysis(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(text)))
}

#[utoipa::path(
    get,
    path = "/api/ai/income-stmt-analysis/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses(
        (status = 200, description = "AI income statement analysis"),
        (status = 503, description = "Generation backend unavailable")
    ),
    tag = "AI Analysis"
)]
pub async fn get_ai_income_stmt_analysis(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let text = income_stmt_analysis(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(text)))
}

#[utoipa::path(
    get,
    path = "/api/ai/technical-analysis/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses(
        (status = 200, description = "AI technical analysis"),
        (status = 503, description = "Generation backend unavailable")
    ),
    tag = "AI Analysis"
)]
pub async fn get_ai_technical_analysis(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let text = technical_analysis(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(text)))
}

#[utoipa::path(
    get,
    path = "/api/ai/news-sentiment/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses(
        (status = 200, description = "AI news sentiment"),
        (status = 503, description = "Generation backend unavailable")
    ),
    tag = "AI Analysis"
)]
pub async fn get_ai_news_sentiment(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let text = news_sentiment(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(text)))
}

#[utoipa::path(
    get,
    path = "/api/ai/action-recommendation/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses(
        (status = 200, description = "AI buy/sell/hold recommendation"),
        (status = 503, description = "Generation backend unavailable")
    ),
    tag = "AI Analysis"
)]
pub async fn get_ai_action_recommendation(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let text = action_recommendation(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(text)))
}

#[utoipa::path(
    get,
    path = "/api/ai/action-recommendation-sentence/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses(
        (status = 200, description = "One-sentence recommendation"),
        (status = 503, description = "Generation backend unavailable")
    ),
    tag = "AI Analysis"
)]
pub async fn get_ai_action_recommendation_sentence(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let text = action_recommendation_sentence(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(text)))
}

#[utoipa::path(
    get,
    path = "/api/ai/action-recommendation-word/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses(
        (status = 200, description = "Single-word BUY/SELL/HOLD"),
        (status = 503, description = "Generation backend unavailable")
    ),
    tag = "AI Analysis"
)]
pub async fn get_ai_action_recommendation_word(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let text = action_recommendation_word(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(text)))
}

#[utoipa::path(
    get,
    path = "/api/ai/full-report/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses(
        (status = 200, description = "Comprehensive AI report"),
        (status = 503, description = "Generation backend unavailable")
    ),
    tag = "AI Analysis"
)]
pub async fn get_ai_full_report(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let symbol = normalize_symbol(&symbol)?;
    let text = full_report(&state, &symbol).await?;
    Ok(Json(ApiResponse::success(text)))
}
