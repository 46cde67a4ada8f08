//! MarketLens REST API server.
//!
//! Thin facade over the market-data provider and the generation backend.
//! Every data and AI endpoint is wrapped by the market-aware cache so repeat
//! requests inside a trading session are served from storage.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use lens_core::LensError;
use market_cache::{CacheError, CacheStore};
use ollama_client::OllamaClient;
use yahoo_client::YahooClient;

pub mod ai_routes;
pub mod cache_routes;
pub mod health_routes;
pub mod market_routes;
pub mod prompts;

#[derive(Clone)]
pub struct AppState {
    pub cache: CacheStore,
    pub yahoo: YahooClient,
    pub ollama: OllamaClient,
}

/// Uniform response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Route-level error mapping domain failures onto HTTP statuses.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AppError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

impl From<LensError> for AppError {
    fn from(err: LensError) -> Self {
        match err {
            LensError::AiUnavailable(m) => AppError::Unavailable(m),
            LensError::InvalidSymbol(s) => AppError::NotFound(format!("unknown symbol: {s}")),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidKey(m) => AppError::BadRequest(m),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

/// Validate and canonicalize a ticker symbol from the request path.
pub(crate) fn normalize_symbol(raw: &str) -> Result<String, AppError> {
    let symbol = raw.trim().to_uppercase();
    let well_formed = !symbol.is_empty()
        && symbol.len() <= 10
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !well_formed {
        return Err(AppError::BadRequest(format!("invalid symbol: {raw}")));
    }
    Ok(symbol)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_routes::health,
        health_routes::health_ollama,
        market_routes::get_fundamentals,
        market_routes::get_price_history,
        market_routes::get_analyst_targets,
        market_routes::get_calendar,
        market_routes::get_income_stmt,
        market_routes::get_balance_sheet,
        market_routes::get_option_chain,
        market_routes::get_news,
        market_routes::get_screen_undervalued,
        ai_routes::get_ai_fundamental_analysis,
        ai_routes::get_ai_balance_sheet_analysis,
        ai_routes::get_ai_income_stmt_analysis,
        ai_routes::get_ai_technical_analysis,
        ai_routes::get_ai_news_sentiment,
        ai_routes::get_ai_action_recommendation,
        ai_routes::get_ai_action_recommendation_sentence,
        ai_routes::get_ai_action_recommendation_word,
        ai_routes::get_ai_full_report,
        cache_routes::get_cache_stats,
        cache_routes::purge_expired,
        cache_routes::invalidate_symbol,
        cache_routes::clear_endpoint,
        cache_routes::flush_cache,
    ),
    tags(
        (name = "Health", description = "Service and backend liveness"),
        (name = "Market Data", description = "Cached pass-through to the market-data provider"),
        (name = "AI Analysis", description = "Cached AI-generated analysis"),
        (name = "Cache", description = "Cache management operations")
    )
)]
struct ApiDoc;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes::health_routes())
        .merge(market_routes::market_routes())
        .merge(ai_routes::ai_routes())
        .merge(cache_routes::cache_routes())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Starting MarketLens API server");

    let database_url =
        std::env::var("CACHE_DATABASE_URL").unwrap_or_else(|_| "sqlite:cache.db".to_string());
    let cache = CacheStore::new(&database_url).await?;
    tracing::info!(%database_url, "cache store ready");

    let ollama = OllamaClient::with_defaults()?;
    tracing::info!(
        ollama_host = ollama.base_url(),
        model = ollama.model(),
        "generation backend configured"
    );

    let state = AppState {
        cache,
        yahoo: YahooClient::new(),
        ollama,
    };

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let addr = format!("{host}:{port}");
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_normalized_and_validated() {
        assert_eq!(normalize_symbol(" aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_symbol("brk.b").unwrap(), "BRK.B");
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("not a symbol").is_err());
        assert!(normalize_symbol("WAYTOOLONGSYMBOL").is_err());
    }
}
