use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Price history for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistory {
    pub symbol: String,
    pub currency: Option<String>,
    pub bars: Vec<PriceBar>,
}

/// Company fundamentals, flattened from the provider's quote-summary modules.
/// Fields the provider omits for a given symbol stay `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fundamentals {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub business_summary: Option<String>,
    pub market_cap: Option<f64>,
    pub current_price: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub trailing_eps: Option<f64>,
    pub price_to_book: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub revenue: Option<f64>,
    pub profit_margin: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub free_cash_flow: Option<f64>,
}

/// Analyst price targets and consensus recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystTargets {
    pub symbol: String,
    pub current_price: Option<f64>,
    pub target_mean: Option<f64>,
    pub target_high: Option<f64>,
    pub target_low: Option<f64>,
    pub analyst_count: Option<i64>,
    pub recommendation: Option<String>,
}

/// One news article for a symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub uuid: String,
    pub title: String,
    pub publisher: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}
