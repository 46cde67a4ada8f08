//! Client for Yahoo Finance's public JSON endpoints.
//!
//! The facade treats this as "the upstream data provider": every method maps
//! one logical endpoint to one HTTP call and returns either a typed payload
//! or, for the deeply nested statement tables, the raw JSON subtree.

use chrono::DateTime;
use lens_core::{AnalystTargets, Fundamentals, LensError, NewsArticle, PriceBar, PriceHistory};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const BASE_URL: &str = "https://query2.finance.yahoo.com";

/// Daily bars returned by `price_history`, matching the provider's maximum
/// lookback the analysis prompts were tuned for.
const HISTORY_BARS: usize = 121;

/// Unauthenticated Yahoo endpoints throttle aggressively without a browser
/// user agent.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

/// Sliding-window throttle: at most `max_per_minute` requests per minute.
#[derive(Clone)]
struct RequestThrottle {
    recent: Arc<Mutex<VecDeque<Instant>>>,
    max_per_minute: usize,
}

impl RequestThrottle {
    fn new(max_per_minute: usize) -> Self {
        Self {
            recent: Arc::new(Mutex::new(VecDeque::new())),
            max_per_minute,
        }
    }

    async fn acquire(&self) {
        const WINDOW: Duration = Duration::from_secs(60);
        loop {
            let wait = {
                let mut recent = self.recent.lock().await;
                let now = Instant::now();
                while recent
                    .front()
                    .map_or(false, |t| now.duration_since(*t) >= WINDOW)
                {
                    recent.pop_front();
                }
                if recent.len() < self.max_per_minute {
                    recent.push_back(now);
                    return;
                }
                let oldest = *recent.front().unwrap_or(&now);
                WINDOW.saturating_sub(now.duration_since(oldest))
            };
            tracing::debug!(wait_secs = wait.as_secs_f64(), "throttling Yahoo request");
            tokio::time::sleep(wait + Duration::from_millis(25)).await;
        }
    }
}

#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    throttle: RequestThrottle,
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooClient {
    pub fn new() -> Self {
        let max_per_minute: usize = std::env::var("YAHOO_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            throttle: RequestThrottle::new(max_per_minute),
        }
    }

    /// Send a request through the throttle, retrying 429s with backoff.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, LensError> {
        let request = builder
            .build()
            .map_err(|e| LensError::ApiError(e.to_string()))?;

        for attempt in 0..3u32 {
            self.throttle.acquire().await;
            let req = request
                .try_clone()
                .ok_or_else(|| LensError::ApiError("cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req)
                .await
                .map_err(|e| LensError::ApiError(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }
            tracing::warn!(attempt = attempt + 1, "Yahoo 429, backing off before retry");
            tokio::time::sleep(Duration::from_secs(5 * (attempt as u64 + 1))).await;
        }

        Err(LensError::ApiError(
            "rate limited by Yahoo after 3 attempts".to_string(),
        ))
    }

    /// Daily OHLCV bars for roughly the last six months, newest last.
    pub async fn price_history(&self, symbol: &str) -> Result<PriceHistory, LensError> {
        let url = format!("{}/v8/finance/chart/{}", BASE_URL, symbol);
        let response = self
            .send_request(
                self.client
                    .get(&url)
                    .query(&[("range", "6mo"), ("interval", "1d")]),
            )
            .await?;

        if response.status().as_u16() == 404 {
            return Err(LensError::InvalidSymbol(symbol.to_string()));
        }
        if !response.status().is_success() {
            return Err(LensError::ApiError(format!("HTTP {}", response.status())));
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| LensError::ApiError(e.to_string()))?;

        let result = body
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| {
                LensError::DataUnavailable(format!("no chart data for {symbol}"))
            })?;

        let mut bars = bars_from_chart(&result);
        if bars.len() > HISTORY_BARS {
            bars.drain(..bars.len() - HISTORY_BARS);
        }

        Ok(PriceHistory {
            symbol: symbol.to_string(),
            currency: result.meta.and_then(|m| m.currency),
            bars,
        })
    }

    /// Flattened company fundamentals from the quote-summary modules.
    pub async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals, LensError> {
        let summary = self
            .quote_summary(
                symbol,
                "assetProfile,price,summaryDetail,defaultKeyStatistics,financialData",
            )
            .await?;

        Ok(Fundamentals {
            symbol: symbol.to_string(),
            name: text(&summary, &["price", "longName"]),
            sector: text(&summary, &["assetProfile", "sector"]),
            industry: text(&summary, &["assetProfile", "industry"]),
            business_summary: text(&summary, &["assetProfile", "longBusinessSummary"]),
            market_cap: raw_f64(&summary, &["price", "marketCap"]),
            current_price: raw_f64(&summary, &["financialData", "currentPrice"]),
            trailing_pe: raw_f64(&summary, &["summaryDetail", "trailingPE"]),
            forward_pe: raw_f64(&summary, &["summaryDetail", "forwardPE"]),
            trailing_eps: raw_f64(&summary, &["defaultKeyStatistics", "trailingEps"]),
            price_to_book: raw_f64(&summary, &["defaultKeyStatistics", "priceToBook"]),
            dividend_yield: raw_f64(&summary, &["summaryDetail", "dividendYield"]),
            beta: raw_f64(&summary, &["summaryDetail", "beta"]),
            fifty_two_week_high: raw_f64(&summary, &["summaryDetail", "fiftyTwoWeekHigh"]),
            fifty_two_week_low: raw_f64(&summary, &["summaryDetail", "fiftyTwoWeekLow"]),
            revenue: raw_f64(&summary, &["financialData", "totalRevenue"]),
            profit_margin: raw_f64(&summary, &["financialData", "profitMargins"]),
            debt_to_equity: raw_f64(&summary, &["financialData", "debtToEquity"]),
            return_on_equity: raw_f64(&summary, &["financialData", "returnOnEquity"]),
            free_cash_flow: raw_f64(&summary, &["financialData", "freeCashflow"]),
        })
    }

    /// Analyst price targets and consensus recommendation.
    pub async fn analyst_targets(&self, symbol: &str) -> Result<AnalystTargets, LensError> {
        let summary = self.quote_summary(symbol, "financialData").await?;

        Ok(AnalystTargets {
            symbol: symbol.to_string(),
            current_price: raw_f64(&summary, &["financialData", "currentPrice"]),
            target_mean: raw_f64(&summary, &["financialData", "targetMeanPrice"]),
            target_high: raw_f64(&summary, &["financialData", "targetHighPrice"]),
            target_low: raw_f64(&summary, &["financialData", "targetLowPrice"]),
            analyst_count: raw_f64(&summary, &["financialData", "numberOfAnalystOpinions"])
                .map(|n| n as i64),
            recommendation: text(&summary, &["financialData", "recommendationKey"]),
        })
    }

    /// Upcoming earnings/dividend events, returned as the provider's subtree.
    pub async fn earnings_calendar(&self, symbol: &str) -> Result<Value, LensError> {
        let summary = self.quote_summary(symbol, "calendarEvents").await?;
        module_subtree(summary, "calendarEvents", symbol)
    }

    /// Quarterly income statements, returned as the provider's subtree.
    pub async fn quarterly_income_stmt(&self, symbol: &str) -> Result<Value, LensError> {
        let summary = self
            .quote_summary(symbol, "incomeStatementHistoryQuarterly")
            .await?;
        module_subtree(summary, "incomeStatementHistoryQuarterly", symbol)
    }

    /// Annual balance sheets, returned as the provider's subtree.
    pub async fn balance_sheet(&self, symbol: &str) -> Result<Value, LensError> {
        let summary = self.quote_summary(symbol, "balanceSheetHistory").await?;
        module_subtree(summary, "balanceSheetHistory", symbol)
    }

    /// Option chain for the nearest expiry, returned as the provider's subtree.
    pub async fn option_chain(&self, symbol: &str) -> Result<Value, LensError> {
        let url = format!("{}/v7/finance/options/{}", BASE_URL, symbol);
        let response = self.send_request(self.client.get(&url)).await?;

        if response.status().as_u16() == 404 {
            return Err(LensError::InvalidSymbol(symbol.to_string()));
        }
        if !response.status().is_success() {
            return Err(LensError::ApiError(format!("HTTP {}", response.status())));
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| LensError::ApiError(e.to_string()))?;

        let result = body
            .pointer_mut("/optionChain/result/0")
            .map(Value::take)
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                LensError::DataUnavailable(format!("no option chain for {symbol}"))
            })?;
        Ok(result)
    }

    /// Most recent news articles mentioning the symbol.
    pub async fn news(&self, symbol: &str) -> Result<Vec<NewsArticle>, LensError> {
        let url = format!("{}/v1/finance/search", BASE_URL);
        let response = self
            .send_request(self.client.get(&url).query(&[
                ("q", symbol),
                ("newsCount", "10"),
                ("quotesCount", "0"),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(LensError::ApiError(format!("HTTP {}", response.status())));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| LensError::ApiError(e.to_string()))?;

        Ok(body
            .news
            .into_iter()
            .map(|n| NewsArticle {
                uuid: n.uuid,
                title: n.title,
                publisher: n.publisher,
                link: n.link,
                published_at: n
                    .provider_publish_time
                    .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                summary: n.summary,
            })
            .collect())
    }

    /// Tickers matched by the provider's predefined undervalued-large-caps
    /// screen.
    pub async fn screen_undervalued_large_caps(&self) -> Result<Vec<String>, LensError> {
        let url = format!("{}/v1/finance/screener/predefined/saved", BASE_URL);
        let response = self
            .send_request(
                self.client
                    .get(&url)
                    .query(&[("scrIds", "undervalued_large_caps"), ("count", "25")]),
            )
            .await?;

        if !response.status().is_success() {
            return Err(LensError::ApiError(format!("HTTP {}", response.status())));
        }

        let body: ScreenerResponse = response
            .json()
            .await
            .map_err(|e| LensError::ApiError(e.to_string()))?;

        let quotes = body
            .finance
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .map(|r| r.quotes)
            .unwrap_or_default();

        Ok(quotes.into_iter().map(|q| q.symbol).collect())
    }

    /// Fetch `modules` for a symbol and return the first quote-summary result.
    async fn quote_summary(&self, symbol: &str, modules: &str) -> Result<Value, LensError> {
        let url = format!("{}/v10/finance/quoteSummary/{}", BASE_URL, symbol);
        let response = self
            .send_request(self.client.get(&url).query(&[("modules", modules)]))
            .await?;

        if response.status().as_u16() == 404 {
            return Err(LensError::InvalidSymbol(symbol.to_string()));
        }
        if !response.status().is_success() {
            return Err(LensError::ApiError(format!("HTTP {}", response.status())));
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| LensError::ApiError(e.to_string()))?;

        body.pointer_mut("/quoteSummary/result/0")
            .map(Value::take)
            .filter(|v| !v.is_null())
            .ok_or_else(|| LensError::DataUnavailable(format!("no summary data for {symbol}")))
    }
}

fn module_subtree(summary: Value, module: &str, symbol: &str) -> Result<Value, LensError> {
    match summary.get(module) {
        Some(subtree) if !subtree.is_null() => Ok(subtree.clone()),
        _ => Err(LensError::DataUnavailable(format!(
            "no {module} data for {symbol}"
        ))),
    }
}

/// Walk `path` into a quote-summary value.
fn field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Numbers in quote-summary payloads come either bare or wrapped as
/// `{"raw": n, "fmt": "..."}`.
fn raw_f64(value: &Value, path: &[&str]) -> Option<f64> {
    let v = field(value, path)?;
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => map.get("raw").and_then(Value::as_f64),
        _ => None,
    }
}

fn text(value: &Value, path: &[&str]) -> Option<String> {
    field(value, path)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn bars_from_chart(result: &ChartResult) -> Vec<PriceBar> {
    let timestamps = match &result.timestamp {
        Some(ts) => ts,
        None => return Vec::new(),
    };
    let quote = match result.indicators.quote.first() {
        Some(q) => q,
        None => return Vec::new(),
    };

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let close = quote.close.get(i).copied().flatten();
        let timestamp = DateTime::from_timestamp(ts, 0);
        // Rows with no close are provider gaps (halts, partial sessions).
        let (Some(close), Some(timestamp)) = (close, timestamp) else {
            continue;
        };
        bars.push(PriceBar {
            timestamp,
            open: quote.open.get(i).copied().flatten().unwrap_or(close),
            high: quote.high.get(i).copied().flatten().unwrap_or(close),
            low: quote.low.get(i).copied().flatten().unwrap_or(close),
            close,
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0.0),
        });
    }
    bars
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartOuter,
}

#[derive(Debug, Deserialize)]
struct ChartOuter {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ChartQuote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news: Vec<SearchNews>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchNews {
    uuid: String,
    title: String,
    publisher: Option<String>,
    link: Option<String>,
    provider_publish_time: Option<i64>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScreenerResponse {
    finance: ScreenerOuter,
}

#[derive(Debug, Deserialize)]
struct ScreenerOuter {
    result: Option<Vec<ScreenerResult>>,
}

#[derive(Debug, Deserialize)]
struct ScreenerResult {
    #[serde(default)]
    quotes: Vec<ScreenerQuote>,
}

#[derive(Debug, Deserialize)]
struct ScreenerQuote {
    symbol: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_f64_reads_wrapped_and_bare_numbers() {
        let summary = json!({
            "summaryDetail": {
                "trailingPE": {"raw": 27.5, "fmt": "27.50"},
                "beta": 1.2
            }
        });
        assert_eq!(raw_f64(&summary, &["summaryDetail", "trailingPE"]), Some(27.5));
        assert_eq!(raw_f64(&summary, &["summaryDetail", "beta"]), Some(1.2));
        assert_eq!(raw_f64(&summary, &["summaryDetail", "missing"]), None);
    }

    #[test]
    fn chart_rows_without_close_are_skipped() {
        let body: ChartResponse = serde_json::from_value(json!({
            "chart": {
                "result": [{
                    "meta": {"currency": "USD"},
                    "timestamp": [1700000000, 1700086400, 1700172800],
                    "indicators": {
                        "quote": [{
                            "open":  [10.0, null, 12.0],
                            "high":  [11.0, null, 13.0],
                            "low":   [9.0,  null, 11.0],
                            "close": [10.5, null, 12.5],
                            "volume": [1000.0, null, 2000.0]
                        }]
                    }
                }]
            }
        }))
        .unwrap();

        let result = body.chart.result.unwrap().remove(0);
        let bars = bars_from_chart(&result);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 10.5);
        assert_eq!(bars[1].close, 12.5);
    }

    #[test]
    fn missing_quote_block_yields_no_bars() {
        let result = ChartResult {
            meta: None,
            timestamp: Some(vec![1700000000]),
            indicators: ChartIndicators { quote: Vec::new() },
        };
        assert!(bars_from_chart(&result).is_empty());
    }
}
