//! Prompt builders for the AI analysis endpoints.
//!
//! Prompts embed the cached provider payloads verbatim; the model never
//! fetches anything itself.

pub const TECHNICAL_SYSTEM: &str = "You are a professional technical analyst. \
    Analyze the provided technical indicators and price data to identify trends, \
    support/resistance, momentum shifts, and actionable signals. Be specific and \
    data-driven.";

/// Value-investor take on fundamentals, balance sheets, and income statements.
pub fn value_analysis(data: &str) -> String {
    format!(
        "You are Benjamin Graham, a renowned value investor. Please provide \
         your expert insights and guidance on valuation metrics, fundamental \
         analysis, and potential risks and rewards {data}."
    )
}

pub fn technical_analysis(symbol: &str, indicator_digest: &str) -> String {
    format!(
        "Analyze {symbol} technical setup based on these calculated indicators:\n\n\
         {indicator_digest}\n\n\
         Based on these technical indicators, provide analysis of:\n\
         1. Current trend direction and strength\n\
         2. Key support and resistance levels\n\
         3. Momentum signals from RSI and MACD\n\
         4. Volume confirmation of price moves\n\
         5. Specific technical entry and exit levels\n\
         6. Risk/reward setup for trades\n\
         \nBe specific. Use the indicator values provided."
    )
}

pub fn action_recommendation(symbol: &str, technical: &str, fundamental: &str) -> String {
    format!(
        "You are an expert and experienced stock broker specializing in \
         retirement accounts. Please analyze this information and recommend to \
         buy, sell, or hold: {symbol} {technical} {fundamental}"
    )
}

pub fn summary_sentence(analysis: &str) -> String {
    format!(
        "You are an expert editor. Please summarize this into a single \
         sentence, including the most important information needed to make an \
         actionable decision about buying, selling, or holding. {analysis}"
    )
}

pub fn single_word(analysis: &str) -> String {
    format!(
        "You are producing input to a software program. Please summarize this \
         into a single word: either BUY, SELL, or HOLD. Do not use any \
         punctuation, use only upper case letters, and do not say anything \
         other than the single word or you will cause software bugs. {analysis}"
    )
}

pub fn news_sentiment(combined_summaries: &str) -> String {
    format!(
        "Based on the following recent news summaries, determine if the \
         overall sentiment is good or bad for investors. Respond in a single \
         sentence summarizing whether the news is positive, negative, or \
         neutral for the stock. News summaries:\n{combined_summaries}"
    )
}

pub fn full_report(
    symbol: &str,
    fundamental: &str,
    technical: &str,
    action: &str,
    analyst_targets: &str,
) -> String {
    format!(
        "I am seeking an expert-level analysis of my recent financial report, \
         requiring a high degree of technical knowledge and experience in \
         public company valuation. Please provide a detailed breakdown of \
         revenue growth, profitability, cash flow, or balance sheet trends, \
         along with recommendations for improvement. Ensure that your analysis \
         is grounded in the latest industry research and best practices. \
         {symbol} {fundamental} {technical} {action} {analyst_targets}"
    )
}
