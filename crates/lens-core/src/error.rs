use thiserror::Error;

#[derive(Error, Debug)]
pub enum LensError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Upstream data unavailable: {0}")]
    DataUnavailable(String),

    #[error("AI service unavailable: {0}")]
    AiUnavailable(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Cache error: {0}")]
    CacheError(String),
}
