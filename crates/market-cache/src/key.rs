//! Cache key construction and parsing.
//!
//! Keys follow the `endpoint:SYMBOL[:k=v...]` convention. The store treats a
//! caller's key as opaque for lookups, but symbol invalidation and the stats
//! breakdown rely on this shape, so keys built elsewhere must preserve it.

use crate::error::CacheError;

/// Build a cache key for an endpoint/symbol pair.
pub fn cache_key(endpoint: &str, symbol: &str) -> String {
    format!("{}:{}", endpoint, symbol.trim().to_uppercase())
}

/// Build a cache key with extra discriminators. Extras are sorted by name so
/// the same logical request always produces the same key.
pub fn cache_key_with(endpoint: &str, symbol: &str, extras: &[(&str, &str)]) -> String {
    let mut key = cache_key(endpoint, symbol);
    let mut extras: Vec<&(&str, &str)> = extras.iter().collect();
    extras.sort_by_key(|(name, _)| *name);
    for (name, value) in extras {
        key.push(':');
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    key
}

/// Reject empty or malformed keys before they reach storage.
pub(crate) fn validate_key(key: &str) -> Result<&str, CacheError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    if trimmed.starts_with(':') {
        return Err(CacheError::InvalidKey(format!(
            "key has empty endpoint segment: {trimmed}"
        )));
    }
    Ok(trimmed)
}

/// Split a key into its (endpoint, symbol) segments. A key without a symbol
/// segment yields an empty symbol, which management queries simply never match.
pub(crate) fn split_key(key: &str) -> (String, String) {
    let mut parts = key.splitn(3, ':');
    let endpoint = parts.next().unwrap_or_default().to_string();
    let symbol = parts.next().unwrap_or_default().to_string();
    (endpoint, symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_uppercased_key() {
        assert_eq!(cache_key("fundamentals", "aapl"), "fundamentals:AAPL");
    }

    #[test]
    fn extras_are_sorted_for_determinism() {
        let a = cache_key_with("price-history", "TSLA", &[("range", "121d"), ("interval", "1d")]);
        let b = cache_key_with("price-history", "TSLA", &[("interval", "1d"), ("range", "121d")]);
        assert_eq!(a, b);
        assert_eq!(a, "price-history:TSLA:interval=1d:range=121d");
    }

    #[test]
    fn splits_endpoint_and_symbol() {
        assert_eq!(
            split_key("price-history:TSLA:interval=1d"),
            ("price-history".to_string(), "TSLA".to_string())
        );
        assert_eq!(split_key("screen-undervalued"), ("screen-undervalued".to_string(), String::new()));
    }

    #[test]
    fn rejects_empty_and_malformed_keys() {
        assert!(matches!(validate_key(""), Err(CacheError::InvalidKey(_))));
        assert!(matches!(validate_key("   "), Err(CacheError::InvalidKey(_))));
        assert!(matches!(validate_key(":AAPL"), Err(CacheError::InvalidKey(_))));
        assert!(validate_key("fundamentals:AAPL").is_ok());
    }
}
