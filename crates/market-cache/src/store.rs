//! SQLite-backed cache store.
//!
//! One row per logical request key. Expiration is never stored; it is
//! recomputed on every read from `(cached_at, market_aware, now)`, so a row
//! that was live a minute ago can read as a miss now without any writer
//! touching it. Reads never delete; reclamation happens through the explicit
//! management calls.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use crate::key::{split_key, validate_key};
use crate::session::TradingCalendar;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS cache_entries (
        cache_key TEXT PRIMARY KEY,
        endpoint TEXT NOT NULL,
        symbol TEXT NOT NULL DEFAULT '',
        payload TEXT NOT NULL,
        cached_at TEXT NOT NULL,
        market_aware INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_cache_entries_symbol ON cache_entries(symbol)",
    "CREATE INDEX IF NOT EXISTS idx_cache_entries_endpoint ON cache_entries(endpoint)",
];

/// Row counts for one endpoint or symbol group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupCount {
    pub name: String,
    pub count: u64,
}

/// Consistent point-in-time snapshot of the store. All counts are computed
/// from a single scan against a single "now", so `total_entries` always
/// equals `live_entries + expired_entries` and the breakdown sums match.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub live_entries: u64,
    pub expired_entries: u64,
    pub by_endpoint: Vec<GroupCount>,
    pub by_symbol: Vec<GroupCount>,
    pub payload_bytes: u64,
    pub oldest_live_age_secs: Option<i64>,
    pub newest_live_age_secs: Option<i64>,
}

#[derive(Clone)]
pub struct CacheStore {
    pool: SqlitePool,
    calendar: TradingCalendar,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Open (creating if missing) the cache database and bootstrap the schema.
    pub async fn new(database_url: &str) -> Result<Self, CacheError> {
        Self::with_clock(database_url, Arc::new(SystemClock)).await
    }

    /// Open the store with an injected clock. Tests pin the clock to exact
    /// session boundaries; production uses [`SystemClock`].
    pub async fn with_clock(
        database_url: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // An in-memory SQLite database exists per connection, so the pool
        // must not grow past one there or the schema vanishes.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            calendar: TradingCalendar::default(),
            clock,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), CacheError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Look up a live entry. Returns `Ok(None)` for both a missing key and an
    /// expired row; a stored JSON `null` comes back as `Some(Value::Null)`,
    /// so callers can tell a miss from a cached null. Expired rows are left
    /// in place; reads have no side effects.
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let key = validate_key(key)?;
        let row = sqlx::query(
            "SELECT payload, cached_at, market_aware FROM cache_entries WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            tracing::debug!(key, "cache miss");
            return Ok(None);
        };

        let cached_at: DateTime<Utc> = row.try_get("cached_at")?;
        let market_aware: bool = row.try_get("market_aware")?;
        if self
            .calendar
            .is_expired(cached_at, market_aware, self.clock.now())
        {
            tracing::debug!(key, "cache entry expired");
            return Ok(None);
        }

        let payload: String = row.try_get("payload")?;
        let value = serde_json::from_str(&payload)?;
        tracing::debug!(key, "cache hit");
        Ok(Some(value))
    }

    /// Upsert a payload under `key` with `cached_at = now`. Overwrites are
    /// atomic: a concurrent reader sees either the old row or the new one,
    /// never a mix.
    pub async fn set<T>(&self, key: &str, payload: &T, market_aware: bool) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let key = validate_key(key)?;
        let (endpoint, symbol) = split_key(key);
        let json = serde_json::to_string(payload)?;
        let now = self.clock.now();

        sqlx::query(
            "INSERT INTO cache_entries (cache_key, endpoint, symbol, payload, cached_at, market_aware)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(cache_key) DO UPDATE SET
                 payload = excluded.payload,
                 cached_at = excluded.cached_at,
                 market_aware = excluded.market_aware",
        )
        .bind(key)
        .bind(&endpoint)
        .bind(&symbol)
        .bind(&json)
        .bind(now)
        .bind(market_aware)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove every entry whose key carries the given symbol, regardless of
    /// expiration state. Returns the number of rows removed.
    pub async fn invalidate_symbol(&self, symbol: &str) -> Result<u64, CacheError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(CacheError::InvalidKey("symbol must not be empty".to_string()));
        }
        let result = sqlx::query("DELETE FROM cache_entries WHERE symbol = ?")
            .bind(&symbol)
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected();
        tracing::info!(%symbol, removed, "invalidated cached entries for symbol");
        Ok(removed)
    }

    /// Delete every row the expiration rule marks stale right now. Purely a
    /// storage-reclamation call; `get` already treats stale rows as misses.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let now = self.clock.now();
        let rows =
            sqlx::query("SELECT cache_key, cached_at, market_aware FROM cache_entries")
                .fetch_all(&self.pool)
                .await?;

        let mut stale_keys = Vec::new();
        for row in &rows {
            let cached_at: DateTime<Utc> = row.try_get("cached_at")?;
            let market_aware: bool = row.try_get("market_aware")?;
            if self.calendar.is_expired(cached_at, market_aware, now) {
                stale_keys.push(row.try_get::<String, _>("cache_key")?);
            }
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for key in &stale_keys {
            removed += sqlx::query("DELETE FROM cache_entries WHERE cache_key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        tracing::info!(removed, "purged expired cache entries");
        Ok(removed)
    }

    /// Flush the entire store. Returns the number of rows removed.
    pub async fn clear_all(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected();
        tracing::info!(removed, "cleared cache");
        Ok(removed)
    }

    /// Remove every entry for one endpoint prefix.
    pub async fn clear_endpoint(&self, endpoint: &str) -> Result<u64, CacheError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(CacheError::InvalidKey("endpoint must not be empty".to_string()));
        }
        let result = sqlx::query("DELETE FROM cache_entries WHERE endpoint = ?")
            .bind(endpoint)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Snapshot the store. One scan, one "now".
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let now = self.clock.now();
        let rows = sqlx::query(
            "SELECT endpoint, symbol, cached_at, market_aware, length(payload) AS bytes
             FROM cache_entries",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut live = 0u64;
        let mut expired = 0u64;
        let mut payload_bytes = 0u64;
        let mut by_endpoint = std::collections::BTreeMap::<String, u64>::new();
        let mut by_symbol = std::collections::BTreeMap::<String, u64>::new();
        let mut oldest_live: Option<i64> = None;
        let mut newest_live: Option<i64> = None;

        for row in &rows {
            let endpoint: String = row.try_get("endpoint")?;
            let symbol: String = row.try_get("symbol")?;
            let cached_at: DateTime<Utc> = row.try_get("cached_at")?;
            let market_aware: bool = row.try_get("market_aware")?;
            let bytes: i64 = row.try_get("bytes")?;

            payload_bytes += bytes.max(0) as u64;
            *by_endpoint.entry(endpoint).or_default() += 1;
            if !symbol.is_empty() {
                *by_symbol.entry(symbol).or_default() += 1;
            }

            if self.calendar.is_expired(cached_at, market_aware, now) {
                expired += 1;
            } else {
                live += 1;
                let age = now.signed_duration_since(cached_at).num_seconds();
                oldest_live = Some(oldest_live.map_or(age, |a| a.max(age)));
                newest_live = Some(newest_live.map_or(age, |a| a.min(age)));
            }
        }

        Ok(CacheStats {
            total_entries: rows.len() as u64,
            live_entries: live,
            expired_entries: expired,
            by_endpoint: into_sorted_counts(by_endpoint),
            by_symbol: into_sorted_counts(by_symbol),
            payload_bytes,
            oldest_live_age_secs: oldest_live,
            newest_live_age_secs: newest_live,
        })
    }

    /// Check the cache, and on a miss run `compute`, store its result, and
    /// return it. Storage failures on the read path degrade to a miss so a
    /// cache outage never takes down the data path; failures on the write
    /// path are logged and the fresh value is still returned.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        market_aware: bool,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get::<T>(key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(err) => tracing::warn!(key, error = %err, "cache read failed; treating as miss"),
        }

        let fresh = compute().await?;
        self.store_result(key, &fresh, market_aware).await;
        Ok(fresh)
    }

    /// Like [`get_or_compute`], but for generation-backed endpoints: confirm
    /// the backend is reachable before computing, and propagate its
    /// unavailability instead of caching a failure. Successes are stored
    /// market-aware, since the facts the generated text reasons about are
    /// themselves session-bound.
    ///
    /// [`get_or_compute`]: CacheStore::get_or_compute
    pub async fn get_or_compute_ai<T, E, A, AFut, F, Fut>(
        &self,
        key: &str,
        availability: A,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        A: FnOnce() -> AFut,
        AFut: Future<Output = Result<(), E>>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get::<T>(key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(err) => tracing::warn!(key, error = %err, "cache read failed; treating as miss"),
        }

        availability().await?;
        let fresh = compute().await?;
        self.store_result(key, &fresh, true).await;
        Ok(fresh)
    }

    async fn store_result<T: Serialize>(&self, key: &str, value: &T, market_aware: bool) {
        match self.set(key, value, market_aware).await {
            Ok(()) => {}
            // An unserializable payload is a caller bug, not an outage.
            Err(err @ CacheError::Serialization(_)) => {
                tracing::error!(key, error = %err, "cache write dropped unserializable payload");
            }
            Err(err) => tracing::warn!(key, error = %err, "cache write failed"),
        }
    }
}

fn into_sorted_counts(map: std::collections::BTreeMap<String, u64>) -> Vec<GroupCount> {
    let mut counts: Vec<GroupCount> = map
        .into_iter()
        .map(|(name, count)| GroupCount { name, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::ManualClock;
    use crate::key::cache_key;
    use chrono::TimeZone;
    use chrono_tz::US::Eastern;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn et(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Eastern
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    async fn store_at(start: DateTime<Utc>) -> (CacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        let store = CacheStore::with_clock("sqlite::memory:", clock.clone())
            .await
            .unwrap();
        (store, clock)
    }

    // Monday 2025-01-06, one hour before the 09:30 open.
    fn monday_preopen() -> DateTime<Utc> {
        et(2025, 1, 6, 8, 30)
    }

    #[tokio::test]
    async fn read_after_write_returns_identical_payload() {
        let (store, _) = store_at(monday_preopen()).await;
        let payload = json!({
            "pe": 42.1,
            "tags": ["value", "large-cap"],
            "nested": {"eps": null, "ok": true}
        });

        store.set("fundamentals:TSLA", &payload, true).await.unwrap();
        let cached: Value = store.get("fundamentals:TSLA").await.unwrap().unwrap();
        assert_eq!(cached, payload);
    }

    #[tokio::test]
    async fn plain_string_payload_round_trips() {
        let (store, _) = store_at(monday_preopen()).await;
        let text = "HOLD until the next earnings call".to_string();

        store.set("ai-word:AAPL", &text, true).await.unwrap();
        let cached: String = store.get("ai-word:AAPL").await.unwrap().unwrap();
        assert_eq!(cached, text);
    }

    #[tokio::test]
    async fn miss_is_distinguishable_from_cached_null() {
        let (store, _) = store_at(monday_preopen()).await;

        let missing: Option<Value> = store.get("fundamentals:NOPE").await.unwrap();
        assert!(missing.is_none());

        store.set("fundamentals:AAPL", &Value::Null, false).await.unwrap();
        let cached: Option<Value> = store.get("fundamentals:AAPL").await.unwrap();
        assert_eq!(cached, Some(Value::Null));
    }

    #[tokio::test]
    async fn overwrite_keeps_a_single_row() {
        let (store, _) = store_at(monday_preopen()).await;
        store.set("price-history:MSFT", &json!({"close": 100}), true).await.unwrap();
        store.set("price-history:MSFT", &json!({"close": 105}), true).await.unwrap();

        let cached: Value = store.get("price-history:MSFT").await.unwrap().unwrap();
        assert_eq!(cached, json!({"close": 105}));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test]
    async fn symbol_invalidation_removes_exactly_that_symbol() {
        let (store, _) = store_at(monday_preopen()).await;
        store.set("fundamentals:AAPL", &json!(1), true).await.unwrap();
        store.set("price-history:AAPL", &json!(2), true).await.unwrap();
        store.set("fundamentals:MSFT", &json!(3), true).await.unwrap();

        let removed = store.invalidate_symbol("aapl").await.unwrap();
        assert_eq!(removed, 2);

        assert!(store.get::<Value>("fundamentals:AAPL").await.unwrap().is_none());
        assert!(store.get::<Value>("price-history:AAPL").await.unwrap().is_none());
        assert!(store.get::<Value>("fundamentals:MSFT").await.unwrap().is_some());

        assert_eq!(store.invalidate_symbol("TSLA").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn market_aware_entry_expires_at_the_open() {
        // Scenario: cached before the open, queried before and after it.
        let (store, clock) = store_at(et(2025, 1, 6, 9, 0)).await;
        store.set("fundamentals:TSLA", &json!({"pe": 42.1}), true).await.unwrap();

        clock.set(et(2025, 1, 6, 9, 15));
        let live: Option<Value> = store.get("fundamentals:TSLA").await.unwrap();
        assert_eq!(live, Some(json!({"pe": 42.1})));

        clock.set(et(2025, 1, 6, 9, 35));
        let stale: Option<Value> = store.get("fundamentals:TSLA").await.unwrap();
        assert!(stale.is_none());

        // The stale row is still on disk; reads never delete.
        assert_eq!(store.stats().await.unwrap().total_entries, 1);
    }

    #[tokio::test]
    async fn non_market_aware_entry_lives_through_the_open() {
        let (store, clock) = store_at(et(2025, 1, 6, 9, 0)).await;
        store.set("ai-report:TSLA", &json!("long writeup"), false).await.unwrap();

        clock.set(et(2025, 1, 6, 14, 0));
        assert!(store.get::<Value>("ai-report:TSLA").await.unwrap().is_some());

        clock.set(et(2025, 1, 7, 9, 30));
        assert!(store.get::<Value>("ai-report:TSLA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let (store, clock) = store_at(et(2025, 1, 6, 9, 0)).await;
        // Two market-aware rows cached pre-open become stale at the open.
        store.set("fundamentals:AAPL", &json!(1), true).await.unwrap();
        store.set("news:AAPL", &json!(2), true).await.unwrap();
        // Three rows that only age out at the 24h ceiling.
        store.set("ai-report:AAPL", &json!(3), false).await.unwrap();
        store.set("ai-report:MSFT", &json!(4), false).await.unwrap();
        store.set("screen-undervalued:ALL", &json!(5), false).await.unwrap();

        clock.set(et(2025, 1, 6, 10, 0));
        let removed = store.purge_expired().await.unwrap();
        assert_eq!(removed, 2);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.live_entries, 3);
        assert_eq!(stats.expired_entries, 0);
    }

    #[tokio::test]
    async fn stats_snapshot_reconciles() {
        let (store, clock) = store_at(et(2025, 1, 6, 9, 0)).await;
        store.set("fundamentals:AAPL", &json!(1), true).await.unwrap();
        store.set("fundamentals:MSFT", &json!(2), true).await.unwrap();
        store.set("news:AAPL", &json!(3), false).await.unwrap();

        clock.set(et(2025, 1, 6, 9, 35));
        let stats = store.stats().await.unwrap();

        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.live_entries + stats.expired_entries, stats.total_entries);
        assert_eq!(stats.live_entries, 1);
        assert_eq!(stats.expired_entries, 2);

        let endpoint_sum: u64 = stats.by_endpoint.iter().map(|g| g.count).sum();
        assert_eq!(endpoint_sum, stats.total_entries);
        let symbol_sum: u64 = stats.by_symbol.iter().map(|g| g.count).sum();
        assert_eq!(symbol_sum, stats.total_entries);

        assert!(stats.payload_bytes > 0);
        assert_eq!(stats.oldest_live_age_secs, Some(35 * 60));
        assert_eq!(stats.newest_live_age_secs, Some(35 * 60));
    }

    #[tokio::test]
    async fn clear_all_reports_removed_rows() {
        let (store, _) = store_at(monday_preopen()).await;
        store.set("fundamentals:AAPL", &json!(1), true).await.unwrap();
        store.set("news:AAPL", &json!(2), false).await.unwrap();

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert_eq!(store.stats().await.unwrap().total_entries, 0);
    }

    #[tokio::test]
    async fn clear_endpoint_scopes_to_prefix() {
        let (store, _) = store_at(monday_preopen()).await;
        store.set("fundamentals:AAPL", &json!(1), true).await.unwrap();
        store.set("fundamentals:MSFT", &json!(2), true).await.unwrap();
        store.set("news:AAPL", &json!(3), false).await.unwrap();

        assert_eq!(store.clear_endpoint("fundamentals").await.unwrap(), 2);
        assert!(store.get::<Value>("news:AAPL").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rejects_invalid_keys_and_symbols() {
        let (store, _) = store_at(monday_preopen()).await;
        assert!(matches!(
            store.get::<Value>("").await,
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            store.set("", &json!(1), false).await,
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            store.invalidate_symbol("  ").await,
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn get_or_compute_fetches_once_then_serves_hits() {
        let (store, _) = store_at(monday_preopen()).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let key = cache_key("fundamentals", "NVDA");

        for _ in 0..3 {
            let calls = calls.clone();
            let value: Value = store
                .get_or_compute(&key, true, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(json!({"pe": 60.0}))
                })
                .await
                .unwrap();
            assert_eq!(value, json!({"pe": 60.0}));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_or_compute_falls_through_when_storage_is_down() {
        let (store, _) = store_at(monday_preopen()).await;
        store.pool.close().await;

        let value: Value = store
            .get_or_compute("fundamentals:AMD", false, || async {
                Ok::<_, String>(json!({"pe": 30.0}))
            })
            .await
            .unwrap();
        assert_eq!(value, json!({"pe": 30.0}));
    }

    #[tokio::test]
    async fn ai_wrapper_propagates_unavailability_without_caching() {
        let (store, _) = store_at(monday_preopen()).await;
        let key = cache_key("ai-fundamental-analysis", "AAPL");

        let result: Result<String, String> = store
            .get_or_compute_ai(
                &key,
                || async { Err("generation backend unreachable".to_string()) },
                || async { Ok("never computed".to_string()) },
            )
            .await;
        assert!(result.is_err());
        assert!(store.get::<String>(&key).await.unwrap().is_none());

        // Backend back up: computed once, then served from cache even if the
        // availability probe would fail again.
        let text: String = store
            .get_or_compute_ai(
                &key,
                || async { Ok::<_, String>(()) },
                || async { Ok("a measured, data-driven take".to_string()) },
            )
            .await
            .unwrap();
        assert_eq!(text, "a measured, data-driven take");

        let hit: String = store
            .get_or_compute_ai(
                &key,
                || async { Err("down again".to_string()) },
                || async { Ok("unused".to_string()) },
            )
            .await
            .unwrap();
        assert_eq!(hit, "a measured, data-driven take");
    }
}
