//! Trading-session arithmetic and the expiration rule.
//!
//! A regular session runs 09:30-16:00 US/Eastern, Monday through Friday.
//! No holiday calendar is consulted. The session interval is half-open:
//! the open instant is inside the session, the close instant is outside.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::US::Eastern;

/// Absolute ceiling: entries older than this are expired regardless of
/// market state.
pub const MAX_AGE_HOURS: i64 = 24;

/// Regular-session boundaries in the exchange's local time.
#[derive(Debug, Clone, Copy)]
pub struct TradingCalendar {
    open: NaiveTime,
    close: NaiveTime,
}

impl Default for TradingCalendar {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 30, 0).expect("valid open time"),
            close: NaiveTime::from_hms_opt(16, 0, 0).expect("valid close time"),
        }
    }
}

impl TradingCalendar {
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Most recent trading day on or before `date`.
    fn latest_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date;
        while !self.is_trading_day(day) {
            day = day - Duration::days(1);
        }
        day
    }

    fn session_open(&self, day: NaiveDate) -> DateTime<Utc> {
        to_utc(day, self.open)
    }

    fn session_close(&self, day: NaiveDate) -> DateTime<Utc> {
        to_utc(day, self.close)
    }

    /// Decide whether an entry written at `cached_at` is expired at `now`.
    ///
    /// Rule 1: the 24-hour ceiling applies to every entry, and is the only
    /// rule for entries that are not market-aware.
    ///
    /// Rule 2 (market-aware): inside today's session, anything cached before
    /// today's open is stale. Outside the session, an entry is stale only
    /// once the reference session (today on a weekday, the most recent
    /// weekday otherwise) has fully completed and the entry predates its
    /// open. Data cached during a session therefore survives the close,
    /// the night, and the weekend, until the next open or the ceiling.
    pub fn is_expired(
        &self,
        cached_at: DateTime<Utc>,
        market_aware: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if now.signed_duration_since(cached_at) > Duration::hours(MAX_AGE_HOURS) {
            return true;
        }
        if !market_aware {
            return false;
        }

        let today = now.with_timezone(&Eastern).date_naive();
        if self.is_trading_day(today) {
            let open = self.session_open(today);
            let close = self.session_close(today);
            if now >= open && now < close {
                return cached_at < open;
            }
            cached_at < open && now >= close
        } else {
            let reference = self.latest_trading_day(today);
            cached_at < self.session_open(reference) && now >= self.session_close(reference)
        }
    }
}

fn to_utc(day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Eastern
        .from_local_datetime(&day.and_time(time))
        .earliest()
        .expect("session times never fall in a DST gap")
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2025-01-06 is a Monday; 2025-01-10/11/12 are Fri/Sat/Sun.
    fn et(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Eastern
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn cal() -> TradingCalendar {
        TradingCalendar::default()
    }

    #[test]
    fn ceiling_bounds_all_entries() {
        let cached = et(2025, 1, 6, 10, 0);
        assert!(!cal().is_expired(cached, false, cached + Duration::minutes(23 * 60 + 59)));
        assert!(cal().is_expired(cached, false, cached + Duration::minutes(24 * 60 + 1)));
        // Market-aware entries hit the same ceiling even when the session
        // rule alone would keep them alive.
        assert!(cal().is_expired(cached, true, cached + Duration::minutes(24 * 60 + 1)));
    }

    #[test]
    fn non_market_aware_ignores_session_boundaries() {
        // Cached pre-open, queried mid-session: only the ceiling matters.
        let cached = et(2025, 1, 6, 8, 0);
        assert!(!cal().is_expired(cached, false, et(2025, 1, 6, 14, 0)));
    }

    #[test]
    fn expires_at_the_open_boundary() {
        // Cached one minute before the open: stale at the open instant.
        assert!(cal().is_expired(et(2025, 1, 6, 9, 29), true, et(2025, 1, 6, 9, 30)));
        // Cached exactly at the open: still fresh a minute later.
        assert!(!cal().is_expired(et(2025, 1, 6, 9, 30), true, et(2025, 1, 6, 9, 31)));
    }

    #[test]
    fn pre_open_cache_is_live_until_the_open() {
        let cached = et(2025, 1, 6, 9, 0);
        assert!(!cal().is_expired(cached, true, et(2025, 1, 6, 9, 15)));
        assert!(cal().is_expired(cached, true, et(2025, 1, 6, 9, 35)));
    }

    #[test]
    fn pre_open_cache_expires_once_session_completes() {
        let cached = et(2025, 1, 6, 9, 0);
        // 15:59 is inside the session, 16:00 is outside but the session has
        // completed; both see the pre-open entry as stale.
        assert!(cal().is_expired(cached, true, et(2025, 1, 6, 15, 59)));
        assert!(cal().is_expired(cached, true, et(2025, 1, 6, 16, 0)));
    }

    #[test]
    fn intraday_cache_survives_overnight_until_next_open() {
        let cached = et(2025, 1, 6, 9, 35);
        assert!(!cal().is_expired(cached, true, et(2025, 1, 6, 16, 0)));
        assert!(!cal().is_expired(cached, true, et(2025, 1, 7, 0, 0)));
        assert!(!cal().is_expired(cached, true, et(2025, 1, 7, 9, 29)));
        assert!(cal().is_expired(cached, true, et(2025, 1, 7, 9, 30)));
    }

    #[test]
    fn close_boundary_is_outside_the_session() {
        // Cached mid-session, queried exactly at close: live.
        assert!(!cal().is_expired(et(2025, 1, 6, 10, 0), true, et(2025, 1, 6, 16, 0)));
    }

    #[test]
    fn weekend_uses_most_recent_weekday_session() {
        // Cached during Friday's session: valid through Saturday (under 24h).
        assert!(!cal().is_expired(et(2025, 1, 10, 10, 0), true, et(2025, 1, 11, 9, 0)));
        // Cached before Friday's open: Friday's session has completed, stale.
        assert!(cal().is_expired(et(2025, 1, 10, 9, 0), true, et(2025, 1, 11, 8, 0)));
    }

    #[test]
    fn weekend_write_survives_to_monday_preopen() {
        // Written Sunday evening, queried Monday before the open: the new
        // session has not started, so it is still live.
        let cached = et(2025, 1, 12, 20, 0);
        assert!(!cal().is_expired(cached, true, et(2025, 1, 13, 8, 0)));
        assert!(cal().is_expired(cached, true, et(2025, 1, 13, 9, 30)));
    }
}
