//! Technical indicator digest rendered for the AI technical-analysis prompt.
//!
//! Everything here is a pure function over daily bars; the digest is a
//! plain-text block the prompt builder embeds verbatim.

use crate::types::PriceBar;
use std::fmt::Write;

const MIN_BARS: usize = 30;

/// Mean of the trailing `window` values.
pub fn sma(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Exponential moving average series with alpha = 2 / (span + 1).
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    if values.is_empty() || span == 0 {
        return Vec::new();
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// RSI over the trailing `period` deltas (simple gain/loss means).
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let deltas: Vec<f64> = closes
        .windows(2)
        .map(|w| w[1] - w[0])
        .collect();
    let tail = &deltas[deltas.len() - period..];
    let gain: f64 = tail.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
    let loss: f64 = -tail.iter().filter(|d| **d < 0.0).sum::<f64>() / period as f64;
    if loss == 0.0 {
        return Some(100.0);
    }
    let rs = gain / loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Latest MACD(12, 26) value and its 9-period signal line.
pub fn macd(closes: &[f64]) -> Option<(f64, f64)> {
    if closes.len() < 26 {
        return None;
    }
    let ema12 = ema_series(closes, 12);
    let ema26 = ema_series(closes, 26);
    let macd_line: Vec<f64> = ema12
        .iter()
        .zip(ema26.iter())
        .map(|(a, b)| a - b)
        .collect();
    let signal = ema_series(&macd_line, 9);
    Some((*macd_line.last()?, *signal.last()?))
}

/// Bollinger bands (upper, mid, lower) over `window` closes at `k` standard deviations.
pub fn bollinger(closes: &[f64], window: usize, k: f64) -> Option<(f64, f64, f64)> {
    let mid = sma(closes, window)?;
    let tail = &closes[closes.len() - window..];
    let var = tail.iter().map(|c| (c - mid).powi(2)).sum::<f64>() / window as f64;
    let std = var.sqrt();
    Some((mid + k * std, mid, mid - k * std))
}

/// Render the indicator digest used to ground the technical-analysis prompt.
/// Returns an empty string when there is not enough history to be meaningful.
pub fn indicator_digest(bars: &[PriceBar]) -> String {
    if bars.len() < MIN_BARS {
        return String::new();
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let close_latest = closes[closes.len() - 1];

    let mut out = String::new();

    if let (Some(sma20), Some(sma50)) = (sma(&closes, 20), sma(&closes, 50)) {
        let _ = writeln!(out, "- 20-day SMA: ${:.2}", sma20);
        let _ = writeln!(out, "- 50-day SMA: ${:.2}", sma50);
        if close_latest > sma20 {
            let _ = writeln!(out, "- Price is ABOVE 20-day SMA by ${:.2}", close_latest - sma20);
        } else {
            let _ = writeln!(out, "- Price is BELOW 20-day SMA by ${:.2}", sma20 - close_latest);
        }
        if sma20 > sma50 {
            let _ = writeln!(out, "- 20-day SMA > 50-day SMA (bullish)");
        } else {
            let _ = writeln!(out, "- 20-day SMA < 50-day SMA (bearish)");
        }
    }

    if let Some(rsi14) = rsi(&closes, 14) {
        let _ = writeln!(out, "- RSI (14): {:.2}", rsi14);
        if rsi14 > 70.0 {
            let _ = writeln!(out, "  -> Overbought (RSI > 70)");
        } else if rsi14 < 30.0 {
            let _ = writeln!(out, "  -> Oversold (RSI < 30)");
        } else {
            let _ = writeln!(out, "  -> Neutral");
        }
    }

    if let Some((macd_latest, signal_latest)) = macd(&closes) {
        let _ = writeln!(out, "- MACD: {:.4}", macd_latest);
        if macd_latest > signal_latest {
            let _ = writeln!(out, "  -> MACD > Signal (bullish)");
        } else {
            let _ = writeln!(out, "  -> MACD < Signal (bearish)");
        }
    }

    if let Some((upper, mid, lower)) = bollinger(&closes, 20, 2.0) {
        let _ = writeln!(
            out,
            "- Bollinger Bands (20,2): Upper=${:.2}, Mid=${:.2}, Lower=${:.2}",
            upper, mid, lower
        );
        if close_latest > upper {
            let _ = writeln!(out, "  -> Price above upper band (potential overbought)");
        } else if close_latest < lower {
            let _ = writeln!(out, "  -> Price below lower band (potential oversold)");
        } else if upper > lower {
            let pct = (close_latest - lower) / (upper - lower) * 100.0;
            let _ = writeln!(out, "  -> Price {:.1}% within bands", pct);
        }
    }

    if let Some(vol_avg) = sma(&volumes, 20) {
        let vol_latest = volumes[volumes.len() - 1];
        let _ = writeln!(out, "- Current Volume: {:.0}", vol_latest);
        let _ = writeln!(out, "- 20-day Avg Volume: {:.0}", vol_avg);
        if vol_avg > 0.0 {
            let ratio = vol_latest / vol_avg;
            if ratio > 1.5 {
                let _ = writeln!(out, "  -> Volume {:.1}x average (HIGH)", ratio);
            } else if ratio < 0.7 {
                let _ = writeln!(out, "  -> Volume {:.1}x average (LOW)", ratio);
            }
        }
    }

    let recent = &closes[closes.len().saturating_sub(5)..];
    let recent_high = recent.iter().cloned().fold(f64::MIN, f64::max);
    let recent_low = recent.iter().cloned().fold(f64::MAX, f64::min);
    let _ = writeln!(out, "- 5-day High: ${:.2}, Low: ${:.2}", recent_high, recent_low);

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::days(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1_000_000.0,
            })
            .collect()
    }

    #[test]
    fn sma_uses_trailing_window() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 2), Some(4.5));
        assert_eq!(sma(&values, 5), Some(3.0));
        assert_eq!(sma(&values, 6), None);
    }

    #[test]
    fn rsi_saturates_at_100_for_monotonic_gains() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn rsi_is_midrange_for_alternating_moves() {
        let mut closes = vec![100.0];
        for i in 1..30 {
            let prev = closes[i - 1];
            closes.push(if i % 2 == 0 { prev + 1.0 } else { prev - 1.0 });
        }
        let value = rsi(&closes, 14).unwrap();
        assert!(value > 40.0 && value < 60.0, "got {value}");
    }

    #[test]
    fn bollinger_collapses_on_constant_series() {
        let closes = vec![50.0; 25];
        let (upper, mid, lower) = bollinger(&closes, 20, 2.0).unwrap();
        assert_eq!(upper, 50.0);
        assert_eq!(mid, 50.0);
        assert_eq!(lower, 50.0);
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let (macd_latest, _signal) = macd(&closes).unwrap();
        assert!(macd_latest > 0.0);
    }

    #[test]
    fn digest_empty_below_minimum_history() {
        let bars = bars_from_closes(&[100.0; 10]);
        assert_eq!(indicator_digest(&bars), "");
    }

    #[test]
    fn digest_mentions_core_indicators() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64) * 0.5).collect();
        let digest = indicator_digest(&bars_from_closes(&closes));
        assert!(digest.contains("20-day SMA"));
        assert!(digest.contains("RSI (14)"));
        assert!(digest.contains("MACD"));
        assert!(digest.contains("Bollinger Bands"));
        assert!(digest.contains("5-day High"));
    }
}
