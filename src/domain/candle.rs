//! Candle representation and in-batch deduplication.

use crate::domain::market::{Symbol, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// One bar as returned by the broker feed, before it is tied to a pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: i64,
    pub spread: i64,
    pub real_volume: i64,
}

/// A persisted OHLC bar. Identity is `(symbol, timeframe, time)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: i64,
    pub spread: i64,
    pub real_volume: i64,
}

impl Candle {
    pub fn from_raw(symbol: Symbol, timeframe: Timeframe, bar: &RawBar) -> Self {
        Self {
            symbol,
            timeframe,
            time: bar.time,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            tick_volume: bar.tick_volume,
            spread: bar.spread,
            real_volume: bar.real_volume,
        }
    }

    pub fn key(&self) -> (Symbol, Timeframe, DateTime<Utc>) {
        (self.symbol, self.timeframe, self.time)
    }
}

/// Drop bars whose timestamp already appeared earlier in the batch.
///
/// The first occurrence wins, matching the store's insert-or-ignore rule, and
/// the relative order of the survivors is preserved.
pub fn dedup_by_timestamp(bars: Vec<RawBar>) -> Vec<RawBar> {
    let mut seen = HashSet::with_capacity(bars.len());
    bars.into_iter().filter(|b| seen.insert(b.time)).collect()
}

/// Convert a fetched batch into candles for one pair, deduplicated.
pub fn to_candles(symbol: Symbol, timeframe: Timeframe, bars: Vec<RawBar>) -> Vec<Candle> {
    dedup_by_timestamp(bars)
        .iter()
        .map(|b| Candle::from_raw(symbol, timeframe, b))
        .collect()
}
