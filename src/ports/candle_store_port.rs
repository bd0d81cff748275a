//! Candle persistence port.

use crate::domain::candle::Candle;
use crate::domain::error::SmartExpertError;
use crate::domain::market::{Symbol, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Close prices per symbol name, each series ordered by time.
pub type CloseSeries = BTreeMap<String, Vec<(DateTime<Utc>, f64)>>;

pub trait CandleStore {
    /// Insert every row whose `(symbol, timeframe, time)` is not yet stored.
    ///
    /// Returns the number of rows actually inserted. The call is atomic: on
    /// error nothing from this batch is visible.
    fn upsert_batch(&self, rows: &[Candle]) -> Result<usize, SmartExpertError>;

    fn read_close_series(&self, timeframe: Timeframe) -> Result<CloseSeries, SmartExpertError>;

    /// First timestamp, last timestamp and row count for a pair.
    fn data_range(
        &self,
        symbol: Symbol,
        timeframe: Timeframe,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, SmartExpertError>;
}
