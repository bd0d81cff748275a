#![allow(dead_code)]

use chrono::{DateTime, Utc};
use smartexpert::adapters::sqlite_adapter::SqliteAdapter;
pub use smartexpert::domain::candle::RawBar;
use smartexpert::domain::error::SmartExpertError;
use smartexpert::domain::market::{Symbol, Timeframe};
use smartexpert::ports::feed_port::{Credentials, FeedPort, FeedSession};
use std::cell::Cell;
use std::collections::HashMap;

pub struct MockFeed {
    pub bars: HashMap<(Symbol, Timeframe), Vec<RawBar>>,
    pub errors: HashMap<(Symbol, Timeframe), String>,
    pub refuse: Option<String>,
    pub drop_after: Option<usize>,
    pub connects: Cell<usize>,
    pub disconnects: Cell<usize>,
    pub fetches: Cell<usize>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            errors: HashMap::new(),
            refuse: None,
            drop_after: None,
            connects: Cell::new(0),
            disconnects: Cell::new(0),
            fetches: Cell::new(0),
        }
    }

    pub fn with_bars(mut self, symbol: Symbol, timeframe: Timeframe, bars: Vec<RawBar>) -> Self {
        self.bars.insert((symbol, timeframe), bars);
        self
    }

    pub fn with_error(mut self, symbol: Symbol, timeframe: Timeframe, reason: &str) -> Self {
        self.errors.insert((symbol, timeframe), reason.to_string());
        self
    }

    pub fn refusing(mut self, reason: &str) -> Self {
        self.refuse = Some(reason.to_string());
        self
    }

    /// Serve `fetches` requests, then report the terminal as disconnected.
    pub fn dropping_after(mut self, fetches: usize) -> Self {
        self.drop_after = Some(fetches);
        self
    }
}

impl FeedPort for MockFeed {
    fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn FeedSession + '_>, SmartExpertError> {
        if let Some(reason) = &self.refuse {
            return Err(SmartExpertError::Connection {
                server: credentials.server.clone(),
                reason: reason.clone(),
            });
        }
        self.connects.set(self.connects.get() + 1);
        Ok(Box::new(MockSession { feed: self }))
    }
}

struct MockSession<'a> {
    feed: &'a MockFeed,
}

impl FeedSession for MockSession<'_> {
    fn fetch_recent_bars(
        &mut self,
        symbol: Symbol,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<RawBar>, SmartExpertError> {
        self.feed.fetches.set(self.feed.fetches.get() + 1);
        if self.feed.drop_after.is_some_and(|n| self.feed.fetches.get() > n) {
            return Err(SmartExpertError::Connection {
                server: "Broker-Demo".into(),
                reason: "terminal disconnected".into(),
            });
        }
        if let Some(reason) = self.feed.errors.get(&(symbol, timeframe)) {
            return Err(SmartExpertError::Fetch {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                reason: reason.clone(),
            });
        }
        let bars = self.feed.bars.get(&(symbol, timeframe)).cloned().unwrap_or_default();
        if bars.is_empty() {
            return Err(SmartExpertError::Fetch {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                reason: "no data returned".into(),
            });
        }
        let skip = bars.len().saturating_sub(count);
        Ok(bars[skip..].to_vec())
    }

    fn disconnect(self: Box<Self>) {
        self.feed.disconnects.set(self.feed.disconnects.get() + 1);
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        login: 5_012_345,
        password: "secret".into(),
        server: "Broker-Demo".into(),
    }
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

pub fn make_bar(secs: i64, close: f64) -> RawBar {
    RawBar {
        time: ts(secs),
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        tick_volume: 100,
        spread: 20,
        real_volume: 0,
    }
}

/// `count` one-minute bars starting at `start_secs`.
pub fn generate_bars(start_secs: i64, count: usize, start_price: f64) -> Vec<RawBar> {
    (0..count)
        .map(|i| make_bar(start_secs + 60 * i as i64, start_price + i as f64 * 0.1))
        .collect()
}

/// In-memory store with schema and reference rows in place.
pub fn prepared_store() -> SqliteAdapter {
    let store = SqliteAdapter::in_memory().unwrap();
    store.initialize_schema().unwrap();
    store.seed_reference_data().unwrap();
    store
}
