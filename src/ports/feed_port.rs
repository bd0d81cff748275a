//! Broker market-feed port.

use crate::domain::candle::RawBar;
use crate::domain::error::SmartExpertError;
use crate::domain::market::{Symbol, Timeframe};

/// Login details for the broker terminal.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: u64,
    pub password: String,
    pub server: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .field("server", &self.server)
            .finish()
    }
}

/// Entry point to a broker terminal. Calling `connect` while an earlier
/// session is still open must succeed and yield a usable session.
pub trait FeedPort {
    fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn FeedSession + '_>, SmartExpertError>;
}

/// An established terminal session. Not safe for concurrent use.
pub trait FeedSession {
    /// Up to `count` most recent bars, oldest first. An empty result is a
    /// `Fetch` error, never an empty vector.
    fn fetch_recent_bars(
        &mut self,
        symbol: Symbol,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<RawBar>, SmartExpertError>;

    fn disconnect(self: Box<Self>);
}
