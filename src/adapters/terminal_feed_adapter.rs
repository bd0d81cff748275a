//! Broker terminal feed backed by the terminal's bar-history export files.
//!
//! The terminal writes one CSV per pair, `<SYMBOL>_<TIMEFRAME>.csv`, into its
//! files directory with the header
//! `time,open,high,low,close,tick_volume,spread,real_volume` where `time` is
//! unix seconds.

use crate::domain::candle::RawBar;
use crate::domain::error::SmartExpertError;
use crate::domain::market::{Symbol, Timeframe};
use crate::ports::feed_port::{Credentials, FeedPort, FeedSession};
use chrono::DateTime;
use std::fs;
use std::path::{Path, PathBuf};

pub struct TerminalFeedAdapter {
    files_dir: PathBuf,
}

impl TerminalFeedAdapter {
    pub fn new(files_dir: PathBuf) -> Self {
        Self { files_dir }
    }

    fn export_path(dir: &Path, symbol: Symbol, timeframe: Timeframe) -> PathBuf {
        dir.join(format!("{}_{}.csv", symbol.name(), timeframe.name()))
    }
}

impl FeedPort for TerminalFeedAdapter {
    fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn FeedSession + '_>, SmartExpertError> {
        let refuse = |reason: String| SmartExpertError::Connection {
            server: credentials.server.clone(),
            reason,
        };

        if credentials.server.trim().is_empty() {
            return Err(refuse("server name is empty".into()));
        }
        if credentials.login == 0 {
            return Err(refuse("login must be a non-zero account id".into()));
        }
        let meta = fs::metadata(&self.files_dir).map_err(|e| {
            refuse(format!(
                "terminal directory {} unreachable: {}",
                self.files_dir.display(),
                e
            ))
        })?;
        if !meta.is_dir() {
            return Err(refuse(format!(
                "{} is not a directory",
                self.files_dir.display()
            )));
        }

        tracing::info!(
            server = %credentials.server,
            login = credentials.login,
            "connected to broker terminal"
        );
        Ok(Box::new(TerminalSession {
            dir: &self.files_dir,
            server: credentials.server.clone(),
        }))
    }
}

struct TerminalSession<'a> {
    dir: &'a Path,
    server: String,
}

impl FeedSession for TerminalSession<'_> {
    fn fetch_recent_bars(
        &mut self,
        symbol: Symbol,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<RawBar>, SmartExpertError> {
        let fail = |reason: String| SmartExpertError::Fetch {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            reason,
        };

        if count == 0 {
            return Err(fail("requested bar count must be positive".into()));
        }

        let path = TerminalFeedAdapter::export_path(self.dir, symbol, timeframe);
        let content = fs::read_to_string(&path)
            .map_err(|e| fail(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (idx, result) in rdr.records().enumerate() {
            // header is line 1
            let line = idx + 2;
            let record = result.map_err(|e| fail(format!("CSV parse error: {}", e)))?;

            let field = |col: usize, name: &str| {
                record
                    .get(col)
                    .map(str::trim)
                    .ok_or_else(|| fail(format!("line {}: missing {} column", line, name)))
            };
            let float = |col: usize, name: &str| -> Result<f64, SmartExpertError> {
                field(col, name)?
                    .parse()
                    .map_err(|e| fail(format!("line {}: invalid {} value: {}", line, name, e)))
            };
            let int = |col: usize, name: &str| -> Result<i64, SmartExpertError> {
                let text = field(col, name)?;
                if text.is_empty() {
                    return Ok(0);
                }
                text.parse()
                    .map_err(|e| fail(format!("line {}: invalid {} value: {}", line, name, e)))
            };

            let secs: i64 = field(0, "time")?
                .parse()
                .map_err(|e| fail(format!("line {}: invalid time value: {}", line, e)))?;
            let time = DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| fail(format!("line {}: time {} out of range", line, secs)))?;

            bars.push(RawBar {
                time,
                open: float(1, "open")?,
                high: float(2, "high")?,
                low: float(3, "low")?,
                close: float(4, "close")?,
                tick_volume: int(5, "tick_volume")?,
                spread: int(6, "spread")?,
                real_volume: int(7, "real_volume")?,
            });
        }

        if bars.is_empty() {
            return Err(fail("no data returned".into()));
        }

        bars.sort_by_key(|b| b.time);
        let skip = bars.len().saturating_sub(count);
        let recent = bars.split_off(skip);
        tracing::debug!(%symbol, %timeframe, bars = recent.len(), "bars fetched");
        Ok(recent)
    }

    fn disconnect(self: Box<Self>) {
        tracing::info!(server = %self.server, "broker terminal session closed");
    }
}
