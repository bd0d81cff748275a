//! Ingestion coordinator: one stateless sweep over the symbol × timeframe matrix.
//!
//! Each pair is fetched, deduplicated and written independently. A pair that
//! fails is recorded and skipped; only a broker connection failure or a store
//! outage ends the sweep early. Duplicates against earlier runs are resolved
//! by the store's composite key, so no watermark is consulted.

use crate::domain::candle::{RawBar, to_candles};
use crate::domain::error::SmartExpertError;
use crate::domain::ingest_config::IngestConfig;
use crate::domain::market::{Symbol, Timeframe};
use crate::ports::candle_store_port::CandleStore;
use crate::ports::feed_port::{Credentials, FeedPort, FeedSession};

#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Stored { fetched: usize, inserted: usize },
    Failed { error: SmartExpertError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairReport {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub outcome: PairOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub pairs: Vec<PairReport>,
}

impl SweepReport {
    pub fn succeeded(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| matches!(p.outcome, PairOutcome::Stored { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.pairs.len() - self.succeeded()
    }

    pub fn inserted(&self) -> usize {
        self.pairs
            .iter()
            .map(|p| match p.outcome {
                PairOutcome::Stored { inserted, .. } => inserted,
                PairOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn outcome(&self, symbol: Symbol, timeframe: Timeframe) -> Option<&PairOutcome> {
        self.pairs
            .iter()
            .find(|p| p.symbol == symbol && p.timeframe == timeframe)
            .map(|p| &p.outcome)
    }
}

/// Run one sweep.
///
/// Returns `Err` only for run-fatal conditions: the broker refused the
/// connection, or the store became unreachable. The feed session is released
/// on every path once it has been opened.
pub fn run_sweep(
    feed: &dyn FeedPort,
    credentials: &Credentials,
    store: &dyn CandleStore,
    config: &IngestConfig,
) -> Result<SweepReport, SmartExpertError> {
    let session = feed.connect(credentials).inspect_err(|e| {
        tracing::error!(server = %credentials.server, "broker connection failed: {e}");
    })?;
    tracing::info!(server = %credentials.server, pairs = config.pairs().len(), "sweep started");

    let mut guard = SessionGuard(Some(session));
    let result = match guard.0.as_deref_mut() {
        Some(session) => sweep_pairs(session, store, config),
        None => Ok(SweepReport::default()),
    };
    drop(guard);

    let report = result?;
    tracing::info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        inserted = report.inserted(),
        "sweep finished"
    );
    Ok(report)
}

/// Disconnects the held session when dropped, unwinding included.
struct SessionGuard<'a>(Option<Box<dyn FeedSession + 'a>>);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.0.take() {
            session.disconnect();
        }
    }
}

fn sweep_pairs(
    session: &mut dyn FeedSession,
    store: &dyn CandleStore,
    config: &IngestConfig,
) -> Result<SweepReport, SmartExpertError> {
    let mut report = SweepReport::default();

    for (symbol, timeframe) in config.pairs() {
        let count = config.candle_count(timeframe);
        let result = ingest_pair(session, store, symbol, timeframe, count, config.fetch_attempts);
        let outcome = match result {
            Ok((fetched, inserted)) => {
                tracing::info!(%symbol, %timeframe, fetched, inserted, "pair stored");
                PairOutcome::Stored { fetched, inserted }
            }
            Err(e) if e.is_fatal_for_run() => {
                tracing::error!(%symbol, %timeframe, "aborting sweep: {e}");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(%symbol, %timeframe, "pair skipped: {e}");
                PairOutcome::Failed { error: e }
            }
        };
        report.pairs.push(PairReport {
            symbol,
            timeframe,
            outcome,
        });
    }

    Ok(report)
}

fn ingest_pair(
    session: &mut dyn FeedSession,
    store: &dyn CandleStore,
    symbol: Symbol,
    timeframe: Timeframe,
    count: usize,
    attempts: u32,
) -> Result<(usize, usize), SmartExpertError> {
    let bars = fetch_with_retry(session, symbol, timeframe, count, attempts)?;
    let candles = to_candles(symbol, timeframe, bars);
    let inserted = store.upsert_batch(&candles)?;
    Ok((candles.len(), inserted))
}

fn fetch_with_retry(
    session: &mut dyn FeedSession,
    symbol: Symbol,
    timeframe: Timeframe,
    count: usize,
    attempts: u32,
) -> Result<Vec<RawBar>, SmartExpertError> {
    let mut attempt = 1;
    loop {
        match session.fetch_recent_bars(symbol, timeframe, count) {
            Ok(bars) => return Ok(bars),
            Err(e @ SmartExpertError::Fetch { .. }) if attempt < attempts => {
                tracing::debug!(%symbol, %timeframe, attempt, "fetch failed, retrying: {e}");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
