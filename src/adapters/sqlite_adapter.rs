//! SQLite storage adapter: candle store and risk settings store.

use crate::domain::candle::Candle;
use crate::domain::error::SmartExpertError;
use crate::domain::market::{Symbol, Timeframe};
use crate::domain::risk_settings::{RiskParameter, RiskSettingRow, RiskSettings};
use crate::ports::candle_store_port::{CandleStore, CloseSeries};
use crate::ports::config_port::ConfigPort;
use crate::ports::risk_settings_port::RiskSettingsStore;
use chrono::{DateTime, NaiveDateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{TransactionBehavior, params};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY,
    symbol_name TEXT NOT NULL UNIQUE,
    description TEXT,
    is_trading_allowed INTEGER NOT NULL DEFAULT 1,
    digits INTEGER,
    tick_size REAL,
    min_lot REAL,
    max_lot REAL
);
CREATE TABLE IF NOT EXISTS timeframes (
    id INTEGER PRIMARY KEY,
    timeframe_name TEXT NOT NULL UNIQUE,
    minutes INTEGER NOT NULL,
    display_name TEXT,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS candles (
    symbol_id INTEGER NOT NULL REFERENCES symbols(id),
    timeframe_id INTEGER NOT NULL REFERENCES timeframes(id),
    time TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    tick_volume INTEGER,
    spread INTEGER,
    real_volume INTEGER,
    PRIMARY KEY (symbol_id, timeframe_id, time)
);
CREATE TABLE IF NOT EXISTS trading_risk_settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parameter_name TEXT NOT NULL UNIQUE,
    parameter_value TEXT NOT NULL,
    description TEXT,
    updated_at TEXT
);";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SmartExpertError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| SmartExpertError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4)?.max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path).with_init(|c| {
            c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| SmartExpertError::Database {
                    reason: e.to_string(),
                })?;

        tracing::debug!(path = %db_path, pool_size, "sqlite pool ready");
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, SmartExpertError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| SmartExpertError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, SmartExpertError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| SmartExpertError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), SmartExpertError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    /// Insert the fixed symbol and timeframe rows; existing ids are kept.
    pub fn seed_reference_data(&self) -> Result<(usize, usize), SmartExpertError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        let mut symbols = 0;
        for s in Symbol::ALL {
            symbols += tx
                .execute(
                    "INSERT OR IGNORE INTO symbols
                        (id, symbol_name, description, digits, tick_size, min_lot, max_lot)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        s.id(),
                        s.name(),
                        s.description(),
                        s.digits(),
                        s.tick_size(),
                        s.min_lot(),
                        s.max_lot()
                    ],
                )
                .map_err(query_err)?;
        }

        let mut timeframes = 0;
        for t in Timeframe::ALL {
            timeframes += tx
                .execute(
                    "INSERT OR IGNORE INTO timeframes (id, timeframe_name, minutes, display_name)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![t.id(), t.name(), t.minutes(), t.display_name()],
                )
                .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok((symbols, timeframes))
    }
}

impl CandleStore for SqliteAdapter {
    fn upsert_batch(&self, rows: &[Candle]) -> Result<usize, SmartExpertError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO candles
                        (symbol_id, timeframe_id, time, open, high, low, close,
                         tick_volume, spread, real_volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .map_err(query_err)?;

            for c in rows {
                inserted += stmt
                    .execute(params![
                        c.symbol.id(),
                        c.timeframe.id(),
                        c.time.format(TIME_FORMAT).to_string(),
                        c.open,
                        c.high,
                        c.low,
                        c.close,
                        c.tick_volume,
                        c.spread,
                        c.real_volume
                    ])
                    .map_err(query_err)?;
            }
        }

        tx.commit().map_err(query_err)?;
        Ok(inserted)
    }

    fn read_close_series(&self, timeframe: Timeframe) -> Result<CloseSeries, SmartExpertError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT s.symbol_name, c.time, c.close
                 FROM candles c
                 JOIN symbols s ON c.symbol_id = s.id
                 WHERE c.timeframe_id = ?1
                 ORDER BY s.symbol_name, c.time",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![timeframe.id()], |row| {
                let name: String = row.get(0)?;
                let time: String = row.get(1)?;
                let close: f64 = row.get(2)?;
                Ok((name, time, close))
            })
            .map_err(query_err)?;

        let mut series = CloseSeries::new();
        for row in rows {
            let (name, time, close) = row.map_err(query_err)?;
            series
                .entry(name)
                .or_default()
                .push((parse_time(&time)?, close));
        }
        Ok(series)
    }

    fn data_range(
        &self,
        symbol: Symbol,
        timeframe: Timeframe,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, SmartExpertError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(time), MAX(time), COUNT(*) FROM candles
                 WHERE symbol_id = ?1 AND timeframe_id = ?2",
                params![symbol.id(), timeframe.id()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => {
                Ok(Some((parse_time(&min)?, parse_time(&max)?, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

impl RiskSettingsStore for SqliteAdapter {
    fn load_all(&self) -> Result<RiskSettings, SmartExpertError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT parameter_name, parameter_value FROM trading_risk_settings")
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(query_err)?;

        let settings = rows
            .collect::<Result<RiskSettings, rusqlite::Error>>()
            .map_err(query_err)?;
        tracing::info!(parameters = settings.len(), "risk settings loaded");
        Ok(settings)
    }

    fn ensure_defaults(&self) -> Result<usize, SmartExpertError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let now = Utc::now().format(TIME_FORMAT).to_string();

        let mut seeded = 0;
        for p in RiskParameter::ALL {
            seeded += tx
                .execute(
                    "INSERT OR IGNORE INTO trading_risk_settings
                        (parameter_name, parameter_value, description, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![p.name(), p.default_text(), p.description(), now],
                )
                .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        if seeded > 0 {
            tracing::info!(seeded, "default risk settings added");
        }
        Ok(seeded)
    }

    fn set(&self, param: RiskParameter, value: &str) -> Result<(), SmartExpertError> {
        param.validate(value)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO trading_risk_settings
                (parameter_name, parameter_value, description, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(parameter_name) DO UPDATE SET
                parameter_value = excluded.parameter_value,
                updated_at = excluded.updated_at",
            params![
                param.name(),
                value.trim(),
                param.description(),
                Utc::now().format(TIME_FORMAT).to_string()
            ],
        )
        .map_err(query_err)?;
        tracing::info!(parameter = param.name(), value = value.trim(), "risk setting updated");
        Ok(())
    }

    fn list(&self) -> Result<Vec<RiskSettingRow>, SmartExpertError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT parameter_name, parameter_value, description, updated_at
                 FROM trading_risk_settings ORDER BY id",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(query_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (name, value, description, updated_at) = row.map_err(query_err)?;
            out.push(RiskSettingRow {
                name,
                value,
                description,
                updated_at: updated_at.as_deref().map(parse_time).transpose()?,
            });
        }
        Ok(out)
    }
}

fn query_err(e: rusqlite::Error) -> SmartExpertError {
    SmartExpertError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, SmartExpertError> {
    NaiveDateTime::parse_from_str(text, TIME_FORMAT)
        .map(|t| t.and_utc())
        .map_err(|e| SmartExpertError::DatabaseQuery {
            reason: format!("invalid stored time {:?}: {}", text, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn store() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter.seed_reference_data().unwrap();
        adapter
    }

    fn candle(symbol: Symbol, timeframe: Timeframe, secs: i64, close: f64) -> Candle {
        Candle {
            symbol,
            timeframe,
            time: DateTime::from_timestamp(secs, 0).unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            tick_volume: 100,
            spread: 2,
            real_volume: 0,
        }
    }

    #[test]
    fn from_config_missing_path() {
        let config = FileConfigAdapter::from_string("[sqlite]\npool_size = 2\n").unwrap();
        match SqliteAdapter::from_config(&config) {
            Err(SmartExpertError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn from_config_non_numeric_pool_size() {
        let config =
            FileConfigAdapter::from_string("[sqlite]\npath = unused.db\npool_size = many\n").unwrap();
        match SqliteAdapter::from_config(&config) {
            Err(SmartExpertError::ConfigInvalid { key, .. }) => assert_eq!(key, "pool_size"),
            Err(other) => panic!("expected ConfigInvalid, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn schema_and_seed_are_repeatable() {
        let adapter = store();
        adapter.initialize_schema().unwrap();
        assert_eq!(adapter.seed_reference_data().unwrap(), (0, 0));
    }

    #[test]
    fn upsert_counts_only_new_rows() {
        let adapter = store();
        let batch = vec![
            candle(Symbol::XauUsd, Timeframe::M1, 60, 2000.0),
            candle(Symbol::XauUsd, Timeframe::M1, 120, 2001.0),
        ];
        assert_eq!(adapter.upsert_batch(&batch).unwrap(), 2);

        let overlap = vec![
            candle(Symbol::XauUsd, Timeframe::M1, 120, 9999.0),
            candle(Symbol::XauUsd, Timeframe::M1, 180, 2002.0),
        ];
        assert_eq!(adapter.upsert_batch(&overlap).unwrap(), 1);

        let series = adapter.read_close_series(Timeframe::M1).unwrap();
        let closes: Vec<f64> = series["XAUUSD"].iter().map(|(_, c)| *c).collect();
        assert_eq!(closes, vec![2000.0, 2001.0, 2002.0]);
    }

    #[test]
    fn same_timestamp_different_pair_is_distinct() {
        let adapter = store();
        let batch = vec![
            candle(Symbol::XauUsd, Timeframe::M1, 60, 2000.0),
            candle(Symbol::XauUsd, Timeframe::M5, 60, 2000.0),
            candle(Symbol::EurUsd, Timeframe::M1, 60, 1.1),
        ];
        assert_eq!(adapter.upsert_batch(&batch).unwrap(), 3);
    }

    #[test]
    fn empty_batch_is_noop() {
        let adapter = store();
        assert_eq!(adapter.upsert_batch(&[]).unwrap(), 0);
    }

    #[test]
    fn failed_batch_leaves_no_rows() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        // symbols not seeded: the foreign key rejects the batch
        let batch = vec![candle(Symbol::Wti, Timeframe::M15, 900, 75.0)];
        let err = adapter.upsert_batch(&batch).unwrap_err();
        assert!(matches!(err, SmartExpertError::DatabaseQuery { .. }));

        adapter.seed_reference_data().unwrap();
        assert!(adapter.data_range(Symbol::Wti, Timeframe::M15).unwrap().is_none());
    }

    #[test]
    fn close_series_grouped_and_ordered() {
        let adapter = store();
        adapter
            .upsert_batch(&[
                candle(Symbol::EurUsd, Timeframe::M15, 1800, 1.2),
                candle(Symbol::EurUsd, Timeframe::M15, 900, 1.1),
                candle(Symbol::XauUsd, Timeframe::M15, 900, 2000.0),
                candle(Symbol::XauUsd, Timeframe::M1, 60, 1.0),
            ])
            .unwrap();

        let series = adapter.read_close_series(Timeframe::M15).unwrap();
        assert_eq!(series.len(), 2);
        let eur = &series["EURUSD"];
        assert_eq!(eur[0].0.timestamp(), 900);
        assert_eq!(eur[1].0.timestamp(), 1800);
        assert_eq!(series["XAUUSD"].len(), 1);
    }

    #[test]
    fn data_range_reports_bounds() {
        let adapter = store();
        adapter
            .upsert_batch(&[
                candle(Symbol::Us500, Timeframe::M5, 600, 5000.0),
                candle(Symbol::Us500, Timeframe::M5, 300, 4990.0),
            ])
            .unwrap();

        let (first, last, count) = adapter
            .data_range(Symbol::Us500, Timeframe::M5)
            .unwrap()
            .unwrap();
        assert_eq!(first.timestamp(), 300);
        assert_eq!(last.timestamp(), 600);
        assert_eq!(count, 2);
        assert!(adapter.data_range(Symbol::Us500, Timeframe::M1).unwrap().is_none());
    }

    #[test]
    fn ensure_defaults_seeds_once() {
        let adapter = store();
        assert_eq!(adapter.ensure_defaults().unwrap(), 5);
        assert_eq!(adapter.ensure_defaults().unwrap(), 0);

        let settings = adapter.load_all().unwrap();
        assert_eq!(settings.len(), 5);
        assert_eq!(settings.raw("max_lot"), Some("50"));
    }

    #[test]
    fn ensure_defaults_keeps_operator_values() {
        let adapter = store();
        adapter.set(RiskParameter::MaxRiskPercent, "2").unwrap();
        assert_eq!(adapter.ensure_defaults().unwrap(), 4);
        assert_eq!(adapter.load_all().unwrap().max_risk_percent(), 2.0);
    }

    #[test]
    fn set_updates_and_validates() {
        let adapter = store();
        adapter.ensure_defaults().unwrap();
        adapter.set(RiskParameter::MaxLot, "10").unwrap();
        assert!(adapter.set(RiskParameter::MaxLot, "lots").is_err());

        let rows = adapter.list().unwrap();
        let max_lot = rows.iter().find(|r| r.name == "max_lot").unwrap();
        assert_eq!(max_lot.value, "10");
        assert!(max_lot.updated_at.is_some());
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn load_all_on_empty_table() {
        let adapter = store();
        assert!(adapter.load_all().unwrap().is_empty());
    }
}
