//! PostgreSQL storage adapter: candle store and risk settings store.

use crate::domain::candle::Candle;
use crate::domain::error::SmartExpertError;
use crate::domain::market::{Symbol, Timeframe};
use crate::domain::risk_settings::{RiskParameter, RiskSettingRow, RiskSettings};
use crate::ports::candle_store_port::{CandleStore, CloseSeries};
use crate::ports::config_port::ConfigPort;
use crate::ports::risk_settings_port::RiskSettingsStore;
use chrono::{DateTime, Utc};
use postgres::NoTls;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS symbols (
    id BIGINT PRIMARY KEY,
    symbol_name TEXT NOT NULL UNIQUE,
    description TEXT,
    is_trading_allowed BOOLEAN NOT NULL DEFAULT TRUE,
    digits INTEGER,
    tick_size DOUBLE PRECISION,
    min_lot DOUBLE PRECISION,
    max_lot DOUBLE PRECISION
);
CREATE TABLE IF NOT EXISTS timeframes (
    id BIGINT PRIMARY KEY,
    timeframe_name TEXT NOT NULL UNIQUE,
    minutes BIGINT NOT NULL,
    display_name TEXT,
    is_active BOOLEAN NOT NULL DEFAULT TRUE
);
CREATE TABLE IF NOT EXISTS candles (
    symbol_id BIGINT NOT NULL REFERENCES symbols(id),
    timeframe_id BIGINT NOT NULL REFERENCES timeframes(id),
    time TIMESTAMPTZ NOT NULL,
    open DOUBLE PRECISION NOT NULL,
    high DOUBLE PRECISION NOT NULL,
    low DOUBLE PRECISION NOT NULL,
    close DOUBLE PRECISION NOT NULL,
    tick_volume BIGINT,
    spread BIGINT,
    real_volume BIGINT,
    PRIMARY KEY (symbol_id, timeframe_id, time)
);
CREATE TABLE IF NOT EXISTS trading_risk_settings (
    id BIGSERIAL PRIMARY KEY,
    parameter_name TEXT NOT NULL UNIQUE,
    parameter_value TEXT NOT NULL,
    description TEXT,
    updated_at TIMESTAMPTZ
);";

pub struct PostgresAdapter {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SmartExpertError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .ok_or_else(|| SmartExpertError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| SmartExpertError::ConfigInvalid {
                section: "postgres".into(),
                key: "connection_string".into(),
                reason: e.to_string(),
            })?;

        let pool_size = config.get_int("postgres", "pool_size", 4)?.max(1) as u32;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| SmartExpertError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<PostgresConnectionManager<NoTls>>, SmartExpertError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| SmartExpertError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), SmartExpertError> {
        self.conn()?.batch_execute(SCHEMA).map_err(query_err)
    }

    pub fn seed_reference_data(&self) -> Result<(usize, usize), SmartExpertError> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_err)?;

        let mut symbols = 0;
        for s in Symbol::ALL {
            symbols += tx
                .execute(
                    "INSERT INTO symbols
                        (id, symbol_name, description, digits, tick_size, min_lot, max_lot)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)
                     ON CONFLICT DO NOTHING",
                    &[
                        &s.id(),
                        &s.name(),
                        &s.description(),
                        &(s.digits() as i32),
                        &s.tick_size(),
                        &s.min_lot(),
                        &s.max_lot(),
                    ],
                )
                .map_err(query_err)? as usize;
        }

        let mut timeframes = 0;
        for t in Timeframe::ALL {
            timeframes += tx
                .execute(
                    "INSERT INTO timeframes (id, timeframe_name, minutes, display_name)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT DO NOTHING",
                    &[&t.id(), &t.name(), &t.minutes(), &t.display_name()],
                )
                .map_err(query_err)? as usize;
        }

        tx.commit().map_err(query_err)?;
        Ok((symbols, timeframes))
    }
}

impl CandleStore for PostgresAdapter {
    fn upsert_batch(&self, rows: &[Candle]) -> Result<usize, SmartExpertError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_err)?;
        let stmt = tx
            .prepare(
                "INSERT INTO candles
                    (symbol_id, timeframe_id, time, open, high, low, close,
                     tick_volume, spread, real_volume)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (symbol_id, timeframe_id, time) DO NOTHING",
            )
            .map_err(query_err)?;

        let mut inserted = 0;
        for c in rows {
            inserted += tx
                .execute(
                    &stmt,
                    &[
                        &c.symbol.id(),
                        &c.timeframe.id(),
                        &c.time,
                        &c.open,
                        &c.high,
                        &c.low,
                        &c.close,
                        &c.tick_volume,
                        &c.spread,
                        &c.real_volume,
                    ],
                )
                .map_err(query_err)? as usize;
        }

        tx.commit().map_err(query_err)?;
        Ok(inserted)
    }

    fn read_close_series(&self, timeframe: Timeframe) -> Result<CloseSeries, SmartExpertError> {
        let rows = self
            .conn()?
            .query(
                "SELECT s.symbol_name, c.time, c.close
                 FROM candles c
                 JOIN symbols s ON c.symbol_id = s.id
                 WHERE c.timeframe_id = $1
                 ORDER BY s.symbol_name, c.time",
                &[&timeframe.id()],
            )
            .map_err(query_err)?;

        let mut series = CloseSeries::new();
        for row in rows {
            let name: String = row.get(0);
            let time: DateTime<Utc> = row.get(1);
            let close: f64 = row.get(2);
            series.entry(name).or_default().push((time, close));
        }
        Ok(series)
    }

    fn data_range(
        &self,
        symbol: Symbol,
        timeframe: Timeframe,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, SmartExpertError> {
        let row = self
            .conn()?
            .query_one(
                "SELECT MIN(time), MAX(time), COUNT(*) FROM candles
                 WHERE symbol_id = $1 AND timeframe_id = $2",
                &[&symbol.id(), &timeframe.id()],
            )
            .map_err(query_err)?;

        let min: Option<DateTime<Utc>> = row.get(0);
        let max: Option<DateTime<Utc>> = row.get(1);
        let count: i64 = row.get(2);
        match (min, max) {
            (Some(min), Some(max)) if count > 0 => Ok(Some((min, max, count as usize))),
            _ => Ok(None),
        }
    }
}

impl RiskSettingsStore for PostgresAdapter {
    fn load_all(&self) -> Result<RiskSettings, SmartExpertError> {
        let rows = self
            .conn()?
            .query(
                "SELECT parameter_name, parameter_value FROM trading_risk_settings",
                &[],
            )
            .map_err(query_err)?;

        let settings: RiskSettings = rows
            .into_iter()
            .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect();
        tracing::info!(parameters = settings.len(), "risk settings loaded");
        Ok(settings)
    }

    fn ensure_defaults(&self) -> Result<usize, SmartExpertError> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_err)?;
        let now = Utc::now();

        let mut seeded = 0;
        for p in RiskParameter::ALL {
            seeded += tx
                .execute(
                    "INSERT INTO trading_risk_settings
                        (parameter_name, parameter_value, description, updated_at)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (parameter_name) DO NOTHING",
                    &[&p.name(), &p.default_text(), &p.description(), &now],
                )
                .map_err(query_err)? as usize;
        }

        tx.commit().map_err(query_err)?;
        if seeded > 0 {
            tracing::info!(seeded, "default risk settings added");
        }
        Ok(seeded)
    }

    fn set(&self, param: RiskParameter, value: &str) -> Result<(), SmartExpertError> {
        param.validate(value)?;
        self.conn()?
            .execute(
                "INSERT INTO trading_risk_settings
                    (parameter_name, parameter_value, description, updated_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (parameter_name) DO UPDATE SET
                    parameter_value = EXCLUDED.parameter_value,
                    updated_at = EXCLUDED.updated_at",
                &[&param.name(), &value.trim(), &param.description(), &Utc::now()],
            )
            .map_err(query_err)?;
        tracing::info!(parameter = param.name(), value = value.trim(), "risk setting updated");
        Ok(())
    }

    fn list(&self) -> Result<Vec<RiskSettingRow>, SmartExpertError> {
        let rows = self
            .conn()?
            .query(
                "SELECT parameter_name, parameter_value, description, updated_at
                 FROM trading_risk_settings ORDER BY id",
                &[],
            )
            .map_err(query_err)?;

        Ok(rows
            .into_iter()
            .map(|row| RiskSettingRow {
                name: row.get(0),
                value: row.get(1),
                description: row.get(2),
                updated_at: row.get(3),
            })
            .collect())
    }
}

fn query_err(e: postgres::Error) -> SmartExpertError {
    SmartExpertError::DatabaseQuery {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    #[test]
    fn from_config_missing_connection_string() {
        let config = FileConfigAdapter::from_string("[postgres]\npool_size = 2\n").unwrap();
        match PostgresAdapter::from_config(&config) {
            Err(SmartExpertError::ConfigMissing { section, key }) => {
                assert_eq!(section, "postgres");
                assert_eq!(key, "connection_string");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }
}
