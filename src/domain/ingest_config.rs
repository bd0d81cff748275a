//! Ingestion and broker configuration, validated before any I/O.

use crate::domain::error::SmartExpertError;
use crate::domain::market::{Symbol, Timeframe, parse_list};
use crate::ports::config_port::ConfigPort;
use crate::ports::feed_port::Credentials;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const ENV_LOGIN: &str = "SMARTEXPERT_LOGIN";
pub const ENV_PASSWORD: &str = "SMARTEXPERT_PASSWORD";
pub const ENV_SERVER: &str = "SMARTEXPERT_SERVER";

/// The symbol × timeframe matrix one sweep covers.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub symbols: Vec<Symbol>,
    pub timeframes: Vec<Timeframe>,
    pub candle_counts: BTreeMap<Timeframe, usize>,
    /// Total fetch attempts per pair, at least 1.
    pub fetch_attempts: u32,
}

impl IngestConfig {
    pub fn candle_count(&self, timeframe: Timeframe) -> usize {
        self.candle_counts
            .get(&timeframe)
            .copied()
            .unwrap_or_else(|| timeframe.default_candle_count())
    }

    /// Every pair in sweep order: symbol-major, timeframe-minor.
    pub fn pairs(&self) -> Vec<(Symbol, Timeframe)> {
        self.symbols
            .iter()
            .flat_map(|&s| self.timeframes.iter().map(move |&t| (s, t)))
            .collect()
    }

    /// Narrow the matrix to one symbol and/or timeframe.
    pub fn restrict(mut self, symbol: Option<Symbol>, timeframe: Option<Timeframe>) -> Self {
        if let Some(s) = symbol {
            self.symbols = vec![s];
        }
        if let Some(t) = timeframe {
            self.timeframes = vec![t];
        }
        self
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            symbols: Symbol::ALL.to_vec(),
            timeframes: Timeframe::ALL.to_vec(),
            candle_counts: Timeframe::ALL
                .into_iter()
                .map(|t| (t, t.default_candle_count()))
                .collect(),
            fetch_attempts: 1,
        }
    }
}

pub fn build_ingest_config(config: &dyn ConfigPort) -> Result<IngestConfig, SmartExpertError> {
    let mut out = IngestConfig::default();

    if let Some(list) = config.get_string("ingest", "symbols") {
        out.symbols = parse_list(&list)?;
        if out.symbols.is_empty() {
            return Err(invalid("ingest", "symbols", "no symbols listed"));
        }
    }

    if let Some(list) = config.get_string("ingest", "timeframes") {
        out.timeframes = parse_list(&list)?;
        if out.timeframes.is_empty() {
            return Err(invalid("ingest", "timeframes", "no timeframes listed"));
        }
    }

    for tf in Timeframe::ALL {
        let count = config.get_int("candle_counts", tf.name(), tf.default_candle_count() as i64)?;
        if count <= 0 {
            return Err(invalid(
                "candle_counts",
                tf.name(),
                "candle count must be positive",
            ));
        }
        out.candle_counts.insert(tf, count as usize);
    }

    let attempts = config.get_int("ingest", "fetch_attempts", 1)?;
    if !(1..=10).contains(&attempts) {
        return Err(invalid(
            "ingest",
            "fetch_attempts",
            "fetch_attempts must be between 1 and 10",
        ));
    }
    out.fetch_attempts = attempts as u32;

    Ok(out)
}

/// Location of the broker terminal and the account to log in with.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub credentials: Credentials,
    pub terminal_dir: PathBuf,
}

/// Read `[broker]`, letting environment variables override the credentials.
pub fn build_broker_config(
    config: &dyn ConfigPort,
    env: impl Fn(&str) -> Option<String>,
) -> Result<BrokerConfig, SmartExpertError> {
    let lookup = |env_key: &str, key: &str| {
        env(env_key)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| config.get_string("broker", key))
            .ok_or_else(|| SmartExpertError::ConfigMissing {
                section: "broker".into(),
                key: key.into(),
            })
    };

    let login_text = lookup(ENV_LOGIN, "login")?;
    let login: u64 = login_text
        .trim()
        .parse()
        .map_err(|_| invalid("broker", "login", "login must be a numeric account id"))?;
    let password = lookup(ENV_PASSWORD, "password")?;
    let server = lookup(ENV_SERVER, "server")?;

    let terminal_dir = config
        .get_string("broker", "terminal_dir")
        .map(PathBuf::from)
        .ok_or_else(|| SmartExpertError::ConfigMissing {
            section: "broker".into(),
            key: "terminal_dir".into(),
        })?;

    Ok(BrokerConfig {
        credentials: Credentials {
            login,
            password,
            server: server.trim().to_string(),
        },
        terminal_dir,
    })
}

/// Process environment lookup for [`build_broker_config`].
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn invalid(section: &str, key: &str, reason: &str) -> SmartExpertError {
    SmartExpertError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
