//! Instrument and timeframe reference data.
//!
//! Both sets are closed: names read from configuration are resolved here once,
//! and anything unrecognised is a configuration error before any I/O happens.

use crate::domain::error::SmartExpertError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    XauUsd,
    UsdInd,
    Wti,
    XagUsd,
    EurUsd,
    Us500,
}

impl Symbol {
    pub const ALL: [Symbol; 6] = [
        Symbol::XauUsd,
        Symbol::UsdInd,
        Symbol::Wti,
        Symbol::XagUsd,
        Symbol::EurUsd,
        Symbol::Us500,
    ];

    /// Row id in the `symbols` table.
    pub fn id(self) -> i64 {
        match self {
            Symbol::XauUsd => 1,
            Symbol::UsdInd => 2,
            Symbol::Wti => 3,
            Symbol::XagUsd => 4,
            Symbol::EurUsd => 5,
            Symbol::Us500 => 6,
        }
    }

    /// Name as the broker terminal knows it.
    pub fn name(self) -> &'static str {
        match self {
            Symbol::XauUsd => "XAUUSD",
            Symbol::UsdInd => "USDInd",
            Symbol::Wti => "WTI",
            Symbol::XagUsd => "XAGUSD",
            Symbol::EurUsd => "EURUSD",
            Symbol::Us500 => "US500",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Symbol::XauUsd => "Gold vs US Dollar",
            Symbol::UsdInd => "US Dollar Index",
            Symbol::Wti => "West Texas Intermediate Crude Oil",
            Symbol::XagUsd => "Silver vs US Dollar",
            Symbol::EurUsd => "Euro vs US Dollar",
            Symbol::Us500 => "S&P 500 Index",
        }
    }

    /// Price decimal precision.
    pub fn digits(self) -> u32 {
        match self {
            Symbol::XagUsd => 3,
            Symbol::EurUsd => 5,
            _ => 2,
        }
    }

    pub fn tick_size(self) -> f64 {
        10f64.powi(-(self.digits() as i32))
    }

    pub fn min_lot(self) -> f64 {
        0.01
    }

    pub fn max_lot(self) -> f64 {
        50.0
    }

    pub fn from_id(id: i64) -> Option<Symbol> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Symbol {
    type Err = SmartExpertError;

    /// Case-insensitive, so `usdind` and `USDInd` both resolve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|sym| sym.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SmartExpertError::UnknownSymbol {
                name: wanted.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    M1,
    M5,
    M15,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::M1, Timeframe::M5, Timeframe::M15];

    /// Row id in the `timeframes` table.
    pub fn id(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 2,
            Timeframe::M15 => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
        }
    }

    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Timeframe::M1 => "1 Minute",
            Timeframe::M5 => "5 Minutes",
            Timeframe::M15 => "15 Minutes",
        }
    }

    /// Default number of bars pulled per sweep: ten trading days.
    pub fn default_candle_count(self) -> usize {
        match self {
            Timeframe::M1 => 14_400,
            Timeframe::M5 => 2_880,
            Timeframe::M15 => 960,
        }
    }

    pub fn from_id(id: i64) -> Option<Timeframe> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Timeframe {
    type Err = SmartExpertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|tf| tf.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SmartExpertError::UnknownTimeframe {
                name: wanted.to_string(),
            })
    }
}

/// Parse a comma-separated list, keeping the first occurrence of each entry.
pub fn parse_list<T>(input: &str) -> Result<Vec<T>, SmartExpertError>
where
    T: FromStr<Err = SmartExpertError> + PartialEq,
{
    let mut out = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let item = part.parse::<T>()?;
        if !out.contains(&item) {
            out.push(item);
        }
    }
    Ok(out)
}
