//! Risk parameters and the immutable settings snapshot the risk engine reads.

use crate::domain::error::SmartExpertError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskParameter {
    MaxRiskPercent,
    MinLot,
    MaxLot,
    StopLossAtrMultiplier,
    TakeProfitRatio,
}

impl RiskParameter {
    pub const ALL: [RiskParameter; 5] = [
        RiskParameter::MaxRiskPercent,
        RiskParameter::MinLot,
        RiskParameter::MaxLot,
        RiskParameter::StopLossAtrMultiplier,
        RiskParameter::TakeProfitRatio,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RiskParameter::MaxRiskPercent => "max_risk_percent",
            RiskParameter::MinLot => "min_lot",
            RiskParameter::MaxLot => "max_lot",
            RiskParameter::StopLossAtrMultiplier => "stop_loss_atr_multiplier",
            RiskParameter::TakeProfitRatio => "take_profit_ratio",
        }
    }

    /// Value used when the row is absent or unparseable.
    pub fn default_value(self) -> f64 {
        match self {
            RiskParameter::MaxRiskPercent => 1.0,
            RiskParameter::MinLot => 0.01,
            RiskParameter::MaxLot => 50.0,
            RiskParameter::StopLossAtrMultiplier => 1.5,
            RiskParameter::TakeProfitRatio => 2.0,
        }
    }

    /// Seed text written by `ensure_defaults`.
    pub fn default_text(self) -> &'static str {
        match self {
            RiskParameter::MaxRiskPercent => "1",
            RiskParameter::MinLot => "0.01",
            RiskParameter::MaxLot => "50",
            RiskParameter::StopLossAtrMultiplier => "1.5",
            RiskParameter::TakeProfitRatio => "2",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RiskParameter::MaxRiskPercent => "Maximum percent of balance risked per trade",
            RiskParameter::MinLot => "Minimum allowed lot volume",
            RiskParameter::MaxLot => "Maximum allowed lot volume",
            RiskParameter::StopLossAtrMultiplier => "ATR multiple used for the stop-loss distance",
            RiskParameter::TakeProfitRatio => "Take-profit to stop-loss distance ratio",
        }
    }

    /// Check an operator-supplied value before it is persisted.
    pub fn validate(self, value: &str) -> Result<f64, SmartExpertError> {
        let parsed: f64 = value
            .trim()
            .parse()
            .map_err(|_| self.invalid("value must be a number"))?;
        if !parsed.is_finite() {
            return Err(self.invalid("value must be finite"));
        }
        match self {
            RiskParameter::MaxRiskPercent if parsed <= 0.0 || parsed > 100.0 => {
                Err(self.invalid("must be in (0, 100]"))
            }
            RiskParameter::MinLot | RiskParameter::MaxLot if !is_lot_step(parsed) => {
                Err(self.invalid("must be a multiple of 0.01, at least 0.01"))
            }
            RiskParameter::StopLossAtrMultiplier | RiskParameter::TakeProfitRatio
                if parsed <= 0.0 =>
            {
                Err(self.invalid("must be positive"))
            }
            _ => Ok(parsed),
        }
    }

    fn invalid(self, reason: &str) -> SmartExpertError {
        SmartExpertError::ConfigInvalid {
            section: "trading_risk_settings".into(),
            key: self.name().into(),
            reason: reason.into(),
        }
    }
}

/// Smallest tradable volume increment.
pub const LOT_STEP: f64 = 0.01;

/// True for volumes of at least one step that sit on the step grid.
pub fn is_lot_step(volume: f64) -> bool {
    let steps = volume / LOT_STEP;
    volume.is_finite() && volume >= LOT_STEP - 1e-9 && (steps.round() - steps).abs() < 1e-6
}

impl fmt::Display for RiskParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RiskParameter {
    type Err = SmartExpertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| SmartExpertError::UnknownParameter {
                name: wanted.to_string(),
            })
    }
}

/// One row of `trading_risk_settings`.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskSettingRow {
    pub name: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy of the stored parameters.
///
/// Never refreshes itself; a fresh snapshot must be loaded to observe changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskSettings {
    values: HashMap<String, String>,
}

impl RiskSettings {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn raw(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Numeric value of a parameter, falling back to its default.
    pub fn get(&self, param: RiskParameter) -> f64 {
        match self.raw(param.name()) {
            None => param.default_value(),
            Some(text) => match text.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => v,
                _ => {
                    tracing::warn!(
                        parameter = param.name(),
                        value = text,
                        "unparseable risk setting, using default {}",
                        param.default_value()
                    );
                    param.default_value()
                }
            },
        }
    }

    pub fn max_risk_percent(&self) -> f64 {
        self.get(RiskParameter::MaxRiskPercent)
    }

    /// Lot bounds as `(min, max)`. A stored `min_lot` above `max_lot` collapses
    /// the range onto `max_lot` so clamping stays well-defined.
    pub fn lot_bounds(&self) -> (f64, f64) {
        let min = self.lot_setting(RiskParameter::MinLot);
        let max = self.lot_setting(RiskParameter::MaxLot);
        if min > max {
            tracing::warn!(min_lot = min, max_lot = max, "min_lot exceeds max_lot");
            (max, max)
        } else {
            (min, max)
        }
    }

    /// Stored lot bound, or its default when it is off the lot step.
    fn lot_setting(&self, param: RiskParameter) -> f64 {
        let value = self.get(param);
        if is_lot_step(value) {
            value
        } else {
            tracing::warn!(
                parameter = param.name(),
                value,
                "lot bound off the {} step, using default {}",
                LOT_STEP,
                param.default_value()
            );
            param.default_value()
        }
    }

    pub fn stop_loss_atr_multiplier(&self) -> f64 {
        self.get(RiskParameter::StopLossAtrMultiplier)
    }

    pub fn take_profit_ratio(&self) -> f64 {
        self.get(RiskParameter::TakeProfitRatio)
    }
}

impl FromIterator<(String, String)> for RiskSettings {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
