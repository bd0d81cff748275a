//! Risk engine: position sizing, stop/target levels and the admission gate.
//!
//! All operations are pure over their inputs plus the settings snapshot taken
//! at construction. Failures come back as values so a caller can always fall
//! back to "do not trade".

use crate::domain::error::SmartExpertError;
use crate::domain::risk_settings::RiskSettings;
use crate::ports::risk_settings_port::RiskSettingsStore;

/// Maximum number of positions open at once, across all symbols.
pub const MAX_OPEN_POSITIONS: u32 = 1;

/// Inputs for a full sizing decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeRequest {
    pub balance: f64,
    pub entry_price: f64,
    pub atr: f64,
    pub open_positions: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub allowed: bool,
    pub reason: String,
}

/// Derived sizing decision; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSizingResult {
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub admission: Admission,
    /// Set when sizing could not be computed; `volume` is then 0.
    pub error: Option<SmartExpertError>,
}

#[derive(Debug, Clone)]
pub struct RiskEngine {
    settings: RiskSettings,
}

impl RiskEngine {
    pub fn new(settings: RiskSettings) -> Self {
        Self { settings }
    }

    /// Build an engine from the current contents of a settings store.
    pub fn from_store(store: &dyn RiskSettingsStore) -> Result<Self, SmartExpertError> {
        Ok(Self::new(store.load_all()?))
    }

    /// Replace the snapshot with the store's current contents.
    pub fn reload(&mut self, store: &dyn RiskSettingsStore) -> Result<(), SmartExpertError> {
        self.settings = store.load_all()?;
        tracing::info!(parameters = self.settings.len(), "risk settings reloaded");
        Ok(())
    }

    pub fn settings(&self) -> &RiskSettings {
        &self.settings
    }

    /// Lot volume that risks `max_risk_percent` of `balance` between entry and stop.
    ///
    /// The raw quotient is clamped to `[min_lot, max_lot]` and then rounded to
    /// two decimals. A zero entry/stop distance is a `DegenerateRisk` error; the
    /// caller should treat it as a zero volume.
    pub fn calculate_position_size(
        &self,
        balance: f64,
        entry_price: f64,
        stop_loss_price: f64,
    ) -> Result<f64, SmartExpertError> {
        if !(balance.is_finite() && entry_price.is_finite() && stop_loss_price.is_finite()) {
            return Err(degenerate("non-finite balance or price"));
        }

        let risk_amount = balance * (self.settings.max_risk_percent() / 100.0);
        let risk_per_unit = (entry_price - stop_loss_price).abs();
        if risk_per_unit == 0.0 {
            tracing::warn!(
                entry_price,
                stop_loss_price,
                "zero distance between entry and stop, cannot size position"
            );
            return Err(degenerate(
                "zero price distance between entry and stop-loss",
            ));
        }

        let (min_lot, max_lot) = self.settings.lot_bounds();
        let volume = round_lot((risk_amount / risk_per_unit).clamp(min_lot, max_lot));
        tracing::debug!(
            volume,
            risk_percent = self.settings.max_risk_percent(),
            "position size computed"
        );
        Ok(volume)
    }

    /// Like [`calculate_position_size`](Self::calculate_position_size) but
    /// yields the zero-volume sentinel on failure.
    pub fn position_size_or_zero(&self, balance: f64, entry_price: f64, stop_loss_price: f64) -> f64 {
        self.calculate_position_size(balance, entry_price, stop_loss_price)
            .unwrap_or(0.0)
    }

    /// Long-side stop-loss and take-profit levels from an ATR reading.
    pub fn calculate_stop_loss_and_take_profit(&self, entry_price: f64, atr: f64) -> (f64, f64) {
        let sl_distance = self.settings.stop_loss_atr_multiplier() * atr;
        let tp_distance = sl_distance * self.settings.take_profit_ratio();
        let stop_loss = entry_price - sl_distance;
        let take_profit = entry_price + tp_distance;
        tracing::debug!(entry_price, stop_loss, take_profit, "levels computed");
        (stop_loss, take_profit)
    }

    /// Global single-position gate.
    pub fn is_position_allowed(&self, open_positions: u32) -> bool {
        let allowed = open_positions < MAX_OPEN_POSITIONS;
        if !allowed {
            tracing::warn!(
                open_positions,
                "new position denied, only one concurrent position is allowed"
            );
        }
        allowed
    }

    /// Levels, volume and admission in one decision.
    pub fn plan_trade(&self, request: &TradeRequest) -> PositionSizingResult {
        let (stop_loss, take_profit) =
            self.calculate_stop_loss_and_take_profit(request.entry_price, request.atr);

        let sized = if request.atr.is_finite() && request.atr > 0.0 {
            self.calculate_position_size(request.balance, request.entry_price, stop_loss)
        } else {
            tracing::warn!(atr = request.atr, "ATR must be positive to place long levels");
            Err(degenerate("ATR must be positive and finite"))
        };

        let (volume, error) = match sized {
            Ok(v) if v > 0.0 => (v, None),
            Ok(_) => (0.0, Some(degenerate("position size rounds to zero"))),
            Err(e) => (0.0, Some(e)),
        };

        let admission = if let Some(err) = &error {
            Admission {
                allowed: false,
                reason: err.to_string(),
            }
        } else if !self.is_position_allowed(request.open_positions) {
            Admission {
                allowed: false,
                reason: format!(
                    "{} position(s) already open, limit is {}",
                    request.open_positions, MAX_OPEN_POSITIONS
                ),
            }
        } else {
            Admission {
                allowed: true,
                reason: "within risk limits".to_string(),
            }
        };

        PositionSizingResult {
            volume,
            stop_loss,
            take_profit,
            admission,
            error,
        }
    }
}

fn degenerate(reason: &str) -> SmartExpertError {
    SmartExpertError::DegenerateRisk {
        reason: reason.to_string(),
    }
}

fn round_lot(volume: f64) -> f64 {
    (volume * 100.0).round() / 100.0
}
