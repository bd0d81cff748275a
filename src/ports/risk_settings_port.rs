//! Risk parameter persistence port.

use crate::domain::error::SmartExpertError;
use crate::domain::risk_settings::{RiskParameter, RiskSettingRow, RiskSettings};

pub trait RiskSettingsStore {
    /// Snapshot of every stored parameter. Not refreshed automatically.
    fn load_all(&self) -> Result<RiskSettings, SmartExpertError>;

    /// Seed the default parameter set. Existing names are left untouched;
    /// returns how many rows were added.
    fn ensure_defaults(&self) -> Result<usize, SmartExpertError>;

    /// Store a validated value for a known parameter and stamp `updated_at`.
    fn set(&self, param: RiskParameter, value: &str) -> Result<(), SmartExpertError>;

    fn list(&self) -> Result<Vec<RiskSettingRow>, SmartExpertError>;
}
