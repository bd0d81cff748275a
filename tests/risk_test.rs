//! Risk engine driven by settings persisted in SQLite.
//!
//! Tests cover:
//! - Defaults when the settings table is empty or partially populated
//! - Snapshot semantics and explicit reload
//! - Full trade plans: sizing, levels and the admission gate
//! - Degenerate inputs

mod common;

use approx::assert_relative_eq;
use common::*;
use smartexpert::domain::error::SmartExpertError;
use smartexpert::domain::risk::{RiskEngine, TradeRequest};
use smartexpert::domain::risk_settings::RiskParameter;
use smartexpert::ports::risk_settings_port::RiskSettingsStore;

fn request(balance: f64, entry_price: f64, atr: f64, open_positions: u32) -> TradeRequest {
    TradeRequest {
        balance,
        entry_price,
        atr,
        open_positions,
    }
}

mod settings_source {
    use super::*;

    #[test]
    fn empty_table_behaves_as_defaults() {
        let store = prepared_store();
        let engine = RiskEngine::from_store(&store).unwrap();

        assert!(engine.settings().is_empty());
        let (sl, tp) = engine.calculate_stop_loss_and_take_profit(2000.0, 20.0);
        assert_relative_eq!(sl, 1970.0);
        assert_relative_eq!(tp, 2060.0);
        assert_relative_eq!(
            engine.calculate_position_size(10_000.0, 2000.0, 1970.0).unwrap(),
            3.33
        );
    }

    #[test]
    fn seeded_defaults_match_builtin_defaults() {
        let store = prepared_store();
        store.ensure_defaults().unwrap();

        let seeded = RiskEngine::from_store(&store).unwrap();
        for param in RiskParameter::ALL {
            assert_relative_eq!(seeded.settings().get(param), param.default_value());
        }
    }

    #[test]
    fn partial_table_falls_back_per_parameter() {
        let store = prepared_store();
        store.set(RiskParameter::MaxRiskPercent, "2").unwrap();

        let engine = RiskEngine::from_store(&store).unwrap();

        assert_relative_eq!(engine.settings().max_risk_percent(), 2.0);
        assert_relative_eq!(engine.settings().stop_loss_atr_multiplier(), 1.5);
        assert_relative_eq!(
            engine.calculate_position_size(10_000.0, 2000.0, 1970.0).unwrap(),
            6.67
        );
    }

    #[test]
    fn snapshot_ignores_later_writes_until_reload() {
        let store = prepared_store();
        store.ensure_defaults().unwrap();
        let mut engine = RiskEngine::from_store(&store).unwrap();

        store.set(RiskParameter::StopLossAtrMultiplier, "2").unwrap();
        let (sl, _) = engine.calculate_stop_loss_and_take_profit(2000.0, 20.0);
        assert_relative_eq!(sl, 1970.0);

        engine.reload(&store).unwrap();
        let (sl, tp) = engine.calculate_stop_loss_and_take_profit(2000.0, 20.0);
        assert_relative_eq!(sl, 1960.0);
        assert_relative_eq!(tp, 2080.0);
    }

    #[test]
    fn rejected_write_leaves_value_unchanged() {
        let store = prepared_store();
        store.ensure_defaults().unwrap();

        let err = store.set(RiskParameter::MaxLot, "-5").unwrap_err();
        assert!(err.is_configuration());

        let engine = RiskEngine::from_store(&store).unwrap();
        assert_relative_eq!(engine.settings().lot_bounds().1, 50.0);
    }

    #[test]
    fn sub_step_lot_bound_is_rejected() {
        let store = prepared_store();
        store.ensure_defaults().unwrap();

        assert!(store.set(RiskParameter::MinLot, "0.004").is_err());

        let engine = RiskEngine::from_store(&store).unwrap();
        let plan = engine.plan_trade(&request(100.0, 2000.0, 600.0, 0));
        assert_relative_eq!(plan.volume, 0.01);
        assert!(plan.admission.allowed);
    }

    #[test]
    fn missing_table_is_query_error() {
        let store = smartexpert::adapters::sqlite_adapter::SqliteAdapter::in_memory().unwrap();
        assert!(matches!(
            RiskEngine::from_store(&store),
            Err(SmartExpertError::DatabaseQuery { .. })
        ));
    }
}

mod trade_plans {
    use super::*;

    fn default_engine() -> RiskEngine {
        let store = prepared_store();
        store.ensure_defaults().unwrap();
        RiskEngine::from_store(&store).unwrap()
    }

    #[test]
    fn flat_book_is_admitted() {
        let plan = default_engine().plan_trade(&request(10_000.0, 2000.0, 20.0, 0));

        assert!(plan.admission.allowed);
        assert!(plan.error.is_none());
        assert_relative_eq!(plan.volume, 3.33);
        assert_relative_eq!(plan.stop_loss, 1970.0);
        assert_relative_eq!(plan.take_profit, 2060.0);
    }

    #[test]
    fn open_position_denies_new_trade() {
        let plan = default_engine().plan_trade(&request(10_000.0, 2000.0, 20.0, 1));

        assert!(!plan.admission.allowed);
        assert!(plan.error.is_none());
        assert_relative_eq!(plan.volume, 3.33);
    }

    #[test]
    fn small_account_clamps_to_min_lot() {
        let plan = default_engine().plan_trade(&request(10.0, 2000.0, 20.0, 0));
        assert_relative_eq!(plan.volume, 0.01);
    }

    #[test]
    fn large_account_clamps_to_max_lot() {
        let plan = default_engine().plan_trade(&request(100_000_000.0, 1.1, 0.001, 0));
        assert_relative_eq!(plan.volume, 50.0);
    }

    #[test]
    fn zero_atr_is_degenerate() {
        let plan = default_engine().plan_trade(&request(10_000.0, 2000.0, 0.0, 0));

        assert!(!plan.admission.allowed);
        assert_eq!(plan.volume, 0.0);
        assert!(matches!(
            plan.error,
            Some(SmartExpertError::DegenerateRisk { .. })
        ));
    }

    #[test]
    fn negative_atr_is_degenerate() {
        let plan = default_engine().plan_trade(&request(10_000.0, 2000.0, -20.0, 0));

        assert!(!plan.admission.allowed);
        assert_eq!(plan.volume, 0.0);
        assert!(matches!(
            plan.error,
            Some(SmartExpertError::DegenerateRisk { .. })
        ));
    }

    #[test]
    fn nan_balance_is_degenerate() {
        let engine = default_engine();
        assert!(engine.calculate_position_size(f64::NAN, 2000.0, 1970.0).is_err());
        assert_eq!(engine.position_size_or_zero(f64::NAN, 2000.0, 1970.0), 0.0);
    }
}
