//! Core domain types and logic.

pub mod candle;
pub mod error;
pub mod ingest_config;
pub mod ingestion;
pub mod market;
pub mod risk;
pub mod risk_settings;
