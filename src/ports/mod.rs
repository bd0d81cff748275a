//! Port traits: the boundaries between domain logic and I/O.

pub mod candle_store_port;
pub mod config_port;
pub mod feed_port;
pub mod risk_settings_port;
