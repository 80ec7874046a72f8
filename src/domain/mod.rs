//! Core domain types and logic.

pub mod stick;
pub mod stick_codec;
pub mod error;
pub mod indicator;
pub mod indicator_helpers;
pub mod position;
pub mod portfolio;
pub mod metrics;
pub mod config_validation;
pub mod supertrend_backtest;
pub mod signal_backtest;
pub mod iv_rank;
pub mod td_scan;
pub mod cot;
pub mod stock_metadata;
pub mod currency_strength;
pub mod trading_state;
