//! Core domain types and logic.

pub mod backtest;
pub mod bracket;
pub mod broker;
pub mod candle;
pub mod config_validation;
pub mod day_segmenter;
pub mod error;
pub mod execution;
pub mod instrument;
pub mod metrics;
pub mod order;
pub mod params;
pub mod portfolio;
pub mod position;
pub mod results;
pub mod rolling_stats;
pub mod signal;
pub mod sizer;
pub mod strategy;
pub mod sweep;
