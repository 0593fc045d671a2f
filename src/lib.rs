//! Stock forecast inference, backtest and evaluation engine
//!
//! Given a frozen sequence forecaster that emits log-returns, this crate
//! builds stitched one-step-ahead backtests, H-step forecasts and
//! directional accuracy metrics per symbol, and runs them in batch or over
//! HTTP.

pub mod batch;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod model;
pub mod server;
pub mod types;
pub mod utils;

#[cfg(test)]
mod types_tests;
