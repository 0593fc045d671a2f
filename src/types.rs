//! Core data types shared by the engine, batch evaluator and API

use crate::utils::non_finite;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One stitched one-step-ahead backtest point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestRecord {
    pub time: NaiveDateTime,
    /// Observed target price at `time`
    #[serde(with = "non_finite")]
    pub actual: f64,
    /// Price predicted from the window ending the day before `time`.
    /// Non-finite when the forecaster produced NaN/inf.
    #[serde(with = "non_finite")]
    pub predicted: f64,
}

impl BacktestRecord {
    /// Whether this record takes part in metric computation
    pub fn is_valid(&self) -> bool {
        self.predicted.is_finite()
    }
}

/// One point of the H-step forecast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub time: NaiveDateTime,
    #[serde(with = "non_finite")]
    pub predicted: f64,
}

/// Observed price point, used for the display history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time: NaiveDateTime,
    #[serde(with = "non_finite")]
    pub price: f64,
}

/// Backtest quality metrics
///
/// `ta` and `sda` are NaN when fewer than three points (anchor included)
/// are available. With zero valid points `rmse`/`mape` are `+inf` and the
/// directional metrics NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsResult {
    /// Number of valid comparison points
    pub days: usize,
    #[serde(with = "non_finite")]
    pub rmse: f64,
    /// Mean absolute percentage error, in percent
    #[serde(with = "non_finite")]
    pub mape: f64,
    /// Directional accuracy (0-1)
    #[serde(with = "non_finite")]
    pub da: f64,
    /// Turning-point accuracy (0-1)
    #[serde(with = "non_finite")]
    pub ta: f64,
    /// Slope directional accuracy (0-1)
    #[serde(with = "non_finite")]
    pub sda: f64,
}

impl MetricsResult {
    /// Result reported when there is nothing to compare
    pub fn empty() -> Self {
        Self {
            days: 0,
            rmse: f64::INFINITY,
            mape: f64::INFINITY,
            da: f64::NAN,
            ta: f64::NAN,
            sda: f64::NAN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.days == 0
    }
}

impl std::fmt::Display for MetricsResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Backtest({}d) RMSE={:.2} | MAPE={:.2}% | DA={:.2} | TA={:.2} | SDA={:.2}",
            self.days, self.rmse, self.mape, self.da, self.ta, self.sda
        )
    }
}

/// Indicator columns shown alongside each backtest row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub time: NaiveDateTime,
    #[serde(with = "non_finite")]
    pub volume: f64,
    #[serde(with = "non_finite")]
    pub ema20: f64,
    #[serde(with = "non_finite")]
    pub ema60: f64,
    #[serde(with = "non_finite")]
    pub ma10: f64,
    #[serde(with = "non_finite")]
    pub ma20: f64,
    #[serde(with = "non_finite")]
    pub rsi_14: f64,
    #[serde(with = "non_finite")]
    pub macd: f64,
    #[serde(with = "non_finite")]
    pub macd_signal: f64,
    #[serde(with = "non_finite")]
    pub macd_hist: f64,
}

/// Everything produced for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub symbol: String,
    pub backtest_records: Vec<BacktestRecord>,
    pub forecast_records: Vec<ForecastRecord>,
    pub metrics: MetricsResult,
    /// Trailing observed prices for display
    pub history: Vec<PricePoint>,
    /// One row per backtest record
    pub indicators: Vec<IndicatorRow>,
}
