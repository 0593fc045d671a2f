//! Inference engine: stitched one-step backtest, H-step forecast and result
//! packaging for one symbol.
//!
//! The forecaster emits log-returns; prices are rebuilt by cumulative
//! exponentiation from the last observed price.

pub mod metrics;
pub mod report;

use crate::data::FeatureFrame;
use crate::error::{ArtifactError, ForecastError, InferenceError, Result};
use crate::model::{Forecaster, ModelBundle, ModelConfig, Scaler};
use crate::types::{BacktestRecord, ForecastRecord, MetricsResult, ResultBundle};
use chrono::{NaiveDateTime, TimeDelta};
use ndarray::{s, Array1, Array2};
use tracing::{debug, info};

/// `p_k = p_{k-1} * exp(r_k)` starting from `anchor` (anchor excluded)
pub fn reconstruct_prices(anchor: f64, returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(anchor, |price, r| {
            *price *= r.exp();
            Some(*price)
        })
        .collect()
}

/// Spacing of the last two observations, one day when unusable
pub fn extrapolation_step(times: &[NaiveDateTime]) -> TimeDelta {
    match times {
        [.., prev, last] if *last > *prev => *last - *prev,
        _ => TimeDelta::days(1),
    }
}

/// Stitched backtest output
#[derive(Debug, Clone)]
pub struct Backtest {
    pub records: Vec<BacktestRecord>,
    /// Frame index of the first predicted row
    pub start: usize,
    /// Actual price preceding the first valid prediction
    pub anchor: f64,
    pub metrics: MetricsResult,
}

pub struct InferenceEngine<'a> {
    config: &'a ModelConfig,
    scaler: &'a dyn Scaler,
    forecaster: &'a dyn Forecaster,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(bundle: &'a ModelBundle) -> Self {
        Self::from_parts(bundle.config(), bundle.scaler(), bundle.forecaster())
    }

    /// Bundle config and scaler with a substitute forecaster
    pub fn with_forecaster(bundle: &'a ModelBundle, forecaster: &'a dyn Forecaster) -> Self {
        Self::from_parts(bundle.config(), bundle.scaler(), forecaster)
    }

    pub fn from_parts(
        config: &'a ModelConfig,
        scaler: &'a dyn Scaler,
        forecaster: &'a dyn Forecaster,
    ) -> Self {
        Self {
            config,
            scaler,
            forecaster,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        self.config
    }

    fn scaled(&self, frame: &FeatureFrame) -> Result<Array2<f64>> {
        if frame.feature_columns() != self.config.feature_columns.as_slice() {
            return Err(ArtifactError::DimensionMismatch {
                artifact: "feature_cols",
                expected: self.config.n_features(),
                actual: frame.feature_columns().len(),
            }
            .into());
        }
        self.scaler.transform(frame.features())
    }

    fn invoke(&self, symbol: &str, window: &Array2<f64>) -> Result<Array1<f64>> {
        let returns = self
            .forecaster
            .predict(window)
            .map_err(|source| ForecastError::Inference {
                symbol: symbol.to_string(),
                source,
            })?;
        if returns.is_empty() {
            return Err(ForecastError::Inference {
                symbol: symbol.to_string(),
                source: InferenceError::Shape {
                    expected: 1,
                    actual: 0,
                },
            });
        }
        Ok(returns)
    }

    /// One-step-ahead predictions over the trailing `backtest_days` rows.
    ///
    /// The prediction for row `t` only sees rows `[t-W, t)` and is anchored
    /// on the actual price at `t-1`.
    pub fn backtest(&self, frame: &FeatureFrame, backtest_days: usize) -> Result<Backtest> {
        let n = frame.len();
        let w = self.config.window;
        let required = w + backtest_days + 1;
        if n < required {
            return Err(ForecastError::InsufficientHistory {
                symbol: frame.symbol().to_string(),
                required,
                actual: n,
            });
        }

        let scaled = self.scaled(frame)?;
        let prices = frame.target();
        let times = frame.times();
        let start = n.saturating_sub(backtest_days).max(w);

        let mut records = Vec::with_capacity(n - start);
        for t in start..n {
            let window = scaled.slice(s![t - w..t, ..]).to_owned();
            let returns = self.invoke(frame.symbol(), &window)?;
            let predicted = prices[t - 1] * returns[0].exp();
            debug!(
                "{} backtest t={} r={:.6} predicted={:.4}",
                frame.symbol(),
                times[t],
                returns[0],
                predicted
            );
            records.push(BacktestRecord {
                time: times[t],
                actual: prices[t],
                predicted,
            });
        }

        let first_valid = records
            .iter()
            .position(BacktestRecord::is_valid)
            .ok_or_else(|| ForecastError::NoValidPredictions {
                symbol: frame.symbol().to_string(),
            })?;
        let anchor = prices[start + first_valid - 1];
        let metrics = metrics::evaluate_records(&records, anchor);

        Ok(Backtest {
            records,
            start,
            anchor,
            metrics,
        })
    }

    /// H-step rollout from the final window
    pub fn forecast(&self, frame: &FeatureFrame) -> Result<Vec<ForecastRecord>> {
        let n = frame.len();
        let w = self.config.window;
        let h = self.config.horizon;
        if n < w {
            return Err(ForecastError::InsufficientHistory {
                symbol: frame.symbol().to_string(),
                required: w,
                actual: n,
            });
        }

        let scaled = self.scaled(frame)?;
        let window = scaled.slice(s![n - w..n, ..]).to_owned();
        let returns = self.invoke(frame.symbol(), &window)?;
        if returns.len() < h {
            return Err(ForecastError::Inference {
                symbol: frame.symbol().to_string(),
                source: InferenceError::Shape {
                    expected: h,
                    actual: returns.len(),
                },
            });
        }

        let returns = returns.slice(s![..h]).to_vec();
        let prices = reconstruct_prices(frame.target()[n - 1], &returns);
        let times = frame.times();
        let last = times[n - 1];
        let step = extrapolation_step(times);

        prices
            .into_iter()
            .enumerate()
            .map(|(k, predicted)| {
                let offset = step * (k as i32 + 1);
                let time = last.checked_add_signed(offset).ok_or_else(|| {
                    ForecastError::Internal(format!("forecast time overflow after {}", last))
                })?;
                Ok(ForecastRecord { time, predicted })
            })
            .collect()
    }

    /// Backtest, forecast and presentation columns for one symbol
    pub fn run(
        &self,
        frame: &FeatureFrame,
        backtest_days: usize,
        lookback_for_display: usize,
    ) -> Result<ResultBundle> {
        let backtest = self.backtest(frame, backtest_days)?;
        let forecast = self.forecast(frame)?;

        info!(
            "{}: {} ({} forecast steps)",
            frame.symbol(),
            backtest.metrics,
            forecast.len()
        );

        Ok(ResultBundle {
            symbol: frame.symbol().to_string(),
            history: report::history(frame, lookback_for_display),
            indicators: report::indicator_rows(frame, backtest.start),
            backtest_records: backtest.records,
            forecast_records: forecast,
            metrics: backtest.metrics,
        })
    }
}
