use super::SymbolTable;
use crate::error::{FrameError, Result};
use crate::model::ModelConfig;
use chrono::NaiveDateTime;
use ndarray::Array2;
use std::collections::BTreeMap;
use tracing::warn;

/// Absolute clip applied to raw feature values before scaling
pub const CLIP_ABS: f64 = 1e12;

/// Display-only indicator columns carried alongside the features
pub const DISPLAY_COLUMNS: [&str; 8] = [
    "volume",
    "ema20",
    "ema60",
    "ma_10",
    "ma_20",
    "rsi_14",
    "macd",
    "macd_signal",
];

/// Validated per-symbol input to the engine.
///
/// Rows are strictly ascending in time and the target and feature values are
/// finite. Display columns may hold NaN.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    symbol: String,
    times: Vec<NaiveDateTime>,
    target_column: String,
    target: Vec<f64>,
    features: Array2<f64>,
    feature_columns: Vec<String>,
    zero_filled: Vec<String>,
    display: BTreeMap<String, Vec<f64>>,
}

impl FeatureFrame {
    pub fn new(
        symbol: impl Into<String>,
        times: Vec<NaiveDateTime>,
        target_column: impl Into<String>,
        target: Vec<f64>,
        features: Array2<f64>,
        feature_columns: Vec<String>,
    ) -> Result<Self> {
        let symbol = symbol.into();
        let target_column = target_column.into();
        let rows = times.len();

        if rows == 0 {
            return Err(FrameError::Empty(symbol).into());
        }
        if target.len() != rows {
            return Err(FrameError::LengthMismatch {
                symbol,
                column: target_column,
                rows,
                actual: target.len(),
            }
            .into());
        }
        if features.nrows() != rows {
            return Err(FrameError::LengthMismatch {
                symbol,
                column: "features".to_string(),
                rows,
                actual: features.nrows(),
            }
            .into());
        }
        if features.ncols() != feature_columns.len() {
            return Err(FrameError::LengthMismatch {
                symbol,
                column: "feature_columns".to_string(),
                rows: features.ncols(),
                actual: feature_columns.len(),
            }
            .into());
        }

        for (row, pair) in times.windows(2).enumerate() {
            if pair[1] == pair[0] {
                return Err(FrameError::DuplicateTimestamp {
                    symbol,
                    time: pair[1],
                }
                .into());
            }
            if pair[1] < pair[0] {
                return Err(FrameError::Unordered {
                    symbol,
                    row: row + 1,
                }
                .into());
            }
        }

        if let Some(row) = target.iter().position(|v| !v.is_finite()) {
            return Err(FrameError::NonFinite {
                symbol,
                column: target_column,
                row,
            }
            .into());
        }
        for (row, values) in features.outer_iter().enumerate() {
            if let Some(col) = values.iter().position(|v| !v.is_finite()) {
                return Err(FrameError::NonFinite {
                    symbol,
                    column: feature_columns[col].clone(),
                    row,
                }
                .into());
            }
        }

        Ok(Self {
            symbol,
            times,
            target_column,
            target,
            features,
            feature_columns,
            zero_filled: Vec::new(),
            display: BTreeMap::new(),
        })
    }

    /// Attach display-only columns (NaN allowed)
    pub fn with_display(mut self, display: BTreeMap<String, Vec<f64>>) -> Result<Self> {
        for (name, values) in &display {
            if values.len() != self.len() {
                return Err(FrameError::LengthMismatch {
                    symbol: self.symbol,
                    column: name.clone(),
                    rows: self.times.len(),
                    actual: values.len(),
                }
                .into());
            }
        }
        self.display = display;
        Ok(self)
    }

    /// Align a raw symbol table to the model's feature order.
    ///
    /// Feature columns absent from the table are filled with 0.0 and logged;
    /// finite values are clipped to `±CLIP_ABS`.
    pub fn build(table: &SymbolTable, config: &ModelConfig) -> Result<Self> {
        let target = table
            .column(&config.target_column)
            .ok_or_else(|| FrameError::MissingTarget {
                symbol: table.symbol.clone(),
                column: config.target_column.clone(),
            })?
            .to_vec();

        let rows = table.len();
        let cols = config.n_features();
        let mut features = Array2::<f64>::zeros((rows, cols));
        let mut zero_filled = Vec::new();

        for (j, name) in config.feature_columns.iter().enumerate() {
            match table.column(name) {
                Some(values) => {
                    for (i, &v) in values.iter().enumerate() {
                        features[[i, j]] = clip(v);
                    }
                }
                None => zero_filled.push(name.clone()),
            }
        }

        if !zero_filled.is_empty() {
            warn!(
                "{}: {} feature column(s) missing, filled with 0.0: {}",
                table.symbol,
                zero_filled.len(),
                zero_filled.join(", ")
            );
        }

        let display = DISPLAY_COLUMNS
            .iter()
            .filter_map(|&name| {
                table
                    .column(name)
                    .map(|values| (name.to_string(), values.to_vec()))
            })
            .collect();

        let mut frame = Self::new(
            table.symbol.clone(),
            table.times.clone(),
            config.target_column.clone(),
            target,
            features,
            config.feature_columns.clone(),
        )?
        .with_display(display)?;
        frame.zero_filled = zero_filled;
        Ok(frame)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    /// Observed target prices
    pub fn target(&self) -> &[f64] {
        &self.target
    }

    /// Raw (clipped, unscaled) feature matrix, `[N, F]`
    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    /// Feature columns that were absent from the source table
    pub fn zero_filled(&self) -> &[String] {
        &self.zero_filled
    }

    pub fn display_column(&self, name: &str) -> Option<&[f64]> {
        self.display.get(name).map(Vec::as_slice)
    }
}

fn clip(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(-CLIP_ABS, CLIP_ABS)
    } else {
        v
    }
}
