//! Error types for the forecast engine
//!
//! Errors are split by concern: [`InferenceError`] for a single forecaster
//! call, [`FrameError`] for table/frame validation, [`ArtifactError`] for
//! bundle loading. [`ForecastError`] is the crate-wide error and attaches the
//! symbol to everything that happens inside a per-symbol run.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForecastError>;

/// Failure of one forecaster invocation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InferenceError {
    #[error("forecaster failed: {0}")]
    Failed(String),

    #[error("forecaster timed out after {0:?}")]
    Timeout(Duration),

    #[error("forecaster returned {actual} steps, expected at least {expected}")]
    Shape { expected: usize, actual: usize },

    #[error("window shape mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    WindowShape {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },
}

impl InferenceError {
    /// Only failures and timeouts are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, InferenceError::Failed(_) | InferenceError::Timeout(_))
    }
}

/// Feature table / frame validation errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("symbol {0} not found")]
    UnknownSymbol(String),

    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("{symbol}: missing target column '{column}'")]
    MissingTarget { symbol: String, column: String },

    #[error("row {row}: invalid timestamp '{value}'")]
    InvalidTimestamp { row: usize, value: String },

    #[error("{symbol}: duplicate timestamp {time}")]
    DuplicateTimestamp { symbol: String, time: NaiveDateTime },

    #[error("{symbol}: timestamps not in ascending order at row {row}")]
    Unordered { symbol: String, row: usize },

    #[error("{symbol}: non-finite value in column '{column}' at row {row}")]
    NonFinite {
        symbol: String,
        column: String,
        row: usize,
    },

    #[error("{symbol}: shape mismatch, {rows} rows of time but {actual} in '{column}'")]
    LengthMismatch {
        symbol: String,
        column: String,
        rows: usize,
        actual: usize,
    },

    #[error("{0}: frame is empty")]
    Empty(String),
}

/// Artifact bundle loading errors
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("missing artifact file: {0}")]
    Missing(PathBuf),

    #[error("invalid model config: {0}")]
    InvalidConfig(String),

    #[error("dimension mismatch in {artifact}: expected {expected}, got {actual}")]
    DimensionMismatch {
        artifact: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Crate-wide error
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("{symbol}: insufficient history, need at least {required} rows, got {actual}")]
    InsufficientHistory {
        symbol: String,
        required: usize,
        actual: usize,
    },

    #[error("{symbol}: no valid predictions in backtest span")]
    NoValidPredictions { symbol: String },

    #[error("{symbol}: {source}")]
    Inference {
        symbol: String,
        #[source]
        source: InferenceError,
    },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Config error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used in batch reports and API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientHistory,
    NoValidPredictions,
    InferenceFailed,
    InferenceTimeout,
    UnknownSymbol,
    InvalidFrame,
    Artifact,
    Io,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InsufficientHistory => "INSUFFICIENT_HISTORY",
            ErrorKind::NoValidPredictions => "NO_VALID_PREDICTIONS",
            ErrorKind::InferenceFailed => "INFERENCE_FAILED",
            ErrorKind::InferenceTimeout => "INFERENCE_TIMEOUT",
            ErrorKind::UnknownSymbol => "UNKNOWN_SYMBOL",
            ErrorKind::InvalidFrame => "INVALID_FRAME",
            ErrorKind::Artifact => "ARTIFACT",
            ErrorKind::Io => "IO",
            ErrorKind::Internal => "INTERNAL",
        };
        write!(f, "{}", name)
    }
}

impl ForecastError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForecastError::InsufficientHistory { .. } => ErrorKind::InsufficientHistory,
            ForecastError::NoValidPredictions { .. } => ErrorKind::NoValidPredictions,
            ForecastError::Inference {
                source: InferenceError::Timeout(_),
                ..
            } => ErrorKind::InferenceTimeout,
            ForecastError::Inference { .. } => ErrorKind::InferenceFailed,
            ForecastError::Frame(FrameError::UnknownSymbol(_)) => ErrorKind::UnknownSymbol,
            ForecastError::Frame(_) => ErrorKind::InvalidFrame,
            ForecastError::Artifact(_) | ForecastError::Config(_) => ErrorKind::Artifact,
            ForecastError::Io(_) | ForecastError::Json(_) | ForecastError::Csv(_) => ErrorKind::Io,
            ForecastError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Symbol the error is attributed to, when known
    pub fn symbol(&self) -> Option<&str> {
        match self {
            ForecastError::InsufficientHistory { symbol, .. }
            | ForecastError::NoValidPredictions { symbol }
            | ForecastError::Inference { symbol, .. } => Some(symbol),
            ForecastError::Frame(FrameError::UnknownSymbol(symbol))
            | ForecastError::Frame(FrameError::Empty(symbol))
            | ForecastError::Frame(FrameError::MissingTarget { symbol, .. })
            | ForecastError::Frame(FrameError::DuplicateTimestamp { symbol, .. })
            | ForecastError::Frame(FrameError::Unordered { symbol, .. })
            | ForecastError::Frame(FrameError::NonFinite { symbol, .. })
            | ForecastError::Frame(FrameError::LengthMismatch { symbol, .. }) => Some(symbol),
            _ => None,
        }
    }
}
